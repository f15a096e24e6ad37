//! ABOUTME: Optional tracing-subscriber bootstrap for embedders and tests
//! ABOUTME: The extension itself only emits tracing events; it never installs a subscriber on its own
//!
//! A library has no business calling `tracing_subscriber::fmt().init()` at
//! load time — the host process owns that decision. This module exists so
//! tests and small example binaries in this crate have one place to turn
//! `RUST_LOG=vectorlite=debug` into visible output, the same split the
//! teacher's CLI draws between its library crates (which only call
//! `tracing::*!`) and its `main.rs` (which is the one place a subscriber is
//! installed).

use tracing_subscriber::EnvFilter;

/// Install a stderr-writing `tracing` subscriber honoring `RUST_LOG`,
/// defaulting to `warn` when the variable is unset. Safe to call more than
/// once; later calls are no-ops (`tracing_subscriber::fmt().try_init()`
/// returns an error that is intentionally discarded).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
