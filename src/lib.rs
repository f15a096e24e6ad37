//! ABOUTME: vectorlite — a pure Rust HNSW vector search extension for SQLite
//! ABOUTME: Exposes a `vector_search` virtual table plus knn_param/knn_search scalar functions
//!
//! This crate is compiled as a static Rust library (`rlib`) and linked
//! directly into a host that owns its own `rusqlite`/SQLite build, rather
//! than as a `cdylib` loadable extension — the host calls [`register`] once
//! per connection instead of `SELECT load_extension(...)`.
//!
//! ```no_run
//! use rusqlite::Connection;
//!
//! let conn = Connection::open_in_memory()?;
//! vectorlite::register(&conn)?;
//!
//! conn.execute(
//!     "CREATE VIRTUAL TABLE t USING vector_search(\
//!         '{\"name\":\"v\",\"dim\":2,\"distance_type\":\"l2\"}', \
//!         '{\"max_elements\":1000}')",
//!     [],
//! )?;
//! conn.execute(
//!     "INSERT INTO t(rowid, v) VALUES (1, ?)",
//!     [vec![0u8; 8]],
//! )?;
//! # Ok::<(), rusqlite::Error>(())
//! ```

mod error;
mod index;
mod knn_param;
pub mod logging;
mod options;
mod space;
mod vector;
mod vtab;
mod vtab_ffi;

pub use error::{Result, VectorliteError};
pub use options::IndexOptions;
pub use space::{Metric, VectorSpace};
pub use vector::Vector;

use rusqlite::Connection;

/// Register the `vector_search` virtual table module and the `knn_param`/
/// `knn_search` scalar functions on `conn`. Call once per connection before
/// issuing `CREATE VIRTUAL TABLE ... USING vector_search(...)`.
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    vtab_ffi::register(conn)
}
