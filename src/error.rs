//! ABOUTME: Error types for the vectorlite virtual table extension
//! ABOUTME: Maps the error kinds of spec §7 onto a single thiserror enum

use thiserror::Error;

/// Result alias used throughout the crate's internal modules.
pub type Result<T> = std::result::Result<T, VectorliteError>;

/// Every error this extension can produce, surfaced to the host either as a
/// vtab error message, a scalar-function error, or a host error code.
#[derive(Debug, Error)]
pub enum VectorliteError {
    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("capacity exceeded: index holds {max_elements} elements already")]
    CapacityExceeded { max_elements: usize },

    #[error("label {label} not found in index")]
    NotFound { label: i64 },

    #[error("operation not supported: {message}")]
    UnsupportedOperation { message: String },

    #[error("duplicate rowid: {rowid} is already present in the index")]
    DuplicateRowid { rowid: i64 },
}

impl VectorliteError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// True for errors that are caller-correctable (bad input) as opposed to
    /// internal/capacity conditions; used to pick the tracing level to log at.
    fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::DimensionMismatch { .. }
                | Self::Decode { .. }
                | Self::Type { .. }
                | Self::UnsupportedOperation { .. }
                | Self::DuplicateRowid { .. }
        )
    }

    /// Log this error at the appropriate level before it is handed to the
    /// host's error channel, so `RUST_LOG=vectorlite=debug` shows failures
    /// even when the caller only surfaces a terse SQLite error string.
    pub fn log(self) -> Self {
        if self.is_caller_error() {
            tracing::warn!(error = %self, "vectorlite rejected operation");
        } else {
            tracing::error!(error = %self, "vectorlite internal error");
        }
        self
    }
}

impl From<VectorliteError> for rusqlite::Error {
    fn from(err: VectorliteError) -> Self {
        let err = err.log();
        rusqlite::Error::ModuleError(err.to_string())
    }
}
