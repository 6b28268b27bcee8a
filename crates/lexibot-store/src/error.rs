//! Error types for the lexibot-store crate.
//!
//! All fallible storage operations return [`StoreError`] via [`StoreResult`].
//! Mutating operations that the caller can retry report plain `bool` success
//! instead; see the store and ledger docs for the split.

use std::path::PathBuf;

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the persistence subsystem.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A store or ledger could not be brought up.
    ///
    /// Construction aborts on this error; a half-initialized instance is
    /// never handed to the caller.
    #[error("initialization failed at {}: {message}", .path.display())]
    Init { path: PathBuf, message: String },

    /// Invalid configuration (malformed file-name template, empty delimiter).
    #[error("invalid configuration: {0}")]
    Config(String),
}
