//! Error types for Ytgrab core operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Ytgrab core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Reference is not a recognized platform link.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// List file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// List file exists but cannot be read.
    #[error("File not readable: {path}: {reason}")]
    NotReadable {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Why the read failed.
        reason: String,
    },

    /// Destination directory cannot be created or written to.
    #[error("Destination not writable: {path}: {reason}")]
    NotWritable {
        /// The destination directory.
        path: PathBuf,
        /// Why the write check failed.
        reason: String,
    },

    /// A precondition failed before the media engine was started.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Media engine failure.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error is transient and the operation may be retried.
    ///
    /// Only engine errors carry a retryable class; validation and
    /// precondition failures are always permanent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(e) => e.is_retryable(),
            _ => false,
        }
    }
}
