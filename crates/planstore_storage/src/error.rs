//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value could not be encoded for storage.
    #[error("failed to encode value for key {key:?}: {message}")]
    Encode {
        /// The key being written.
        key: String,
        /// Encoder message.
        message: String,
    },

    /// A stored value could not be decoded.
    #[error("stored value for key {key:?} is corrupted: {message}")]
    Corrupted {
        /// The key being read.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// A store implementation reported a failure of its own.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
