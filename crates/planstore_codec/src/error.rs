//! Error types for codec operations.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during compression or decompression.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The token is not valid base64.
    #[error("invalid token encoding: {0}")]
    InvalidToken(String),

    /// The compressed stream is corrupted.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Compression failed.
    #[error("compression failed: {0}")]
    Compress(String),

    /// Decompressed bytes are not UTF-8.
    #[error("decompressed data is not valid UTF-8")]
    InvalidUtf8,

    /// A token names a codec that is not available.
    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    /// The blocking compression task failed.
    #[error("codec task failed: {0}")]
    Task(String),
}
