//! # planstore Codec
//!
//! Compression codecs used by the planstore archive subsystem.
//!
//! A codec turns a serialized string into an opaque **token** string and
//! back. Tokens are plain strings so they can be stored inside ordinary
//! JSON documents (the project archive maps project ids to tokens).
//!
//! ## Available Codecs
//!
//! - [`DeflateCompressor`] - raw DEFLATE, token is standard base64
//! - [`PassthroughCompressor`] - identity, for debugging and tests
//!
//! Stored tokens are tagged with the id of the codec that wrote them (see
//! [`compress_tagged`]), so a store can be read back whichever codec is
//! configured later.
//!
//! ## Usage
//!
//! ```
//! use planstore_codec::{Compressor, DeflateCompressor};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let codec = DeflateCompressor::default();
//! let token = codec.compress(r#"{"note":{"ids":[]}}"#).await.unwrap();
//! let restored = codec.decompress(&token).await.unwrap();
//! assert_eq!(restored, r#"{"note":{"ids":[]}}"#);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod deflate;
mod error;
mod tagged;

pub use deflate::{DeflateCompressor, PassthroughCompressor};
pub use error::{CodecError, CodecResult};
pub use tagged::{builtin, compress_tagged, decompress_tagged, split_tag};

use async_trait::async_trait;

/// An async string compression codec.
///
/// # Invariants
///
/// - `decompress(compress(s)) == s` for every string `s`
/// - Tokens are valid UTF-8 strings
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Short identifier written in front of tagged tokens.
    ///
    /// Must be ASCII alphanumeric.
    fn id(&self) -> &'static str;

    /// Compresses a serialized string into an opaque token.
    async fn compress(&self, input: &str) -> CodecResult<String>;

    /// Restores the serialized string from a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed or corrupted.
    async fn decompress(&self, token: &str) -> CodecResult<String>;
}
