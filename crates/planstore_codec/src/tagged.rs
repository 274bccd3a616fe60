//! Codec-tagged tokens.
//!
//! A tagged token is `<codec id>:<token>`. Decoding picks the codec named by
//! the tag; untagged tokens (written before tagging existed) go to the
//! fallback codec.

use crate::error::{CodecError, CodecResult};
use crate::{Compressor, DeflateCompressor, PassthroughCompressor};
use std::sync::Arc;

const SEPARATOR: char = ':';

/// Returns a built-in codec by id.
#[must_use]
pub fn builtin(id: &str) -> Option<Arc<dyn Compressor>> {
    match id {
        "deflate" => Some(Arc::new(DeflateCompressor::default())),
        "none" => Some(Arc::new(PassthroughCompressor)),
        _ => None,
    }
}

/// Splits a token into its codec tag and payload.
///
/// The tag must be non-empty ASCII alphanumeric; anything else (base64 has
/// no `:`, JSON starts with `{`) reads as an untagged token.
#[must_use]
pub fn split_tag(token: &str) -> (Option<&str>, &str) {
    match token.split_once(SEPARATOR) {
        Some((tag, payload)) if !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_alphanumeric()) => {
            (Some(tag), payload)
        }
        _ => (None, token),
    }
}

/// Compresses `input` and prefixes the token with the codec id.
///
/// # Errors
///
/// Propagates compression failures.
pub async fn compress_tagged(codec: &dyn Compressor, input: &str) -> CodecResult<String> {
    let token = codec.compress(input).await?;
    Ok(format!("{}{SEPARATOR}{token}", codec.id()))
}

/// Decompresses a token with the codec named by its tag.
///
/// `fallback` decodes untagged tokens and tokens tagged with its own id.
///
/// # Errors
///
/// Returns [`CodecError::UnknownCodec`] if the tag names neither `fallback`
/// nor a built-in codec; propagates decompression failures.
pub async fn decompress_tagged(fallback: &Arc<dyn Compressor>, token: &str) -> CodecResult<String> {
    match split_tag(token) {
        (None, payload) => fallback.decompress(payload).await,
        (Some(tag), payload) if tag == fallback.id() => fallback.decompress(payload).await,
        (Some(tag), payload) => {
            let codec = builtin(tag).ok_or_else(|| CodecError::UnknownCodec(tag.to_string()))?;
            codec.decompress(payload).await
        }
    }
}
