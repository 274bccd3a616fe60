//! DEFLATE codec and the identity codec.

use crate::error::{CodecError, CodecResult};
use crate::Compressor;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Raw DEFLATE compression with base64 tokens.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    /// Creates a codec with the given compression level (0-9).
    #[must_use]
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

fn deflate(input: &str, level: Compression) -> CodecResult<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), level);
    encoder
        .write_all(input.as_bytes())
        .map_err(|e| CodecError::Compress(e.to_string()))?;
    let bytes = encoder
        .finish()
        .map_err(|e| CodecError::Compress(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

fn inflate(token: &str) -> CodecResult<String> {
    let bytes = STANDARD
        .decode(token)
        .map_err(|e| CodecError::InvalidToken(e.to_string()))?;

    let mut decoder = DeflateDecoder::new(bytes.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Decompress(e.to_string()))?;

    String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8)
}

/// Runs CPU-bound codec work on the blocking pool.
async fn blocking<F>(work: F) -> CodecResult<String>
where
    F: FnOnce() -> CodecResult<String> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CodecError::Task(e.to_string()))?
}

#[async_trait]
impl Compressor for DeflateCompressor {
    fn id(&self) -> &'static str {
        "deflate"
    }

    async fn compress(&self, input: &str) -> CodecResult<String> {
        let input = input.to_string();
        let level = self.level;
        blocking(move || deflate(&input, level)).await
    }

    async fn decompress(&self, token: &str) -> CodecResult<String> {
        let token = token.to_string();
        blocking(move || inflate(&token)).await
    }
}

/// A codec that stores the serialized string unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompressor;

#[async_trait]
impl Compressor for PassthroughCompressor {
    fn id(&self) -> &'static str {
        "none"
    }

    async fn compress(&self, input: &str) -> CodecResult<String> {
        Ok(input.to_string())
    }

    async fn decompress(&self, token: &str) -> CodecResult<String> {
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn deflate_roundtrip() {
        let codec = DeflateCompressor::default();
        let input = r#"{"bookmark":{"ids":["b1"],"entities":{"b1":{"title":"docs"}}}}"#;

        let token = codec.compress(input).await.unwrap();
        assert_eq!(codec.decompress(&token).await.unwrap(), input);
    }

    #[tokio::test]
    async fn deflate_shrinks_repetitive_input() {
        let codec = DeflateCompressor::with_level(9);
        let input = r#"{"id":"x","title":"same"},"#.repeat(200);

        let token = codec.compress(&input).await.unwrap();
        assert!(token.len() < input.len() / 4);
    }

    #[tokio::test]
    async fn deflate_rejects_non_base64_token() {
        let codec = DeflateCompressor::default();
        let result = codec.decompress("not base64 at all!").await;
        assert!(matches!(result, Err(CodecError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn passthrough_is_identity() {
        let codec = PassthroughCompressor;
        assert_eq!(codec.compress("abc").await.unwrap(), "abc");
        assert_eq!(codec.decompress("abc").await.unwrap(), "abc");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deflate_runs_concurrently_off_the_workers() {
        let codec = DeflateCompressor::with_level(9);
        let input = r#"{"id":"n","content":"long note"},"#.repeat(5_000);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let input = input.clone();
            tasks.spawn(async move {
                let token = codec.compress(&input).await.unwrap();
                codec.decompress(&token).await.unwrap() == input
            });
        }
        while let Some(ok) = tasks.join_next().await {
            assert!(ok.unwrap());
        }
    }

    #[test]
    fn level_is_clamped() {
        let codec = DeflateCompressor::with_level(42);
        assert_eq!(codec.level.level(), 9);
    }

    proptest! {
        #[test]
        fn deflate_roundtrips_any_string(input in ".{0,256}") {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let codec = DeflateCompressor::default();
            let restored = rt.block_on(async {
                let token = codec.compress(&input).await.unwrap();
                codec.decompress(&token).await.unwrap()
            });
            prop_assert_eq!(restored, input);
        }
    }
}
