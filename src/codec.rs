//! Pluggable payload compression
//!
//! Records are compressed before they are sealed. The codec only sees the
//! serialized JSON bytes; the envelope's `compressed` flag and `originalSize`
//! stay the same whichever codec is plugged in.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Lossless byte codec.
pub trait Codec: Send + Sync {
    /// Compress `bytes`.
    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>>;

    /// Reverse `encode`.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// gzip via flate2
#[derive(Debug, Clone)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    /// Codec with an explicit compression level (0–9)
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for GzipCodec {
    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), self.level);
        encoder
            .write_all(bytes)
            .map_err(|e| Error::Codec(format!("gzip encode failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| Error::Codec(format!("gzip encode failed: {}", e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Codec(format!("gzip decode failed: {}", e)))?;
        Ok(out)
    }

    fn name(&self) -> &str {
        "gzip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_shrinks_repetitive_payload() {
        let codec = GzipCodec::default();
        let payload = "the same line of screen text\n".repeat(200);
        let encoded = codec.encode(payload.as_bytes()).unwrap();
        assert!(encoded.len() < payload.len());
        assert_eq!(codec.decode(&encoded).unwrap(), payload.as_bytes());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = GzipCodec::with_level(9);
        assert!(matches!(
            codec.decode(b"definitely not gzip"),
            Err(Error::Codec(_))
        ));
    }
}
