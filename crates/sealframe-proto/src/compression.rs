//! Payload data compression codecs.
//!
//! Chunks may carry their application bytes compressed. The algorithm
//! is named in the chunk plaintext; decompression output is capped to
//! defend against decompression bombs.

use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

use crate::errors::{ProtocolError, Result};

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// RFC 1952 gzip via DEFLATE
    Gzip,
    /// LZ4 block format with a length prefix
    Lz4,
}

impl CompressionAlgorithm {
    /// Wire name of this algorithm.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gzip => "GZIP",
            Self::Lz4 => "LZ4",
        }
    }

    /// Resolve a wire name.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnsupportedCompression`] for unknown names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "GZIP" => Ok(Self::Gzip),
            "LZ4" => Ok(Self::Lz4),
            other => {
                Err(ProtocolError::UnsupportedCompression { algorithm: other.to_string() })
            },
        }
    }
}

/// Compress `data` with the given algorithm.
///
/// # Errors
///
/// [`ProtocolError::Decompress`] is never returned here; gzip encoding
/// into a `Vec` cannot fail short of allocation failure, and LZ4 block
/// compression is infallible.
pub fn compress(algorithm: CompressionAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(data)
                .map_err(|e| ProtocolError::Decompress { reason: e.to_string() })?;
            encoder.finish().map_err(|e| ProtocolError::Decompress { reason: e.to_string() })
        },
        CompressionAlgorithm::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
    }
}

/// Decompress `data`, refusing output larger than `max_size`.
///
/// # Errors
///
/// [`ProtocolError::Decompress`] on corrupt input or when the output
/// would exceed `max_size`.
pub fn decompress(
    algorithm: CompressionAlgorithm,
    data: &[u8],
    max_size: usize,
) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::Gzip => {
            let mut out = Vec::new();
            let limit = max_size as u64;
            // Read one byte past the cap so overflow is detectable.
            let read = GzDecoder::new(data)
                .take(limit + 1)
                .read_to_end(&mut out)
                .map_err(|e| ProtocolError::Decompress { reason: e.to_string() })?;
            if read as u64 > limit {
                return Err(ProtocolError::Decompress {
                    reason: format!("output exceeds {max_size} byte limit"),
                });
            }
            Ok(out)
        },
        CompressionAlgorithm::Lz4 => {
            let size = lz4_flex::block::uncompressed_size(data)
                .map_err(|e| ProtocolError::Decompress { reason: e.to_string() })?
                .0;
            if size > max_size {
                return Err(ProtocolError::Decompress {
                    reason: format!("output exceeds {max_size} byte limit"),
                });
            }
            lz4_flex::decompress_size_prepended(data)
                .map_err(|e| ProtocolError::Decompress { reason: e.to_string() })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = compress(CompressionAlgorithm::Gzip, &data).unwrap();
        assert!(compressed.len() < data.len());

        let restored = decompress(CompressionAlgorithm::Gzip, &compressed, 1 << 16).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn lz4_round_trip() {
        let data = vec![7u8; 4096];
        let compressed = compress(CompressionAlgorithm::Lz4, &data).unwrap();
        assert!(compressed.len() < data.len());

        let restored = decompress(CompressionAlgorithm::Lz4, &compressed, 1 << 16).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn empty_input_round_trips() {
        for algorithm in [CompressionAlgorithm::Gzip, CompressionAlgorithm::Lz4] {
            let compressed = compress(algorithm, b"").unwrap();
            let restored = decompress(algorithm, &compressed, 16).unwrap();
            assert!(restored.is_empty());
        }
    }

    #[test]
    fn oversized_output_rejected() {
        let data = vec![0u8; 4096];
        for algorithm in [CompressionAlgorithm::Gzip, CompressionAlgorithm::Lz4] {
            let compressed = compress(algorithm, &data).unwrap();
            let result = decompress(algorithm, &compressed, 1024);
            assert!(matches!(result, Err(ProtocolError::Decompress { .. })), "{algorithm:?}");
        }
    }

    #[test]
    fn corrupt_input_rejected() {
        let garbage = [0xDE, 0xAD, 0xBE, 0xEF];
        for algorithm in [CompressionAlgorithm::Gzip, CompressionAlgorithm::Lz4] {
            assert!(decompress(algorithm, &garbage, 1024).is_err(), "{algorithm:?}");
        }
    }

    #[test]
    fn names_round_trip() {
        for algorithm in [CompressionAlgorithm::Gzip, CompressionAlgorithm::Lz4] {
            assert_eq!(CompressionAlgorithm::from_name(algorithm.name()).unwrap(), algorithm);
        }
        assert!(matches!(
            CompressionAlgorithm::from_name("LZW"),
            Err(ProtocolError::UnsupportedCompression { .. })
        ));
    }
}
