//! Wire-level error types.
//!
//! These cover framing, JSON decoding, base64 fields, and compression.
//! Protocol semantics (token trust, replay, freshness) have their own
//! taxonomy in `sealframe-core`; everything here maps into the parse
//! kinds of that taxonomy at the crate boundary.

use thiserror::Error;

/// Convenience alias used throughout the wire layer.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from framing, decoding, and codecs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A wire object must start with `{`; something else was found
    #[error("malformed object: expected '{{' at offset {offset}, found {found:#04x}")]
    MalformedObject {
        /// Byte offset into the stream where the object was expected
        offset: usize,
        /// The offending byte
        found: u8,
    },

    /// End of stream arrived inside an unterminated object
    #[error("truncated object: end of stream after {buffered} buffered bytes")]
    TruncatedObject {
        /// Bytes accumulated for the incomplete object
        buffered: usize,
    },

    /// A single object exceeded the buffering limit
    #[error("object too large: {size} bytes exceeds limit of {max}")]
    ObjectTooLarge {
        /// Observed (partial) object size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Object bytes were not valid UTF-8
    #[error("invalid utf-8 in object at byte {valid_up_to}")]
    InvalidUtf8 {
        /// Length of the valid prefix
        valid_up_to: usize,
    },

    /// JSON deserialization failed
    #[error("json decode error: {0}")]
    JsonDecode(String),

    /// JSON serialization failed
    #[error("json encode error: {0}")]
    JsonEncode(String),

    /// A base64 field failed to decode
    #[error("base64 decode error in field '{field}': {reason}")]
    Base64Decode {
        /// Field name carrying the bad value
        field: &'static str,
        /// Decoder error text
        reason: String,
    },

    /// A payload chunk named a compression algorithm we do not support
    #[error("unsupported compression algorithm: {algorithm}")]
    UnsupportedCompression {
        /// Algorithm name from the wire
        algorithm: String,
    },

    /// Decompression failed or exceeded the size limit
    #[error("decompression failed: {reason}")]
    Decompress {
        /// Codec error text
        reason: String,
    },

    /// The underlying byte source failed
    #[error("byte source error: {0}")]
    Source(String),
}

impl ProtocolError {
    /// True for errors that indicate malformed framing rather than a
    /// malformed field inside an otherwise well-delimited object.
    ///
    /// Framing errors carry no message ID because no header could be
    /// parsed from the stream.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::MalformedObject { .. }
                | Self::TruncatedObject { .. }
                | Self::ObjectTooLarge { .. }
                | Self::InvalidUtf8 { .. }
        )
    }
}
