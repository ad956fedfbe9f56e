//! Wire format for the sealframe message security layer.
//!
//! A message on the wire is a concatenation of self-delimited JSON
//! objects in canonical UTF-8: one header envelope followed by zero or
//! more payload chunk envelopes. This crate owns everything below the
//! protocol semantics:
//!
//! - [`reader::FrameReader`]: incremental scanner yielding one
//!   complete object at a time from an abstract [`source::ByteSource`]
//! - [`envelope`]: serde structs for the envelopes and their
//!   decrypted plaintexts, with base64 field codecs
//! - [`compression`]: payload data codecs (GZIP, LZ4)
//!
//! Nothing in this crate verifies signatures or decrypts ciphertext.
//! Envelopes hold ciphertext as raw bytes; the protocol layer decides
//! which crypto context seals them.

pub mod compression;
pub mod envelope;
pub mod errors;
pub mod reader;
pub mod source;

pub use compression::CompressionAlgorithm;
pub use envelope::{
    Capabilities, Envelope, ErrorData, HeaderData, KeyRequest, KeyResponse, MasterTokenData,
    PayloadData, PayloadEnvelope, SealedToken, SessionData, UserData, UserIdTokenData,
};
pub use errors::{ProtocolError, Result};
pub use reader::{FramePull, FrameReader};
pub use source::{BufferSource, ByteSource, Pull};

/// Maximum size of a single wire object (16 MB).
///
/// The frame reader refuses to buffer past this, bounding memory for
/// a malicious or corrupt stream.
pub const MAX_OBJECT_SIZE: usize = 16 * 1024 * 1024;

/// Maximum value for message IDs, non-replayable IDs, and token
/// sequence/serial numbers (2^63 - 1).
///
/// IDs live in the non-negative range of a 64-bit signed integer so
/// the non-replayable acceptance window can wrap modulo 2^63.
pub const MAX_ID: u64 = i64::MAX as u64;

/// Sequence number carried by the first payload chunk of a message.
///
/// Subsequent chunks increase by exactly 1.
pub const FIRST_PAYLOAD_SEQUENCE: u64 = 1;
