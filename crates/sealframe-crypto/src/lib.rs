//! Crypto context capabilities for the sealframe protocol.
//!
//! A [`CryptoContext`] is the capability set used to seal and open
//! protocol objects: encrypt, decrypt, sign, verify, wrap, unwrap.
//! Several contexts coexist in a running process (the process-wide
//! seal context, per-entity auth contexts, per-session contexts,
//! key-exchange contexts); all of them present this one interface so
//! the pipeline never cares which kind it holds.
//!
//! Concrete contexts:
//! - [`SymmetricCryptoContext`]: XChaCha20-Poly1305 + HMAC-SHA256
//! - [`Ed25519CryptoContext`]: signatures only, pass-through data
//! - [`NullCryptoContext`] / [`RejectingCryptoContext`]: test doubles

mod ed25519;
mod null;
mod symmetric;

pub use ed25519::Ed25519CryptoContext;
pub use null::{NullCryptoContext, RejectingCryptoContext};
pub use symmetric::{SESSION_KEY_SIZE, SessionKeys, SymmetricCryptoContext};

use thiserror::Error;

/// Errors from crypto context operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext failed authentication or could not be decrypted
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// What went wrong
        reason: String,
    },

    /// Input was structurally invalid (too short, bad framing)
    #[error("malformed crypto input: {reason}")]
    Malformed {
        /// What went wrong
        reason: String,
    },

    /// Key material had the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// This context cannot perform the requested operation
    #[error("operation not supported by this crypto context: {operation}")]
    Unsupported {
        /// Operation name
        operation: &'static str,
    },
}

/// Capability set shared by all crypto contexts.
///
/// Implementations must be usable behind `Arc<dyn CryptoContext>`
/// from multiple call sites of one logical task; `encrypt` may be
/// called through a shared reference.
pub trait CryptoContext: std::fmt::Debug + Send + Sync {
    /// Encrypt plaintext, producing a self-contained ciphertext.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Unsupported`] if this context cannot encrypt.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt a ciphertext produced by [`Self::encrypt`].
    ///
    /// # Errors
    ///
    /// [`CryptoError::DecryptionFailed`] on authentication failure,
    /// [`CryptoError::Malformed`] on structurally invalid input.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Sign `data`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Unsupported`] if this context cannot sign.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Verify a signature over `data`.
    ///
    /// Returns `Ok(false)` for a well-formed but wrong signature;
    /// structurally invalid signatures also verify as `false`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Unsupported`] if this context cannot verify.
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, CryptoError>;

    /// Wrap key material for transport.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Unsupported`] if this context cannot wrap.
    fn wrap_key(&self, key_material: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Unwrap key material wrapped by [`Self::wrap_key`].
    ///
    /// # Errors
    ///
    /// As [`Self::decrypt`].
    fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, CryptoError>;
}
