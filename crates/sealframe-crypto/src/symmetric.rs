//! Symmetric crypto context: XChaCha20-Poly1305 + HMAC-SHA256.
//!
//! Ciphertexts are self-contained: a 24-byte nonce followed by the
//! AEAD output (which includes the 16-byte Poly1305 tag). Nonces are
//! a caller-provided 16-byte prefix plus a monotonic 8-byte counter,
//! unique per context instance.
//!
//! Signatures are 32-byte HMAC-SHA256 tags, verified in constant
//! time.

use std::sync::atomic::{AtomicU64, Ordering};

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{CryptoContext, CryptoError};

type HmacSha256 = Hmac<Sha256>;

/// Size of both session keys in bytes.
pub const SESSION_KEY_SIZE: usize = 32;

/// XChaCha20 nonce size.
const NONCE_SIZE: usize = 24;

/// HMAC-SHA256 tag size.
const SIGNATURE_SIZE: usize = 32;

/// Label for deriving the encryption key from a shared secret.
const ENCRYPTION_LABEL: &[u8] = b"encryption";

/// Label for deriving the HMAC key from a shared secret.
const HMAC_LABEL: &[u8] = b"hmac";

/// Label for deriving a nonce prefix from the encryption key.
const NONCE_LABEL: &[u8] = b"nonce";

/// Paired session keys: one for the AEAD, one for signatures.
///
/// Key material is zeroized on drop.
#[derive(Clone)]
pub struct SessionKeys {
    encryption_key: [u8; SESSION_KEY_SIZE],
    hmac_key: [u8; SESSION_KEY_SIZE],
}

impl SessionKeys {
    /// Build from raw key bytes.
    pub fn new(encryption_key: [u8; SESSION_KEY_SIZE], hmac_key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { encryption_key, hmac_key }
    }

    /// Build from variable-length slices, validating lengths.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidKeyLength`] if either slice is not
    /// [`SESSION_KEY_SIZE`] bytes.
    pub fn from_slices(encryption_key: &[u8], hmac_key: &[u8]) -> Result<Self, CryptoError> {
        let encryption_key = <[u8; SESSION_KEY_SIZE]>::try_from(encryption_key).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: SESSION_KEY_SIZE,
                actual: encryption_key.len(),
            }
        })?;
        let hmac_key = <[u8; SESSION_KEY_SIZE]>::try_from(hmac_key).map_err(|_| {
            CryptoError::InvalidKeyLength { expected: SESSION_KEY_SIZE, actual: hmac_key.len() }
        })?;
        Ok(Self { encryption_key, hmac_key })
    }

    /// Derive both keys from a 32-byte shared secret.
    ///
    /// Each key is `HMAC-SHA256(secret, label)` with distinct labels,
    /// so compromise of one key reveals nothing about the other.
    pub fn derive(secret: &[u8; SESSION_KEY_SIZE]) -> Self {
        Self {
            encryption_key: hmac_label(secret, ENCRYPTION_LABEL),
            hmac_key: hmac_label(secret, HMAC_LABEL),
        }
    }

    /// Encryption key bytes.
    pub fn encryption_key(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.encryption_key
    }

    /// HMAC key bytes.
    pub fn hmac_key(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.hmac_key
    }
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.encryption_key.zeroize();
        self.hmac_key.zeroize();
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never appears in logs.
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

fn hmac_label(key: &[u8], label: &[u8]) -> [u8; SESSION_KEY_SIZE] {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(label);
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; SESSION_KEY_SIZE];
    out.copy_from_slice(&result);
    out
}

/// Symmetric crypto context over a pair of session keys.
pub struct SymmetricCryptoContext {
    keys: SessionKeys,
    nonce_prefix: [u8; 16],
    counter: AtomicU64,
}

impl std::fmt::Debug for SymmetricCryptoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricCryptoContext")
            .field("keys", &"<redacted>")
            .field("nonce_prefix", &self.nonce_prefix)
            .field("counter", &self.counter)
            .finish()
    }
}

impl SymmetricCryptoContext {
    /// Create a context with an explicit nonce prefix.
    ///
    /// The prefix must be unique among contexts sharing the same
    /// encryption key; the caller provides it so construction stays
    /// deterministic under test.
    pub fn new(keys: SessionKeys, nonce_prefix: [u8; 16]) -> Self {
        Self { keys, nonce_prefix, counter: AtomicU64::new(0) }
    }

    /// Create a context whose nonce prefix is derived from the
    /// encryption key.
    ///
    /// Suitable when at most one context exists per key, which holds
    /// for session contexts keyed by master token serial number.
    pub fn from_keys(keys: SessionKeys) -> Self {
        let derived = hmac_label(keys.encryption_key(), NONCE_LABEL);
        let mut nonce_prefix = [0u8; 16];
        nonce_prefix.copy_from_slice(&derived[..16]);
        Self::new(keys, nonce_prefix)
    }

    fn next_nonce(&self) -> [u8; NONCE_SIZE] {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..16].copy_from_slice(&self.nonce_prefix);
        nonce[16..].copy_from_slice(&counter.to_be_bytes());
        nonce
    }
}

impl CryptoContext for SymmetricCryptoContext {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.next_nonce();
        let cipher = XChaCha20Poly1305::new(self.keys.encryption_key().into());

        let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
            unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
        };

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(CryptoError::Malformed {
                reason: format!("ciphertext shorter than {NONCE_SIZE}-byte nonce"),
            });
        }
        let (nonce, body) = ciphertext.split_at(NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new(self.keys.encryption_key().into());

        cipher.decrypt(XNonce::from_slice(nonce), body).map_err(|_| {
            CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
        })
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(self.keys.hmac_key()) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        if signature.len() != SIGNATURE_SIZE {
            return Ok(false);
        }
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(self.keys.hmac_key()) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(data);
        Ok(mac.verify_slice(signature).is_ok())
    }

    fn wrap_key(&self, key_material: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.encrypt(key_material)
    }

    fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decrypt(wrapped)
    }
}
