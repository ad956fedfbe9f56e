//! Ed25519 crypto context for public-key entity authentication.
//!
//! Provides authentication only: sign and verify are real Ed25519
//! operations, while encrypt/decrypt and wrap/unwrap pass data
//! through unchanged. Confidentiality for entities using this scheme
//! comes from session keys established by key exchange, not from the
//! entity auth context itself.

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};

use crate::{CryptoContext, CryptoError};

/// Crypto context backed by an Ed25519 key pair.
///
/// Receivers hold only the verifying key; signing requires the
/// private half.
#[derive(Debug)]
pub struct Ed25519CryptoContext {
    verifying: VerifyingKey,
    signing: Option<SigningKey>,
}

impl Ed25519CryptoContext {
    /// Verify-only context from a public key.
    pub fn verifier(verifying: VerifyingKey) -> Self {
        Self { verifying, signing: None }
    }

    /// Full context from a signing key.
    pub fn signer(signing: SigningKey) -> Self {
        Self { verifying: signing.verifying_key(), signing: Some(signing) }
    }

    /// Verify-only context from raw public key bytes.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Malformed`] if the bytes are not a valid
    /// compressed Edwards point.
    pub fn from_public_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes = <[u8; 32]>::try_from(bytes).map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        let verifying = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::Malformed { reason: e.to_string() })?;
        Ok(Self::verifier(verifying))
    }

    /// The public half of this context's key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }
}

impl CryptoContext for Ed25519CryptoContext {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(ciphertext.to_vec())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        use ed25519_dalek::Signer;

        let signing =
            self.signing.as_ref().ok_or(CryptoError::Unsupported { operation: "sign" })?;
        Ok(signing.sign(data).to_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
            return Ok(false);
        };
        let signature = Signature::from_bytes(&bytes);
        Ok(self.verifying.verify_strict(data, &signature).is_ok())
    }

    fn wrap_key(&self, _key_material: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Err(CryptoError::Unsupported { operation: "wrap_key" })
    }

    fn unwrap_key(&self, _wrapped: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Err(CryptoError::Unsupported { operation: "unwrap_key" })
    }
}
