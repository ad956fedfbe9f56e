//! Test-double crypto contexts.

use crate::{CryptoContext, CryptoError};

/// No-op crypto context.
///
/// Encrypt and wrap are identity transforms, sign produces an empty
/// signature, verify always succeeds. Used in tests and wherever a
/// context is structurally required but no protection is wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCryptoContext;

impl CryptoContext for NullCryptoContext {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(ciphertext.to_vec())
    }

    fn sign(&self, _data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(Vec::new())
    }

    fn verify(&self, _data: &[u8], _signature: &[u8]) -> Result<bool, CryptoError> {
        Ok(true)
    }

    fn wrap_key(&self, key_material: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(key_material.to_vec())
    }

    fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(wrapped.to_vec())
    }
}

/// Crypto context whose verify always fails.
///
/// Everything else behaves like [`NullCryptoContext`]. Used to drive
/// verification-failure paths in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingCryptoContext;

impl CryptoContext for RejectingCryptoContext {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(ciphertext.to_vec())
    }

    fn sign(&self, _data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(Vec::new())
    }

    fn verify(&self, _data: &[u8], _signature: &[u8]) -> Result<bool, CryptoError> {
        Ok(false)
    }

    fn wrap_key(&self, key_material: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(key_material.to_vec())
    }

    fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(wrapped.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_context_is_identity() {
        let ctx = NullCryptoContext;
        assert_eq!(ctx.encrypt(b"data").unwrap(), b"data");
        assert_eq!(ctx.decrypt(b"data").unwrap(), b"data");
        assert_eq!(ctx.wrap_key(b"key").unwrap(), b"key");
        assert!(ctx.sign(b"data").unwrap().is_empty());
        assert!(ctx.verify(b"data", b"anything").unwrap());
    }

    #[test]
    fn rejecting_context_never_verifies() {
        let ctx = RejectingCryptoContext;
        let signature = ctx.sign(b"data").unwrap();
        assert!(!ctx.verify(b"data", &signature).unwrap());
    }
}
