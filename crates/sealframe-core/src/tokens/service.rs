//! Service tokens: opaque application tokens carried in headers.
//!
//! The pipeline does not interpret service token contents. If the
//! caller supplied a crypto context for a token's name the data is
//! opened with it; otherwise, and on any failure to open, the data is
//! retained opaque. Service tokens never fail a message.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use sealframe_crypto::CryptoContext;
use sealframe_proto::envelope::ServiceTokenWire;
use tracing::debug;

/// An application service token from a message header.
#[derive(Debug, Clone)]
pub struct ServiceToken {
    name: String,
    mt_serial_number: Option<u64>,
    ut_serial_number: Option<u64>,
    data: Bytes,
    decrypted: bool,
}

impl ServiceToken {
    /// Resolve a wire token against the caller's crypto contexts.
    pub fn from_wire(
        wire: &ServiceTokenWire,
        contexts: &HashMap<String, Arc<dyn CryptoContext>>,
    ) -> Self {
        let (data, decrypted) = match contexts.get(&wire.name) {
            Some(crypto) => match crypto.decrypt(&wire.data) {
                Ok(plaintext) => (Bytes::from(plaintext), true),
                Err(e) => {
                    debug!(name = %wire.name, error = %e, "service token kept opaque");
                    (Bytes::copy_from_slice(&wire.data), false)
                },
            },
            None => (Bytes::copy_from_slice(&wire.data), false),
        };

        Self {
            name: wire.name.clone(),
            mt_serial_number: wire.mtserialnumber,
            ut_serial_number: wire.utserialnumber,
            data,
            decrypted,
        }
    }

    /// Application-chosen token name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Master token serial this token is bound to, if any.
    #[must_use]
    pub fn mt_serial_number(&self) -> Option<u64> {
        self.mt_serial_number
    }

    /// User-ID token serial this token is bound to, if any.
    #[must_use]
    pub fn ut_serial_number(&self) -> Option<u64> {
        self.ut_serial_number
    }

    /// Token data: plaintext if [`Self::is_decrypted`], raw otherwise.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Whether a caller-provided context opened this token.
    #[must_use]
    pub fn is_decrypted(&self) -> bool {
        self.decrypted
    }
}

#[cfg(test)]
mod tests {
    use sealframe_crypto::{SessionKeys, SymmetricCryptoContext};

    use super::*;

    fn wire(name: &str, data: Vec<u8>) -> ServiceTokenWire {
        ServiceTokenWire {
            name: name.to_string(),
            mtserialnumber: Some(77),
            utserialnumber: None,
            data,
        }
    }

    #[test]
    fn without_context_stays_opaque() {
        let token = ServiceToken::from_wire(&wire("app.profile", vec![1, 2, 3]), &HashMap::new());
        assert!(!token.is_decrypted());
        assert_eq!(token.data().as_ref(), &[1, 2, 3]);
        assert_eq!(token.mt_serial_number(), Some(77));
    }

    #[test]
    fn with_context_decrypts() {
        let crypto = Arc::new(SymmetricCryptoContext::new(
            SessionKeys::new([1u8; 32], [2u8; 32]),
            [0x33; 16],
        ));
        let sealed = crypto.encrypt(b"profile bytes").unwrap();

        let mut contexts: HashMap<String, Arc<dyn CryptoContext>> = HashMap::new();
        contexts.insert("app.profile".to_string(), crypto);

        let token = ServiceToken::from_wire(&wire("app.profile", sealed), &contexts);
        assert!(token.is_decrypted());
        assert_eq!(token.data().as_ref(), b"profile bytes");
    }

    #[test]
    fn failed_decryption_stays_opaque() {
        let crypto = Arc::new(SymmetricCryptoContext::new(
            SessionKeys::new([1u8; 32], [2u8; 32]),
            [0x33; 16],
        ));
        let mut contexts: HashMap<String, Arc<dyn CryptoContext>> = HashMap::new();
        contexts.insert("app.profile".to_string(), crypto);

        let token = ServiceToken::from_wire(&wire("app.profile", vec![0xFF; 8]), &contexts);
        assert!(!token.is_decrypted());
        assert_eq!(token.data().as_ref(), &[0xFF; 8]);
    }
}
