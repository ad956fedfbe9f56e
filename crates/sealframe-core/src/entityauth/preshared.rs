//! Preshared-key entity authentication.
//!
//! The claim names a PSK identity; both sides hold the corresponding
//! symmetric key pair out of band. The derived context provides full
//! confidentiality and authentication for the header.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use sealframe_crypto::{CryptoContext, SessionKeys, SymmetricCryptoContext};
use sealframe_proto::envelope::EntityAuth;

use crate::{
    entityauth::{EntityAuthData, EntityAuthFactory},
    error::{ErrorKind, SealError},
};

/// Wire scheme name.
pub const SCHEME: &str = "preshared";

/// Entity auth factory over a table of preshared keys.
pub struct PresharedEntityAuthFactory {
    keys: Mutex<HashMap<String, SessionKeys>>,
}

impl PresharedEntityAuthFactory {
    /// Empty factory; add entities with [`Self::add_entity`].
    pub fn new() -> Self {
        Self { keys: Mutex::new(HashMap::new()) }
    }

    /// Register the preshared keys for a PSK identity.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn add_entity(&self, identity: impl Into<String>, keys: SessionKeys) {
        self.keys.lock().expect("Mutex poisoned").insert(identity.into(), keys);
    }
}

impl Default for PresharedEntityAuthFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityAuthFactory for PresharedEntityAuthFactory {
    fn scheme(&self) -> &str {
        SCHEME
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn authenticate(
        &self,
        auth: &EntityAuth,
    ) -> Result<(EntityAuthData, Arc<dyn CryptoContext>), SealError> {
        let pskid = auth.authdata.get("pskid").and_then(|v| v.as_str()).ok_or_else(|| {
            SealError::new(ErrorKind::EntityAuthVerificationFailed, "claim is missing pskid")
        })?;

        let keys = self
            .keys
            .lock()
            .expect("Mutex poisoned")
            .get(pskid)
            .cloned()
            .ok_or_else(|| {
                SealError::new(
                    ErrorKind::EntityAuthVerificationFailed,
                    format!("unknown psk identity '{pskid}'"),
                )
            })?;

        let data = EntityAuthData::new(SCHEME, pskid, auth.authdata.clone());
        let crypto = Arc::new(SymmetricCryptoContext::from_keys(keys));
        Ok((data, crypto))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(pskid: &str) -> EntityAuth {
        EntityAuth {
            scheme: SCHEME.to_string(),
            authdata: serde_json::json!({ "pskid": pskid }),
        }
    }

    #[test]
    fn known_entity_authenticates() {
        let factory = PresharedEntityAuthFactory::new();
        factory.add_entity("entity-a", SessionKeys::new([1u8; 32], [2u8; 32]));

        let (data, crypto) = factory.authenticate(&claim("entity-a")).unwrap();
        assert_eq!(data.identity(), "entity-a");
        assert_eq!(data.scheme(), SCHEME);

        // Context must be symmetric with both directions usable.
        let sealed = crypto.encrypt(b"header").unwrap();
        assert_eq!(crypto.decrypt(&sealed).unwrap(), b"header");
    }

    #[test]
    fn unknown_entity_rejected() {
        let factory = PresharedEntityAuthFactory::new();
        let err = factory.authenticate(&claim("nobody")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntityAuthVerificationFailed);
    }

    #[test]
    fn malformed_claim_rejected() {
        let factory = PresharedEntityAuthFactory::new();
        let auth = EntityAuth { scheme: SCHEME.to_string(), authdata: serde_json::json!({}) };
        let err = factory.authenticate(&auth).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntityAuthVerificationFailed);
    }

    #[test]
    fn same_identity_yields_interoperable_contexts() {
        let factory = PresharedEntityAuthFactory::new();
        factory.add_entity("entity-a", SessionKeys::new([1u8; 32], [2u8; 32]));

        let (_, sender) = factory.authenticate(&claim("entity-a")).unwrap();
        let (_, receiver) = factory.authenticate(&claim("entity-a")).unwrap();

        let sealed = sender.encrypt(b"cross").unwrap();
        assert_eq!(receiver.decrypt(&sealed).unwrap(), b"cross");

        let signature = sender.sign(b"cross").unwrap();
        assert!(receiver.verify(b"cross", &signature).unwrap());
    }
}
