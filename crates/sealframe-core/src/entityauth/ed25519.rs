//! Ed25519 entity authentication.
//!
//! The claim names an identity whose public key the receiver already
//! trusts. The derived context verifies signatures only; header data
//! sealed under it passes through unencrypted, so entities using this
//! scheme rely on key exchange for confidentiality.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use ed25519_dalek::VerifyingKey;
use sealframe_crypto::{CryptoContext, Ed25519CryptoContext};
use sealframe_proto::envelope::EntityAuth;

use crate::{
    entityauth::{EntityAuthData, EntityAuthFactory},
    error::{ErrorKind, SealError},
};

/// Wire scheme name.
pub const SCHEME: &str = "ed25519";

/// Entity auth factory over a table of trusted verifying keys.
pub struct Ed25519EntityAuthFactory {
    trusted: Mutex<HashMap<String, VerifyingKey>>,
}

impl Ed25519EntityAuthFactory {
    /// Empty factory; add entities with [`Self::trust_entity`].
    pub fn new() -> Self {
        Self { trusted: Mutex::new(HashMap::new()) }
    }

    /// Trust a verifying key for an identity.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn trust_entity(&self, identity: impl Into<String>, key: VerifyingKey) {
        self.trusted.lock().expect("Mutex poisoned").insert(identity.into(), key);
    }
}

impl Default for Ed25519EntityAuthFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityAuthFactory for Ed25519EntityAuthFactory {
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
        let identity = auth.authdata.get("identity").and_then(|v| v.as_str()).ok_or_else(
            || SealError::new(ErrorKind::EntityAuthVerificationFailed, "claim is missing identity"),
        )?;

        let key = self
            .trusted
            .lock()
            .expect("Mutex poisoned")
            .get(identity)
            .copied()
            .ok_or_else(|| {
                SealError::new(
                    ErrorKind::EntityAuthVerificationFailed,
                    format!("no trusted key for '{identity}'"),
                )
            })?;

        let data = EntityAuthData::new(SCHEME, identity, auth.authdata.clone());
        let crypto = Arc::new(Ed25519CryptoContext::verifier(key));
        Ok((data, crypto))
    }
}
