//! Entity authentication: who is speaking, absent a master token.
//!
//! A header without a master token carries entity authentication data
//! in clear: a scheme name plus a scheme-specific claim. The factory
//! registered for the scheme interprets the claim, derives the entity
//! identity, and produces the crypto context that seals the header.
//!
//! Two reference schemes ship with the crate:
//! - [`PresharedEntityAuthFactory`]: symmetric keys shared out of
//!   band, keyed by PSK identity
//! - [`Ed25519EntityAuthFactory`]: trusted public keys; signatures
//!   only, no confidentiality

mod ed25519;
mod preshared;

pub use ed25519::Ed25519EntityAuthFactory;
pub use preshared::PresharedEntityAuthFactory;

use std::sync::Arc;

use sealframe_crypto::CryptoContext;
use sealframe_proto::envelope::EntityAuth;

use crate::error::SealError;

/// Resolved entity authentication: scheme, identity, and the raw
/// claim.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityAuthData {
    scheme: String,
    identity: String,
    raw: serde_json::Value,
}

impl EntityAuthData {
    /// Build resolved entity auth data.
    pub fn new(scheme: impl Into<String>, identity: impl Into<String>, raw: serde_json::Value) -> Self {
        Self { scheme: scheme.into(), identity: identity.into(), raw }
    }

    /// Scheme name.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Entity identity derived from the claim.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The raw scheme-specific claim.
    #[must_use]
    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }
}

/// Factory for one entity authentication scheme.
pub trait EntityAuthFactory: Send + Sync {
    /// Scheme name this factory handles.
    fn scheme(&self) -> &str;

    /// Interpret a wire claim: derive the identity and build the
    /// entity auth crypto context.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::EntityAuthVerificationFailed`] when the
    /// claim is malformed or names an unknown entity.
    fn authenticate(
        &self,
        auth: &EntityAuth,
    ) -> Result<(EntityAuthData, Arc<dyn CryptoContext>), SealError>;
}
