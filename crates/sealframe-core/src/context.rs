//! Process context: everything the receive pipeline needs injected.
//!
//! A [`SealContext`] bundles the process-wide seal crypto context,
//! the factory registries, the token factory, the session store, the
//! deployment role, and the clock. Streams borrow it through an
//! `Arc`; tests build a fresh context per case.

use std::{collections::HashMap, sync::Arc};

use sealframe_crypto::CryptoContext;

use crate::{
    clock::{Clock, SystemClock},
    entityauth::EntityAuthFactory,
    keyx::KeyExchangeFactory,
    store::SealStore,
    tokens::TokenFactory,
};

/// Deployment role of the local entity.
///
/// The role decides two things: whether an expired master token is
/// tolerated (a trusted-network client accepts them because only the
/// server can rotate), and whose crypto context carries the payload
/// when a key response is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client in a trusted network: the remote side is the server
    TrustedNetworkClient,
    /// Server in a trusted network
    TrustedNetworkServer,
    /// Peer-to-peer: both sides hold master tokens
    PeerToPeer,
}

impl Role {
    /// Whether this is the peer-to-peer deployment.
    #[must_use]
    pub fn is_peer_to_peer(&self) -> bool {
        matches!(self, Self::PeerToPeer)
    }
}

/// Injected collaborators for the receive pipeline.
pub struct SealContext {
    role: Role,
    crypto: Arc<dyn CryptoContext>,
    token_factory: Arc<dyn TokenFactory>,
    store: Arc<SealStore>,
    clock: Arc<dyn Clock>,
    entity_auth_factories: HashMap<String, Arc<dyn EntityAuthFactory>>,
    keyx_factories: HashMap<String, Arc<dyn KeyExchangeFactory>>,
}

impl SealContext {
    /// Context with the system clock and a fresh store.
    pub fn new(
        role: Role,
        crypto: Arc<dyn CryptoContext>,
        token_factory: Arc<dyn TokenFactory>,
    ) -> Self {
        Self {
            role,
            crypto,
            token_factory,
            store: Arc::new(SealStore::new()),
            clock: Arc::new(SystemClock),
            entity_auth_factories: HashMap::new(),
            keyx_factories: HashMap::new(),
        }
    }

    /// Replace the clock (tests pin time with this).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the session store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<SealStore>) -> Self {
        self.store = store;
        self
    }

    /// Register an entity auth factory under its scheme name.
    pub fn register_entity_auth_factory(&mut self, factory: Arc<dyn EntityAuthFactory>) {
        self.entity_auth_factories.insert(factory.scheme().to_string(), factory);
    }

    /// Register a key exchange factory under its scheme name.
    pub fn register_key_exchange_factory(&mut self, factory: Arc<dyn KeyExchangeFactory>) {
        self.keyx_factories.insert(factory.scheme().to_string(), factory);
    }

    /// Deployment role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Process-wide seal crypto context (verifies master tokens).
    #[must_use]
    pub fn crypto(&self) -> &Arc<dyn CryptoContext> {
        &self.crypto
    }

    /// Token trust authority.
    #[must_use]
    pub fn token_factory(&self) -> &Arc<dyn TokenFactory> {
        &self.token_factory
    }

    /// Session context cache.
    #[must_use]
    pub fn store(&self) -> &Arc<SealStore> {
        &self.store
    }

    /// Current epoch seconds.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Entity auth factory for a scheme, if registered.
    #[must_use]
    pub fn entity_auth_factory(&self, scheme: &str) -> Option<&Arc<dyn EntityAuthFactory>> {
        self.entity_auth_factories.get(scheme)
    }

    /// Key exchange factory for a scheme, if registered.
    #[must_use]
    pub fn key_exchange_factory(&self, scheme: &str) -> Option<&Arc<dyn KeyExchangeFactory>> {
        self.keyx_factories.get(scheme)
    }
}

#[cfg(test)]
mod tests {
    use sealframe_crypto::NullCryptoContext;

    use super::*;
    use crate::{clock::FixedClock, tokens::MemoryTokenFactory};

    #[test]
    fn factories_resolve_by_scheme() {
        let mut ctx = SealContext::new(
            Role::TrustedNetworkClient,
            Arc::new(NullCryptoContext),
            Arc::new(MemoryTokenFactory::new()),
        );
        ctx.register_entity_auth_factory(Arc::new(
            crate::entityauth::PresharedEntityAuthFactory::new(),
        ));

        assert!(ctx.entity_auth_factory("preshared").is_some());
        assert!(ctx.entity_auth_factory("x509").is_none());
        assert!(ctx.key_exchange_factory("symmetric_wrapped").is_none());
    }

    #[test]
    fn clock_is_injectable() {
        let ctx = SealContext::new(
            Role::PeerToPeer,
            Arc::new(NullCryptoContext),
            Arc::new(MemoryTokenFactory::new()),
        )
        .with_clock(Arc::new(FixedClock::at(1234)));

        assert_eq!(ctx.now(), 1234);
        assert!(ctx.role().is_peer_to_peer());
    }
}
