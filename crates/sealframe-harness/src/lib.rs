//! Send-side builders for exercising the receive pipeline.
//!
//! The receive side is the product; this crate is the counterpart a
//! test needs: it issues tokens, seals headers and chunks, and
//! assembles complete wire messages. A [`TestEnv`] owns the shared
//! secrets (process seal keys, preshared entity keys, key-wrap keys)
//! and hands out matching contexts for both sides.
//!
//! Everything here is deterministic: keys are fixed, the clock is
//! pinned, token session keys derive from the serial number.

use std::{collections::HashMap, sync::Arc};

use sealframe_core::{
    FixedClock, Role, SealContext, SealStore,
    entityauth::PresharedEntityAuthFactory,
    keyx::{SYMMETRIC_WRAPPED, SymmetricWrappedKeyExchange},
    tokens::{MasterToken, MemoryTokenFactory},
};
use sealframe_crypto::{CryptoContext, SessionKeys, SymmetricCryptoContext};
use sealframe_proto::envelope::{
    self, Envelope, EntityAuth, HeaderData, KeyRequest, PayloadData, PayloadEnvelope, SealedToken,
};

/// PSK identity registered in every test environment.
pub const PSK_IDENTITY: &str = "entity-remote";

/// Wrap ID used by the symmetric-wrapped key exchange helpers.
pub const WRAP_ID: &str = "wrap-1";

/// The pinned wall-clock time of a fresh environment.
pub const NOW: u64 = 10_000;

/// Shared secrets and collaborators for one test case.
pub struct TestEnv {
    /// Controllable wall clock, pinned at [`NOW`].
    pub clock: Arc<FixedClock>,
    /// Token trust authority shared by all contexts from this env.
    pub token_factory: Arc<MemoryTokenFactory>,
    /// Session store shared by all contexts from this env.
    pub store: Arc<SealStore>,
    seal_keys: SessionKeys,
    psk_keys: SessionKeys,
    wrap_keys: SessionKeys,
}

impl TestEnv {
    /// Fresh environment with fixed secrets and a pinned clock.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(FixedClock::at(NOW)),
            token_factory: Arc::new(MemoryTokenFactory::new()),
            store: Arc::new(SealStore::new()),
            seal_keys: SessionKeys::new([0x5Eu8; 32], [0x5Fu8; 32]),
            psk_keys: SessionKeys::new([0x21u8; 32], [0x22u8; 32]),
            wrap_keys: SessionKeys::new([0x77u8; 32], [0x78u8; 32]),
        }
    }

    /// Receive-side context for the given role.
    ///
    /// Registers the preshared entity auth factory (with
    /// [`PSK_IDENTITY`]) and the symmetric-wrapped key exchange
    /// factory. The clock, token factory, and store are shared with
    /// the environment so tests can manipulate them.
    pub fn context(&self, role: Role) -> Arc<SealContext> {
        let entity_auth = PresharedEntityAuthFactory::new();
        entity_auth.add_entity(PSK_IDENTITY, self.psk_keys.clone());

        let mut ctx = SealContext::new(
            role,
            Arc::new(SymmetricCryptoContext::from_keys(self.seal_keys.clone())),
            self.token_factory.clone(),
        )
        .with_clock(self.clock.clone())
        .with_store(self.store.clone());
        ctx.register_entity_auth_factory(Arc::new(entity_auth));
        ctx.register_key_exchange_factory(Arc::new(SymmetricWrappedKeyExchange::new(
            self.wrap_crypto(),
        )));
        Arc::new(ctx)
    }

    /// The process-wide seal context (issues and verifies tokens).
    pub fn seal_crypto(&self) -> SymmetricCryptoContext {
        SymmetricCryptoContext::from_keys(self.seal_keys.clone())
    }

    /// Sender-side context for the preshared entity.
    pub fn psk_crypto(&self) -> SymmetricCryptoContext {
        SymmetricCryptoContext::from_keys(self.psk_keys.clone())
    }

    /// The shared key-wrap context.
    pub fn wrap_crypto(&self) -> Arc<dyn CryptoContext> {
        Arc::new(SymmetricCryptoContext::from_keys(self.wrap_keys.clone()))
    }

    /// Deterministic session keys for a token serial number.
    pub fn token_session_keys(serial_number: u64) -> SessionKeys {
        let mut secret = [0u8; 32];
        secret[..8].copy_from_slice(&serial_number.to_be_bytes());
        SessionKeys::derive(&secret)
    }

    /// Issue a master token for `identity`, fresh until `expiration`.
    pub fn issue_master_token(
        &self,
        identity: &str,
        sequence_number: u64,
        serial_number: u64,
        renewal_window: u64,
        expiration: u64,
    ) -> (MasterToken, SealedToken) {
        MasterToken::issue(
            &self.seal_crypto(),
            identity,
            sequence_number,
            serial_number,
            renewal_window,
            expiration,
            &Self::token_session_keys(serial_number),
            None,
        )
        .unwrap_or_else(|e| panic!("token issue failed: {e}"))
    }

    /// Sender-side session context for a token from this env.
    pub fn session_crypto(&self, serial_number: u64) -> SymmetricCryptoContext {
        SymmetricCryptoContext::from_keys(Self::token_session_keys(serial_number))
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Header data with sane defaults: nothing optional set.
pub fn header_data(message_id: u64) -> HeaderData {
    HeaderData {
        messageid: message_id,
        nonreplayableid: None,
        renewable: false,
        handshake: false,
        capabilities: None,
        keyrequestdata: Vec::new(),
        keyresponsedata: None,
        userauthdata: None,
        useridtoken: None,
        servicetokens: Vec::new(),
    }
}

/// The preshared entity auth claim for [`PSK_IDENTITY`].
pub fn psk_claim() -> EntityAuth {
    EntityAuth {
        scheme: "preshared".to_string(),
        authdata: serde_json::json!({ "pskid": PSK_IDENTITY }),
    }
}

/// A key request for the symmetric-wrapped scheme under [`WRAP_ID`].
pub fn wrap_request() -> KeyRequest {
    KeyRequest {
        scheme: SYMMETRIC_WRAPPED.to_string(),
        keydata: serde_json::json!({ "wrapid": WRAP_ID }),
    }
}

/// Seal a message header under an entity auth credential.
pub fn seal_header_psk(env: &TestEnv, data: &HeaderData) -> Vec<u8> {
    seal_header(Some(psk_claim()), None, &env.psk_crypto(), data)
}

/// Seal a message header under a master token credential.
pub fn seal_header_with_token(
    token_wire: &SealedToken,
    session_crypto: &dyn CryptoContext,
    data: &HeaderData,
) -> Vec<u8> {
    seal_header(None, Some(token_wire.clone()), session_crypto, data)
}

fn seal_header(
    entityauthdata: Option<EntityAuth>,
    mastertoken: Option<SealedToken>,
    crypto: &dyn CryptoContext,
    data: &HeaderData,
) -> Vec<u8> {
    let plaintext = envelope::encode(data).unwrap_or_else(|e| panic!("encode failed: {e}"));
    let headerdata = crypto.encrypt(&plaintext).unwrap_or_else(|e| panic!("seal failed: {e}"));
    let signature = crypto.sign(&headerdata).unwrap_or_else(|e| panic!("sign failed: {e}"));
    let sealed = Envelope {
        entityauthdata,
        mastertoken,
        headerdata: Some(headerdata),
        errordata: None,
        signature,
    };
    envelope::encode(&sealed).unwrap_or_else(|e| panic!("encode failed: {e}"))
}

/// Seal one payload chunk.
pub fn seal_chunk(
    crypto: &dyn CryptoContext,
    sequence: u64,
    message_id: u64,
    end_of_message: bool,
    data: &[u8],
) -> Vec<u8> {
    seal_chunk_with(crypto, sequence, message_id, end_of_message, None, data)
}

/// Seal one payload chunk with optional compression.
pub fn seal_chunk_with(
    crypto: &dyn CryptoContext,
    sequence: u64,
    message_id: u64,
    end_of_message: bool,
    compression: Option<sealframe_proto::CompressionAlgorithm>,
    data: &[u8],
) -> Vec<u8> {
    let (compressionalgo, body) = match compression {
        Some(algorithm) => {
            let compressed = sealframe_proto::compression::compress(algorithm, data)
                .unwrap_or_else(|e| panic!("compress failed: {e}"));
            (Some(algorithm.name().to_string()), compressed)
        },
        None => (None, data.to_vec()),
    };

    let plaintext = envelope::encode(&PayloadData {
        sequencenumber: sequence,
        messageid: message_id,
        endofmsg: end_of_message,
        compressionalgo,
        data: body,
    })
    .unwrap_or_else(|e| panic!("encode failed: {e}"));
    let payload = crypto.encrypt(&plaintext).unwrap_or_else(|e| panic!("seal failed: {e}"));
    let signature = crypto.sign(&payload).unwrap_or_else(|e| panic!("sign failed: {e}"));
    envelope::encode(&PayloadEnvelope { payload, signature })
        .unwrap_or_else(|e| panic!("encode failed: {e}"))
}

/// Concatenate wire parts into one message byte vector.
pub fn assemble(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut wire = Vec::new();
    for part in parts {
        wire.extend_from_slice(part);
    }
    wire
}

/// Empty service-token crypto context map.
pub fn no_service_cryptos() -> HashMap<String, Arc<dyn CryptoContext>> {
    HashMap::new()
}
