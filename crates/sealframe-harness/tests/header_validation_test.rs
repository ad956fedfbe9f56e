//! Header-phase enforcement: master token trust, the session cache,
//! revocations, user-ID token binding, and expiry rules by role.

use std::{sync::Arc, time::Duration};

use sealframe_core::{
    ErrorKind, MessageInputStream, ReadOutcome, Role, SealContext,
    tokens::UserIdToken,
};
use sealframe_crypto::{CryptoContext, SessionKeys, SymmetricCryptoContext};
use sealframe_harness::{
    TestEnv, assemble, header_data, no_service_cryptos, seal_chunk, seal_header_psk,
    seal_header_with_token, wrap_request,
};
use sealframe_proto::BufferSource;

const TIMEOUT: Duration = Duration::from_millis(200);

fn stream_with(
    ctx: Arc<SealContext>,
    wire: Vec<u8>,
) -> MessageInputStream<BufferSource> {
    MessageInputStream::new(ctx, BufferSource::new(wire), Vec::new(), no_service_cryptos())
}

#[test]
fn master_token_message_resolves_identity_and_session() {
    let env = TestEnv::new();
    let (_, token_wire) = env.issue_master_token("entity-a", 1, 77, 20_000, 30_000);
    let session = env.session_crypto(77);

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &header_data(5)),
        seal_chunk(&session, 1, 5, true, b"hello"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    assert!(stream.is_ready(TIMEOUT).unwrap());
    assert_eq!(stream.identity(), Some("entity-a"));

    // The session context is now cached for the serial number.
    assert!(env.store.cached(77).is_some());

    assert_eq!(
        stream.read(Some(usize::MAX), TIMEOUT).unwrap(),
        ReadOutcome::Data(b"hello".as_ref().into())
    );
}

#[test]
fn unverifiable_token_without_cache_is_untrusted() {
    let env = TestEnv::new();

    // Token sealed by a foreign process context.
    let foreign = SymmetricCryptoContext::from_keys(SessionKeys::new([0xEE; 32], [0xEF; 32]));
    let (_, token_wire) = sealframe_core::tokens::MasterToken::issue(
        &foreign,
        "entity-a",
        1,
        77,
        20_000,
        30_000,
        &TestEnv::token_session_keys(77),
        None,
    )
    .unwrap();
    let session = env.session_crypto(77);

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &header_data(5)),
        seal_chunk(&session, 1, 5, true, b"x"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MasterTokenUntrusted);
    assert!(err.master_token().is_some());
}

#[test]
fn cached_session_context_vouches_for_unverifiable_token() {
    let env = TestEnv::new();

    let foreign = SymmetricCryptoContext::from_keys(SessionKeys::new([0xEE; 32], [0xEF; 32]));
    let (_, token_wire) = sealframe_core::tokens::MasterToken::issue(
        &foreign,
        "entity-a",
        1,
        77,
        20_000,
        30_000,
        &TestEnv::token_session_keys(77),
        None,
    )
    .unwrap();
    let session = env.session_crypto(77);

    // Pre-install the session context, as if a prior message had
    // established it.
    env.store.save(77, Arc::new(env.session_crypto(77)));

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &header_data(5)),
        seal_chunk(&session, 1, 5, true, b"vouched"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    assert!(stream.is_ready(TIMEOUT).unwrap());

    // The token never verified, so it exposes no identity.
    assert_eq!(stream.identity(), None);
    assert_eq!(
        stream.read(Some(usize::MAX), TIMEOUT).unwrap(),
        ReadOutcome::Data(b"vouched".as_ref().into())
    );
}

#[test]
fn revoked_entity_is_rejected() {
    let env = TestEnv::new();
    env.token_factory.revoke_entity(sealframe_harness::PSK_IDENTITY);

    let crypto = env.psk_crypto();
    let wire = assemble(&[
        seal_header_psk(&env, &header_data(5)),
        seal_chunk(&crypto, 1, 5, true, b"x"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityRevoked);
    assert_eq!(err.message_id(), Some(5));
}

#[test]
fn revoked_master_token_identity_is_rejected() {
    let env = TestEnv::new();
    env.token_factory.revoke_entity("entity-a");

    let (_, token_wire) = env.issue_master_token("entity-a", 1, 77, 20_000, 30_000);
    let session = env.session_crypto(77);
    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &header_data(5)),
        seal_chunk(&session, 1, 5, true, b"x"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MasterTokenIdentityRevoked);
}

#[test]
fn revoked_master_token_is_rejected() {
    let env = TestEnv::new();
    env.token_factory.revoke_master_token(77);

    let (_, token_wire) = env.issue_master_token("entity-a", 1, 77, 20_000, 30_000);
    let session = env.session_crypto(77);
    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &header_data(5)),
        seal_chunk(&session, 1, 5, true, b"x"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MasterTokenRevoked);
    assert_eq!(err.message_id(), Some(5));
}

#[test]
fn user_id_token_resolves_user() {
    let env = TestEnv::new();
    let (token, token_wire) = env.issue_master_token("entity-a", 1, 77, 20_000, 30_000);
    let session = env.session_crypto(77);

    let (_, user_wire) =
        UserIdToken::issue(&env.seal_crypto(), &token, "alice", 3, 20_000, 30_000).unwrap();

    let mut data = header_data(5);
    data.useridtoken = Some(user_wire);

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &data),
        seal_chunk(&session, 1, 5, true, b"x"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    assert!(stream.is_ready(TIMEOUT).unwrap());
    assert_eq!(stream.user(), Some("alice"));
    assert_eq!(stream.identity(), Some("entity-a"));
}

#[test]
fn unbound_user_id_token_is_untrusted() {
    let env = TestEnv::new();
    let (_, token_wire) = env.issue_master_token("entity-a", 1, 77, 20_000, 30_000);
    let (other_token, _) = env.issue_master_token("entity-a", 2, 78, 20_000, 30_000);
    let session = env.session_crypto(77);

    // Token bound to serial 78, presented with serial 77.
    let (_, user_wire) =
        UserIdToken::issue(&env.seal_crypto(), &other_token, "alice", 3, 20_000, 30_000)
            .unwrap();

    let mut data = header_data(5);
    data.useridtoken = Some(user_wire);

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &data),
        seal_chunk(&session, 1, 5, true, b"x"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserIdTokenUntrusted);
    assert!(err.user_id_token().is_some());
}

#[test]
fn revoked_user_id_token_is_rejected() {
    let env = TestEnv::new();
    env.token_factory.revoke_user_id_token(3);

    let (token, token_wire) = env.issue_master_token("entity-a", 1, 77, 20_000, 30_000);
    let session = env.session_crypto(77);
    let (_, user_wire) =
        UserIdToken::issue(&env.seal_crypto(), &token, "alice", 3, 20_000, 30_000).unwrap();

    let mut data = header_data(5);
    data.useridtoken = Some(user_wire);

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &data),
        seal_chunk(&session, 1, 5, true, b"x"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserIdTokenRevoked);
}

/// Expired token, no renewal possible: rejected everywhere except by
/// a trusted-network client.
#[test]
fn expired_token_rejected_by_server() {
    let env = TestEnv::new();
    // Expired at 5_000; the clock is pinned at 10_000.
    let (_, token_wire) = env.issue_master_token("entity-a", 1, 77, 1_000, 5_000);
    let session = env.session_crypto(77);

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &header_data(5)),
        seal_chunk(&session, 1, 5, true, b"x"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MessageExpired);
    assert_eq!(err.message_id(), Some(5));
}

#[test]
fn expired_token_accepted_by_trusted_network_client() {
    let env = TestEnv::new();
    let (_, token_wire) = env.issue_master_token("entity-a", 1, 77, 1_000, 5_000);
    let session = env.session_crypto(77);

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &header_data(5)),
        seal_chunk(&session, 1, 5, true, b"ok"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkClient), wire);
    assert!(stream.is_ready(TIMEOUT).unwrap());
    assert_eq!(
        stream.read(Some(usize::MAX), TIMEOUT).unwrap(),
        ReadOutcome::Data(b"ok".as_ref().into())
    );
}

#[test]
fn expired_renewable_token_with_key_requests_accepted() {
    let env = TestEnv::new();
    let (_, token_wire) = env.issue_master_token("entity-a", 1, 77, 1_000, 5_000);
    let session = env.session_crypto(77);

    let mut data = header_data(5);
    data.renewable = true;
    data.keyrequestdata = vec![wrap_request()];

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &data),
        seal_chunk(&session, 1, 5, true, b"renewing"),
    ]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    assert!(stream.is_ready(TIMEOUT).unwrap());
}

#[test]
fn expired_renewable_token_without_key_requests_rejected() {
    let env = TestEnv::new();
    let (_, token_wire) = env.issue_master_token("entity-a", 1, 77, 1_000, 5_000);
    let session = env.session_crypto(77);

    let mut data = header_data(5);
    data.renewable = true;

    let wire = assemble(&[
        seal_header_with_token(&token_wire, &session, &data),
        seal_chunk(&session, 1, 5, true, b"x"),
    ]);

    let mut stream = stream_with(env.context(Role::PeerToPeer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MessageExpired);
}

#[test]
fn unknown_entity_auth_scheme_is_rejected() {
    let env = TestEnv::new();
    let crypto = env.psk_crypto();

    // Re-seal a header claiming an unregistered scheme.
    let data = header_data(5);
    let plaintext = serde_json::to_vec(&data).unwrap();
    let headerdata = crypto.encrypt(&plaintext).unwrap();
    let signature = crypto.sign(&headerdata).unwrap();
    let sealed = sealframe_proto::envelope::Envelope {
        entityauthdata: Some(sealframe_proto::envelope::EntityAuth {
            scheme: "x509".to_string(),
            authdata: serde_json::json!({}),
        }),
        mastertoken: None,
        headerdata: Some(headerdata),
        errordata: None,
        signature,
    };
    let wire = serde_json::to_vec(&sealed).unwrap();

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityAuthFactoryNotFound);
}

#[test]
fn tampered_header_signature_is_rejected() {
    let env = TestEnv::new();
    let crypto = env.psk_crypto();

    let mut wire = seal_header_psk(&env, &header_data(5));
    // Flip a ciphertext byte inside the envelope.
    let mut sealed: sealframe_proto::envelope::Envelope =
        serde_json::from_slice(&wire).unwrap();
    if let Some(headerdata) = &mut sealed.headerdata {
        headerdata[0] ^= 0xFF;
    }
    wire = serde_json::to_vec(&sealed).unwrap();
    let wire = assemble(&[wire, seal_chunk(&crypto, 1, 5, true, b"x")]);

    let mut stream = stream_with(env.context(Role::TrustedNetworkServer), wire);
    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityAuthVerificationFailed);
}

#[test]
fn garbage_stream_is_a_parse_error() {
    let env = TestEnv::new();
    let mut stream =
        stream_with(env.context(Role::TrustedNetworkServer), b"not json at all".to_vec());

    let err = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::JsonParseError);
    assert_eq!(err.message_id(), None);
}
