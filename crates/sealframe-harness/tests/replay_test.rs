//! Non-replayable ID enforcement: replays, window wrap-around, and
//! monotonicity.

use std::time::Duration;

use sealframe_core::{
    ErrorKind, MessageInputStream, Role,
    tokens::{AcceptDecision, NON_REPLAYABLE_ID_WINDOW, TokenFactory},
};
use sealframe_harness::{
    TestEnv, assemble, header_data, no_service_cryptos, seal_chunk, seal_header_psk,
    seal_header_with_token,
};
use sealframe_proto::{BufferSource, MAX_ID};

const TIMEOUT: Duration = Duration::from_millis(200);

/// Message with a master token credential and a non-replayable ID.
fn replayable_message(env: &TestEnv, serial: u64, message_id: u64, id: u64) -> Vec<u8> {
    let (_, token_wire) = env.issue_master_token("entity-a", 1, serial, 20_000, 30_000);
    let session = env.session_crypto(serial);

    let mut data = header_data(message_id);
    data.nonreplayableid = Some(id);

    assemble(&[
        seal_header_with_token(&token_wire, &session, &data),
        seal_chunk(&session, 1, message_id, true, b"payload"),
    ])
}

fn ready_kind(env: &TestEnv, wire: Vec<u8>) -> Result<(), sealframe_core::SealError> {
    let mut stream = MessageInputStream::new(
        env.context(Role::TrustedNetworkServer),
        BufferSource::new(wire),
        Vec::new(),
        no_service_cryptos(),
    );
    stream.is_ready(TIMEOUT).map(|_| ())
}

#[test]
fn equal_id_is_replayed() {
    let env = TestEnv::new();
    env.token_factory.set_largest_seen(77, 1);

    let err = ready_kind(&env, replayable_message(&env, 77, 42, 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MessageReplayed);
    assert_eq!(err.message_id(), Some(42));
    assert!(err.master_token().is_some());
}

#[test]
fn fresh_id_advances_largest_seen() {
    let env = TestEnv::new();
    env.token_factory.set_largest_seen(77, 1);

    ready_kind(&env, replayable_message(&env, 77, 42, 2)).unwrap();
    assert_eq!(env.token_factory.largest_seen(77), Some(2));

    // Same ID a second time: replayed.
    let err = ready_kind(&env, replayable_message(&env, 77, 43, 2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MessageReplayed);
}

#[test]
fn acceptance_window_wraps() {
    let env = TestEnv::new();

    // Largest at MAX - W accepts MAX.
    env.token_factory.set_largest_seen(77, MAX_ID - NON_REPLAYABLE_ID_WINDOW);
    ready_kind(&env, replayable_message(&env, 77, 1, MAX_ID)).unwrap();
    assert_eq!(env.token_factory.largest_seen(77), Some(MAX_ID));

    // Largest at MAX accepts 0 across the wrap.
    ready_kind(&env, replayable_message(&env, 77, 2, 0)).unwrap();
    assert_eq!(env.token_factory.largest_seen(77), Some(0));

    // One past the window is unrecoverable.
    env.token_factory.set_largest_seen(88, MAX_ID - NON_REPLAYABLE_ID_WINDOW - 1);
    let err = ready_kind(&env, replayable_message(&env, 88, 3, MAX_ID)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MessageReplayedUnrecoverable);
}

#[test]
fn rejection_never_advances_largest_seen() {
    let env = TestEnv::new();
    env.token_factory.set_largest_seen(77, 100);

    let err = ready_kind(
        &env,
        replayable_message(&env, 77, 5, 100 + NON_REPLAYABLE_ID_WINDOW + 1),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MessageReplayedUnrecoverable);
    assert_eq!(env.token_factory.largest_seen(77), Some(100));
}

#[test]
fn nonreplayable_id_without_master_token_is_incomplete() {
    let env = TestEnv::new();

    let mut data = header_data(42);
    data.nonreplayableid = Some(9);
    let crypto = env.psk_crypto();
    let wire = assemble(&[
        seal_header_psk(&env, &data),
        seal_chunk(&crypto, 1, 42, true, b"x"),
    ]);

    let err = ready_kind(&env, wire).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompleteNonreplayableMessage);
    assert_eq!(err.message_id(), Some(42));
}

#[test]
fn monotonicity_across_a_run_of_messages() {
    let env = TestEnv::new();
    let (token, _) = env.issue_master_token("entity-a", 1, 55, 20_000, 30_000);

    for id in [10u64, 11, 500, 501] {
        assert_eq!(
            env.token_factory.accept_non_replayable_id(&token, id),
            AcceptDecision::Accept,
            "id {id}"
        );
    }
    for id in [501u64, 500, 11, 10, 0] {
        assert_eq!(
            env.token_factory.accept_non_replayable_id(&token, id),
            AcceptDecision::Replayed,
            "id {id}"
        );
    }
}

#[test]
fn replay_failure_is_cached_by_is_ready() {
    let env = TestEnv::new();
    env.token_factory.set_largest_seen(77, 1);

    let mut stream = MessageInputStream::new(
        env.context(Role::TrustedNetworkServer),
        BufferSource::new(replayable_message(&env, 77, 42, 1)),
        Vec::new(),
        no_service_cryptos(),
    );

    let first = stream.is_ready(TIMEOUT).unwrap_err();
    let second = stream.is_ready(TIMEOUT).unwrap_err();
    assert_eq!(first.kind(), ErrorKind::MessageReplayed);
    assert_eq!(second.kind(), ErrorKind::MessageReplayed);
    assert_eq!(second.message_id(), Some(42));
}
