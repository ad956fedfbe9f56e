//! Error-header streams: accessors, response codes, and read misuse.

use std::time::Duration;

use sealframe_core::{
    ErrorKind, ErrorHeader, MessageInputStream, ResponseCode, Role,
};
use sealframe_harness::{TestEnv, no_service_cryptos, psk_claim};
use sealframe_proto::{BufferSource, envelope::ErrorData};

const TIMEOUT: Duration = Duration::from_millis(200);

fn error_wire(env: &TestEnv, data: &ErrorData) -> Vec<u8> {
    let sealed = ErrorHeader::build(psk_claim(), &env.psk_crypto(), data).unwrap();
    serde_json::to_vec(&sealed).unwrap()
}

fn error_data() -> ErrorData {
    ErrorData {
        recipient: Some("entity-local".to_string()),
        messageid: 42,
        errorcode: ResponseCode::Expired.to_u32(),
        internalcode: Some(7001),
        errormsg: Some("master token expired".to_string()),
        usermsg: Some("please sign in again".to_string()),
    }
}

#[test]
fn error_header_stream_exposes_fields() {
    let env = TestEnv::new();
    let mut stream = MessageInputStream::new(
        env.context(Role::TrustedNetworkClient),
        BufferSource::new(error_wire(&env, &error_data())),
        Vec::new(),
        no_service_cryptos(),
    );

    assert!(stream.is_ready(TIMEOUT).unwrap());
    assert!(stream.message_header().is_none());

    let header = stream.error_header().expect("error header");
    assert_eq!(header.message_id(), 42);
    assert_eq!(header.response_code(), ResponseCode::Expired);
    assert_eq!(header.internal_code(), Some(7001));
    assert_eq!(header.recipient(), Some("entity-local"));
    assert_eq!(header.error_message(), Some("master token expired"));
    assert_eq!(header.user_message(), Some("please sign in again"));

    // Identity falls back to the error header's entity.
    assert_eq!(stream.identity(), Some(sealframe_harness::PSK_IDENTITY));
    assert!(!stream.is_handshake());
}

#[test]
fn reading_an_error_header_stream_is_misuse() {
    let env = TestEnv::new();
    let mut stream = MessageInputStream::new(
        env.context(Role::TrustedNetworkClient),
        BufferSource::new(error_wire(&env, &error_data())),
        Vec::new(),
        no_service_cryptos(),
    );

    assert!(stream.is_ready(TIMEOUT).unwrap());
    let err = stream.read(Some(16), TIMEOUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalException);
}

#[test]
fn unknown_response_code_maps_to_fail() {
    let env = TestEnv::new();
    let mut data = error_data();
    data.errorcode = 9999;

    let mut stream = MessageInputStream::new(
        env.context(Role::TrustedNetworkClient),
        BufferSource::new(error_wire(&env, &data)),
        Vec::new(),
        no_service_cryptos(),
    );

    assert!(stream.is_ready(TIMEOUT).unwrap());
    assert_eq!(stream.error_header().unwrap().response_code(), ResponseCode::Fail);
}

#[test]
fn payload_crypto_context_absent_on_error_streams() {
    let env = TestEnv::new();
    let mut stream = MessageInputStream::new(
        env.context(Role::TrustedNetworkClient),
        BufferSource::new(error_wire(&env, &error_data())),
        Vec::new(),
        no_service_cryptos(),
    );

    assert!(stream.is_ready(TIMEOUT).unwrap());
    assert!(stream.payload_crypto_context().is_none());
    assert!(stream.key_exchange_crypto_context().is_none());
}
