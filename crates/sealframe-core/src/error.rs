//! The closed error taxonomy of the receive pipeline.
//!
//! Errors are values: every failure carries a kind from the closed
//! [`ErrorKind`] set plus whatever protocol objects had been resolved
//! when the failure occurred (message ID, master token, entity auth
//! data, user-ID token). Callers match on the kind; the annotations
//! exist so an error response can name the offending message and
//! entity.

use thiserror::Error;

use crate::{
    entityauth::EntityAuthData,
    tokens::{MasterToken, UserIdToken},
};

/// Closed set of failure kinds, grouped by pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Parse
    /// A wire object could not be parsed as JSON or was not framed
    /// correctly
    JsonParseError,
    /// A wire object parsed but violated the message format
    MessageFormatError,

    // Entity auth
    /// The entity's identity has been revoked
    EntityRevoked,
    /// No factory is registered for the declared entity auth scheme
    EntityAuthFactoryNotFound,
    /// The entity auth signature or claim did not verify
    EntityAuthVerificationFailed,

    // Master token
    /// The master token could not be verified and no cached session
    /// context exists
    MasterTokenUntrusted,
    /// The identity inside the master token has been revoked
    MasterTokenIdentityRevoked,
    /// The master token itself has been revoked
    MasterTokenRevoked,

    // User-ID token
    /// The user-ID token did not verify or is not bound to the
    /// message's master token
    UserIdTokenUntrusted,
    /// The user-ID token has been revoked
    UserIdTokenRevoked,

    // Key exchange
    /// No factory is registered for the key response's scheme
    KeyxFactoryNotFound,
    /// The key response matches none of the caller's key requests
    KeyxResponseRequestMismatch,

    // Freshness
    /// The master token is expired and the message cannot renew it
    MessageExpired,
    /// Handshake flag set without renewability or key request data
    HandshakeDataMissing,
    /// Non-replayable ID present without a master token
    IncompleteNonreplayableMessage,
    /// Non-replayable ID at or below the largest seen
    MessageReplayed,
    /// Non-replayable ID too far ahead of the largest seen
    MessageReplayedUnrecoverable,

    // Chunk
    /// A chunk's message ID differs from the header's
    PayloadMessageIdMismatch,
    /// A chunk's sequence number is not the expected next value
    PayloadSequenceNumberMismatch,
    /// A chunk's signature did not verify
    PayloadVerificationFailed,

    // Misuse
    /// Internal misuse, e.g. reading from an error-header stream
    InternalException,
}

impl ErrorKind {
    /// Lowercase description used in display output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonParseError => "json parse error",
            Self::MessageFormatError => "message format error",
            Self::EntityRevoked => "entity revoked",
            Self::EntityAuthFactoryNotFound => "entity auth factory not found",
            Self::EntityAuthVerificationFailed => "entity auth verification failed",
            Self::MasterTokenUntrusted => "master token untrusted",
            Self::MasterTokenIdentityRevoked => "master token identity revoked",
            Self::MasterTokenRevoked => "master token revoked",
            Self::UserIdTokenUntrusted => "user id token untrusted",
            Self::UserIdTokenRevoked => "user id token revoked",
            Self::KeyxFactoryNotFound => "key exchange factory not found",
            Self::KeyxResponseRequestMismatch => "key response matches no key request",
            Self::MessageExpired => "message expired",
            Self::HandshakeDataMissing => "handshake data missing",
            Self::IncompleteNonreplayableMessage => "incomplete non-replayable message",
            Self::MessageReplayed => "message replayed",
            Self::MessageReplayedUnrecoverable => "message replayed unrecoverably",
            Self::PayloadMessageIdMismatch => "payload message id mismatch",
            Self::PayloadSequenceNumberMismatch => "payload sequence number mismatch",
            Self::PayloadVerificationFailed => "payload verification failed",
            Self::InternalException => "internal exception",
        }
    }

    /// Response code an error message reporting this kind would carry.
    #[must_use]
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::MessageExpired => ResponseCode::Expired,
            Self::MessageReplayed => ResponseCode::Replayed,
            Self::MessageReplayedUnrecoverable | Self::HandshakeDataMissing => {
                ResponseCode::KeyxRequired
            },
            Self::EntityRevoked
            | Self::MasterTokenUntrusted
            | Self::MasterTokenIdentityRevoked
            | Self::MasterTokenRevoked
            | Self::EntityAuthVerificationFailed => ResponseCode::EntityReauth,
            Self::UserIdTokenUntrusted | Self::UserIdTokenRevoked => ResponseCode::UserReauth,
            Self::InternalException => ResponseCode::TransientFailure,
            _ => ResponseCode::Fail,
        }
    }

    /// Whether this kind is a per-read chunk error that leaves the
    /// stream open.
    ///
    /// Everything else either terminates the stream (header, freshness,
    /// verification, parse) or is misuse.
    #[must_use]
    pub fn is_recoverable_read(&self) -> bool {
        matches!(self, Self::PayloadMessageIdMismatch | Self::PayloadSequenceNumberMismatch)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response codes carried by error headers.
///
/// These are the wire values for the `errorcode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// Unrecoverable failure
    Fail,
    /// Transient failure; the sender may retry
    TransientFailure,
    /// The entity must re-authenticate
    EntityReauth,
    /// The user must re-authenticate
    UserReauth,
    /// Key exchange is required before the message can be accepted
    KeyxRequired,
    /// The message's master token is expired
    Expired,
    /// The message was replayed
    Replayed,
}

impl ResponseCode {
    /// Wire value for this code.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Fail => 1,
            Self::TransientFailure => 2,
            Self::EntityReauth => 3,
            Self::UserReauth => 4,
            Self::KeyxRequired => 5,
            Self::Expired => 6,
            Self::Replayed => 7,
        }
    }

    /// Resolve a wire value. Unknown values map to [`Self::Fail`].
    #[must_use]
    pub fn from_u32(value: u32) -> Self {
        match value {
            2 => Self::TransientFailure,
            3 => Self::EntityReauth,
            4 => Self::UserReauth,
            5 => Self::KeyxRequired,
            6 => Self::Expired,
            7 => Self::Replayed,
            _ => Self::Fail,
        }
    }
}

/// A pipeline failure: kind plus context annotations.
#[derive(Error, Debug, Clone)]
#[error("{}: {message}", kind.as_str())]
pub struct SealError {
    kind: ErrorKind,
    message: String,
    message_id: Option<u64>,
    master_token: Option<Box<MasterToken>>,
    entity_auth: Option<EntityAuthData>,
    user_id_token: Option<Box<UserIdToken>>,
}

impl SealError {
    /// Create an error with a kind and human-readable detail.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            message_id: None,
            master_token: None,
            entity_auth: None,
            user_id_token: None,
        }
    }

    /// Attach the message ID parsed from the offending header.
    #[must_use]
    pub fn with_message_id(mut self, message_id: u64) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Attach the resolved master token.
    #[must_use]
    pub fn with_master_token(mut self, token: MasterToken) -> Self {
        self.master_token = Some(Box::new(token));
        self
    }

    /// Attach the resolved entity auth data.
    #[must_use]
    pub fn with_entity_auth(mut self, entity_auth: EntityAuthData) -> Self {
        self.entity_auth = Some(entity_auth);
        self
    }

    /// Attach the resolved user-ID token.
    #[must_use]
    pub fn with_user_id_token(mut self, token: UserIdToken) -> Self {
        self.user_id_token = Some(Box::new(token));
        self
    }

    /// The failure kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable detail.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Message ID of the offending message, if the header parsed far
    /// enough to reveal it.
    #[must_use]
    pub fn message_id(&self) -> Option<u64> {
        self.message_id
    }

    /// The offending master token, if resolved.
    #[must_use]
    pub fn master_token(&self) -> Option<&MasterToken> {
        self.master_token.as_deref()
    }

    /// The offending entity auth data, if resolved.
    #[must_use]
    pub fn entity_auth(&self) -> Option<&EntityAuthData> {
        self.entity_auth.as_ref()
    }

    /// The offending user-ID token, if resolved.
    #[must_use]
    pub fn user_id_token(&self) -> Option<&UserIdToken> {
        self.user_id_token.as_deref()
    }
}

impl From<sealframe_proto::ProtocolError> for SealError {
    fn from(err: sealframe_proto::ProtocolError) -> Self {
        use sealframe_proto::ProtocolError;

        let kind = match &err {
            ProtocolError::MalformedObject { .. }
            | ProtocolError::TruncatedObject { .. }
            | ProtocolError::ObjectTooLarge { .. }
            | ProtocolError::InvalidUtf8 { .. }
            | ProtocolError::JsonDecode(_) => ErrorKind::JsonParseError,
            ProtocolError::JsonEncode(_)
            | ProtocolError::Base64Decode { .. }
            | ProtocolError::UnsupportedCompression { .. }
            | ProtocolError::Decompress { .. } => ErrorKind::MessageFormatError,
            ProtocolError::Source(_) => ErrorKind::InternalException,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<sealframe_crypto::CryptoError> for SealError {
    fn from(err: sealframe_crypto::CryptoError) -> Self {
        Self::new(ErrorKind::InternalException, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotations_accumulate() {
        let err = SealError::new(ErrorKind::MessageReplayed, "id 7 at or below 9")
            .with_message_id(42);

        assert_eq!(err.kind(), ErrorKind::MessageReplayed);
        assert_eq!(err.message_id(), Some(42));
        assert!(err.master_token().is_none());
    }

    #[test]
    fn display_includes_kind_and_detail() {
        let err = SealError::new(ErrorKind::MessageExpired, "token expired at 100");
        assert_eq!(err.to_string(), "message expired: token expired at 100");
    }

    #[test]
    fn protocol_errors_map_to_parse_kinds() {
        let parse: SealError =
            sealframe_proto::ProtocolError::JsonDecode("bad".to_string()).into();
        assert_eq!(parse.kind(), ErrorKind::JsonParseError);

        let format: SealError = sealframe_proto::ProtocolError::UnsupportedCompression {
            algorithm: "LZW".to_string(),
        }
        .into();
        assert_eq!(format.kind(), ErrorKind::MessageFormatError);
    }

    #[test]
    fn recoverable_read_kinds() {
        assert!(ErrorKind::PayloadMessageIdMismatch.is_recoverable_read());
        assert!(ErrorKind::PayloadSequenceNumberMismatch.is_recoverable_read());
        assert!(!ErrorKind::PayloadVerificationFailed.is_recoverable_read());
        assert!(!ErrorKind::MessageReplayed.is_recoverable_read());
    }

    #[test]
    fn response_codes_round_trip() {
        for code in [
            ResponseCode::Fail,
            ResponseCode::TransientFailure,
            ResponseCode::EntityReauth,
            ResponseCode::UserReauth,
            ResponseCode::KeyxRequired,
            ResponseCode::Expired,
            ResponseCode::Replayed,
        ] {
            assert_eq!(ResponseCode::from_u32(code.to_u32()), code);
        }
        assert_eq!(ResponseCode::from_u32(999), ResponseCode::Fail);
    }

    #[test]
    fn replay_maps_to_replayed_code() {
        assert_eq!(ErrorKind::MessageReplayed.response_code(), ResponseCode::Replayed);
        assert_eq!(ErrorKind::MessageExpired.response_code(), ResponseCode::Expired);
    }
}
