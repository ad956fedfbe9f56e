//! Freshness and replay enforcement.
//!
//! Applied to a validated message header before any payload is
//! released. The rules are role-sensitive: a trusted-network client
//! tolerates an expired master token (only the server can rotate it),
//! everyone else requires the message to be able to renew.

use tracing::warn;

use crate::{
    context::Role,
    error::{ErrorKind, SealError},
    header::MessageHeader,
    tokens::{AcceptDecision, TokenFactory},
};

/// Enforce expiration, handshake completeness, and non-replayable ID
/// rules.
///
/// # Errors
///
/// - [`ErrorKind::MessageExpired`]: expired master token and the
///   message cannot renew it
/// - [`ErrorKind::HandshakeDataMissing`]: handshake flag without
///   renewability or key request data
/// - [`ErrorKind::IncompleteNonreplayableMessage`]: non-replayable
///   ID without a master token
/// - [`ErrorKind::MessageReplayed`] /
///   [`ErrorKind::MessageReplayedUnrecoverable`]: ID outside the
///   acceptance window
///
/// All errors carry the header's message ID; token-related errors
/// carry the master token.
pub fn enforce(
    header: &MessageHeader,
    role: Role,
    now: u64,
    factory: &dyn TokenFactory,
) -> Result<(), SealError> {
    let message_id = header.message_id();

    if let Some(token) = header.master_token() {
        if token.is_expired(now) {
            // An expired token is acceptable when the message can
            // renew it, or when we are a trusted-network client: the
            // server alone rotates tokens, so rejecting would leave
            // the client stuck.
            let renewing = header.is_renewable() && !header.key_requests().is_empty();
            if !renewing && role != Role::TrustedNetworkClient {
                return Err(SealError::new(
                    ErrorKind::MessageExpired,
                    format!("master token expired at {}", token.expiration()),
                )
                .with_message_id(message_id)
                .with_master_token(token.clone()));
            }
        }
    }

    if header.is_handshake_flagged()
        && (!header.is_renewable() || header.key_requests().is_empty())
    {
        return Err(SealError::new(
            ErrorKind::HandshakeDataMissing,
            "handshake message must be renewable and carry key request data",
        )
        .with_message_id(message_id));
    }

    if let Some(id) = header.non_replayable_id() {
        let Some(token) = header.master_token() else {
            return Err(SealError::new(
                ErrorKind::IncompleteNonreplayableMessage,
                "non-replayable id requires a master token",
            )
            .with_message_id(message_id));
        };

        match factory.accept_non_replayable_id(token, id) {
            AcceptDecision::Accept => {},
            AcceptDecision::Replayed => {
                warn!(message_id, id, "message replayed");
                return Err(SealError::new(
                    ErrorKind::MessageReplayed,
                    format!("non-replayable id {id} already seen"),
                )
                .with_message_id(message_id)
                .with_master_token(token.clone()));
            },
            AcceptDecision::Unrecoverable => {
                warn!(message_id, id, "message outside replay acceptance window");
                return Err(SealError::new(
                    ErrorKind::MessageReplayedUnrecoverable,
                    format!("non-replayable id {id} too far ahead"),
                )
                .with_message_id(message_id)
                .with_master_token(token.clone()));
            },
        }
    }

    Ok(())
}
