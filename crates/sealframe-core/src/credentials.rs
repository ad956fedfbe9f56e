//! Credential resolution: revocation and token binding checks.
//!
//! Runs after the header parses so every failure names the message.
//! The token factory is the authority; this module only sequences the
//! checks and shapes the errors.

use crate::{
    error::{ErrorKind, SealError},
    header::MessageHeader,
    tokens::TokenFactory,
};

/// Walk the header's credential chain against the token factory.
///
/// # Errors
///
/// - [`ErrorKind::EntityRevoked`]: entity auth identity revoked
/// - [`ErrorKind::MasterTokenIdentityRevoked`]: identity inside the
///   master token revoked
/// - [`ErrorKind::MasterTokenRevoked`]: master token revoked
/// - [`ErrorKind::UserIdTokenUntrusted`]: user-ID token unverified,
///   unbound, or presented without a master token
/// - [`ErrorKind::UserIdTokenRevoked`]: user-ID token revoked
pub fn resolve(header: &MessageHeader, factory: &dyn TokenFactory) -> Result<(), SealError> {
    let message_id = header.message_id();

    if let Some(entity_auth) = header.entity_auth() {
        if let Some(reason) = factory.is_entity_revoked(entity_auth.identity()) {
            return Err(SealError::new(ErrorKind::EntityRevoked, reason)
                .with_message_id(message_id)
                .with_entity_auth(entity_auth.clone()));
        }
    }

    if let Some(token) = header.master_token() {
        if let Some(identity) = token.identity() {
            if let Some(reason) = factory.is_entity_revoked(identity) {
                return Err(SealError::new(ErrorKind::MasterTokenIdentityRevoked, reason)
                    .with_message_id(message_id)
                    .with_master_token(token.clone()));
            }
        }
        if let Some(reason) = factory.is_master_token_revoked(token) {
            return Err(SealError::new(ErrorKind::MasterTokenRevoked, reason)
                .with_message_id(message_id)
                .with_master_token(token.clone()));
        }
    }

    if let Some(user_token) = header.user_id_token() {
        let Some(master_token) = header.master_token() else {
            return Err(SealError::new(
                ErrorKind::UserIdTokenUntrusted,
                "user id token presented without a master token",
            )
            .with_message_id(message_id)
            .with_user_id_token(user_token.clone()));
        };

        if !user_token.is_verified() || !user_token.is_bound_to(master_token) {
            return Err(SealError::new(
                ErrorKind::UserIdTokenUntrusted,
                format!(
                    "user id token bound to serial {}, message carries {}",
                    user_token.mt_serial_number(),
                    master_token.serial_number()
                ),
            )
            .with_message_id(message_id)
            .with_user_id_token(user_token.clone()));
        }

        if let Some(reason) = factory.is_user_id_token_revoked(master_token, user_token) {
            return Err(SealError::new(ErrorKind::UserIdTokenRevoked, reason)
                .with_message_id(message_id)
                .with_user_id_token(user_token.clone()));
        }
    }

    Ok(())
}
