//! Header parsing and validation.
//!
//! The first object of every message is a signed envelope holding
//! either message header data or error header data. Parsing resolves
//! the *header crypto context* (the context that seals the header)
//! from the master token or the entity authentication data, verifies
//! the envelope signature with it, then opens and validates the
//! enclosed plaintext.
//!
//! Policy checks that need the message ID in error annotations
//! (revocation, freshness, replay) are deliberately not here; they
//! run later in the stream so even a policy-violating header reports
//! its message ID.

use std::{collections::HashMap, sync::Arc};

use sealframe_crypto::{CryptoContext, SymmetricCryptoContext};
use sealframe_proto::{
    MAX_ID,
    envelope::{self, Capabilities, Envelope, ErrorData, KeyRequest, KeyResponse},
};
use tracing::debug;

use crate::{
    context::SealContext,
    entityauth::EntityAuthData,
    error::{ErrorKind, ResponseCode, SealError},
    tokens::{MasterToken, ServiceToken, UserIdToken},
};

/// The first object of a message, disambiguated.
#[derive(Clone)]
pub enum Header {
    /// An application message follows
    Message(MessageHeader),
    /// The remote side reports an error; no payload follows
    Error(ErrorHeader),
}

impl Header {
    /// Parse and validate the first object of a message.
    ///
    /// # Errors
    ///
    /// Parse kinds for malformed envelopes; entity auth and master
    /// token kinds for credential failures. Errors carry the message
    /// ID whenever the header data decrypted far enough to reveal it.
    pub fn parse(
        ctx: &SealContext,
        object: &[u8],
        service_token_cryptos: &HashMap<String, Arc<dyn CryptoContext>>,
    ) -> Result<Self, SealError> {
        let sealed: Envelope = envelope::decode(object)?;

        match (&sealed.headerdata, &sealed.errordata) {
            (Some(_), _) => {
                MessageHeader::parse(ctx, &sealed, service_token_cryptos).map(Self::Message)
            },
            (None, Some(_)) => ErrorHeader::parse(ctx, &sealed).map(Self::Error),
            (None, None) => Err(SealError::new(
                ErrorKind::MessageFormatError,
                "envelope carries neither headerdata nor errordata",
            )),
        }
    }

    /// The message header, if this is one.
    #[must_use]
    pub fn message(&self) -> Option<&MessageHeader> {
        match self {
            Self::Message(header) => Some(header),
            Self::Error(_) => None,
        }
    }

    /// The error header, if this is one.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorHeader> {
        match self {
            Self::Message(_) => None,
            Self::Error(header) => Some(header),
        }
    }
}

/// A validated message header.
#[derive(Clone)]
pub struct MessageHeader {
    master_token: Option<MasterToken>,
    entity_auth: Option<EntityAuthData>,
    crypto: Arc<dyn CryptoContext>,
    message_id: u64,
    non_replayable_id: Option<u64>,
    renewable: bool,
    handshake: bool,
    capabilities: Option<Capabilities>,
    key_requests: Vec<KeyRequest>,
    key_response: Option<KeyResponse>,
    user_auth: Option<serde_json::Value>,
    user_id_token: Option<UserIdToken>,
    service_tokens: Vec<ServiceToken>,
}

impl MessageHeader {
    fn parse(
        ctx: &SealContext,
        sealed: &Envelope,
        service_token_cryptos: &HashMap<String, Arc<dyn CryptoContext>>,
    ) -> Result<Self, SealError> {
        let headerdata = sealed
            .headerdata
            .as_deref()
            .unwrap_or_default();

        // Resolve the header crypto context (master token first; the
        // entity auth claim is ignored when a master token is present
        // because the token's identity wins).
        let (master_token, entity_auth, crypto) = match (&sealed.mastertoken, &sealed.entityauthdata)
        {
            (Some(wire), _) => {
                let token = MasterToken::parse(wire, ctx.crypto().as_ref())?;
                let crypto = session_context(ctx, &token)?;
                (Some(token), None, crypto)
            },
            (None, Some(auth)) => {
                let factory = ctx.entity_auth_factory(&auth.scheme).ok_or_else(|| {
                    SealError::new(
                        ErrorKind::EntityAuthFactoryNotFound,
                        format!("no factory for scheme '{}'", auth.scheme),
                    )
                })?;
                let (data, crypto) = factory.authenticate(auth)?;
                (None, Some(data), crypto)
            },
            (None, None) => {
                return Err(SealError::new(
                    ErrorKind::MessageFormatError,
                    "message header carries neither master token nor entity auth data",
                ));
            },
        };

        // Verify before decrypting.
        if !crypto.verify(headerdata, &sealed.signature)? {
            let err = match &master_token {
                Some(token) => {
                    SealError::new(ErrorKind::MasterTokenUntrusted, "header signature rejected")
                        .with_master_token(token.clone())
                },
                None => SealError::new(
                    ErrorKind::EntityAuthVerificationFailed,
                    "header signature rejected",
                ),
            };
            return Err(annotate(err, &entity_auth));
        }

        let plaintext = crypto.decrypt(headerdata).map_err(|e| {
            annotate(
                SealError::new(ErrorKind::MessageFormatError, format!("header data: {e}")),
                &entity_auth,
            )
        })?;
        let data: envelope::HeaderData = envelope::decode(&plaintext)?;

        if data.messageid > MAX_ID {
            return Err(SealError::new(
                ErrorKind::MessageFormatError,
                format!("message id {} exceeds maximum", data.messageid),
            ));
        }
        if data.nonreplayableid.is_some_and(|id| id > MAX_ID) {
            return Err(SealError::new(
                ErrorKind::MessageFormatError,
                "non-replayable id exceeds maximum",
            )
            .with_message_id(data.messageid));
        }

        // From here on every failure can name the message.
        let user_id_token = data
            .useridtoken
            .as_ref()
            .map(|wire| UserIdToken::parse(wire, ctx.crypto().as_ref()))
            .transpose()
            .map_err(|e| e.with_message_id(data.messageid))?;

        let service_tokens = data
            .servicetokens
            .iter()
            .map(|wire| ServiceToken::from_wire(wire, service_token_cryptos))
            .collect();

        debug!(
            message_id = data.messageid,
            renewable = data.renewable,
            handshake = data.handshake,
            has_master_token = master_token.is_some(),
            "message header accepted"
        );

        Ok(Self {
            master_token,
            entity_auth,
            crypto,
            message_id: data.messageid,
            non_replayable_id: data.nonreplayableid,
            renewable: data.renewable,
            handshake: data.handshake,
            capabilities: data.capabilities,
            key_requests: data.keyrequestdata,
            key_response: data.keyresponsedata,
            user_auth: data.userauthdata,
            user_id_token,
            service_tokens,
        })
    }

    /// The master token, if the header carried one.
    #[must_use]
    pub fn master_token(&self) -> Option<&MasterToken> {
        self.master_token.as_ref()
    }

    /// The resolved entity auth data, if the header authenticated
    /// with one.
    #[must_use]
    pub fn entity_auth(&self) -> Option<&EntityAuthData> {
        self.entity_auth.as_ref()
    }

    /// The header crypto context that sealed this header.
    #[must_use]
    pub fn crypto(&self) -> &Arc<dyn CryptoContext> {
        &self.crypto
    }

    /// Message ID.
    #[must_use]
    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    /// Non-replayable ID, if the sender requested replay protection.
    #[must_use]
    pub fn non_replayable_id(&self) -> Option<u64> {
        self.non_replayable_id
    }

    /// Whether the recipient may renew the sender's tokens.
    #[must_use]
    pub fn is_renewable(&self) -> bool {
        self.renewable
    }

    /// Whether the explicit handshake flag is set.
    #[must_use]
    pub fn is_handshake_flagged(&self) -> bool {
        self.handshake
    }

    /// Sender capability advertisement.
    #[must_use]
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    /// Key requests the sender wants answered.
    #[must_use]
    pub fn key_requests(&self) -> &[KeyRequest] {
        &self.key_requests
    }

    /// Key response answering one of our earlier requests.
    #[must_use]
    pub fn key_response(&self) -> Option<&KeyResponse> {
        self.key_response.as_ref()
    }

    /// Opaque user authentication claim.
    #[must_use]
    pub fn user_auth(&self) -> Option<&serde_json::Value> {
        self.user_auth.as_ref()
    }

    /// The user-ID token, if the header carried one.
    #[must_use]
    pub fn user_id_token(&self) -> Option<&UserIdToken> {
        self.user_id_token.as_ref()
    }

    /// Application service tokens.
    #[must_use]
    pub fn service_tokens(&self) -> &[ServiceToken] {
        &self.service_tokens
    }

    /// Identity of the sender per the credential priority: master
    /// token first, then entity auth data.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.master_token
            .as_ref()
            .and_then(MasterToken::identity)
            .or_else(|| self.entity_auth.as_ref().map(EntityAuthData::identity))
    }
}

/// Resolve the session crypto context for a master token.
///
/// A cached context vouches for the serial number even when the token
/// itself did not verify (session renewal hands out tokens faster
/// than every receiver can verify them). Without a cache entry the
/// token must verify so a fresh context can be built; that context is
/// installed in the store for subsequent messages.
fn session_context(
    ctx: &SealContext,
    token: &MasterToken,
) -> Result<Arc<dyn CryptoContext>, SealError> {
    if let Some(cached) = ctx.store().cached(token.serial_number()) {
        return Ok(cached);
    }

    if !token.is_verified() {
        return Err(SealError::new(
            ErrorKind::MasterTokenUntrusted,
            format!("serial {} unverified and not cached", token.serial_number()),
        )
        .with_master_token(token.clone()));
    }

    let keys = token.session_keys()?;
    let crypto: Arc<dyn CryptoContext> = Arc::new(SymmetricCryptoContext::from_keys(keys));
    ctx.store().save(token.serial_number(), crypto.clone());
    debug!(serial = token.serial_number(), "session crypto context installed");
    Ok(crypto)
}

fn annotate(err: SealError, entity_auth: &Option<EntityAuthData>) -> SealError {
    match entity_auth {
        Some(data) => err.with_entity_auth(data.clone()),
        None => err,
    }
}

/// A validated error header.
#[derive(Debug, Clone)]
pub struct ErrorHeader {
    entity_auth: EntityAuthData,
    recipient: Option<String>,
    message_id: u64,
    response_code: ResponseCode,
    internal_code: Option<u32>,
    error_message: Option<String>,
    user_message: Option<String>,
}

impl ErrorHeader {
    fn parse(ctx: &SealContext, sealed: &Envelope) -> Result<Self, SealError> {
        let errordata = sealed.errordata.as_deref().unwrap_or_default();

        let auth = sealed.entityauthdata.as_ref().ok_or_else(|| {
            SealError::new(
                ErrorKind::MessageFormatError,
                "error header carries no entity auth data",
            )
        })?;
        let factory = ctx.entity_auth_factory(&auth.scheme).ok_or_else(|| {
            SealError::new(
                ErrorKind::EntityAuthFactoryNotFound,
                format!("no factory for scheme '{}'", auth.scheme),
            )
        })?;
        let (entity_auth, crypto) = factory.authenticate(auth)?;

        if !crypto.verify(errordata, &sealed.signature)? {
            return Err(SealError::new(
                ErrorKind::EntityAuthVerificationFailed,
                "error header signature rejected",
            )
            .with_entity_auth(entity_auth));
        }

        let plaintext = crypto.decrypt(errordata).map_err(|e| {
            SealError::new(ErrorKind::MessageFormatError, format!("error data: {e}"))
                .with_entity_auth(entity_auth.clone())
        })?;
        let data: ErrorData = envelope::decode(&plaintext)?;

        if data.messageid > MAX_ID {
            return Err(SealError::new(
                ErrorKind::MessageFormatError,
                format!("message id {} exceeds maximum", data.messageid),
            ));
        }

        Ok(Self {
            entity_auth,
            recipient: data.recipient,
            message_id: data.messageid,
            response_code: ResponseCode::from_u32(data.errorcode),
            internal_code: data.internalcode,
            error_message: data.errormsg,
            user_message: data.usermsg,
        })
    }

    /// Build a sealed error header envelope.
    ///
    /// Used by responders and tests; the receive pipeline only
    /// parses.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InternalException`] if sealing fails.
    pub fn build(
        entity_auth: envelope::EntityAuth,
        crypto: &dyn CryptoContext,
        data: &ErrorData,
    ) -> Result<Envelope, SealError> {
        let plaintext = envelope::encode(data)?;
        let errordata = crypto.encrypt(&plaintext)?;
        let signature = crypto.sign(&errordata)?;
        Ok(Envelope {
            entityauthdata: Some(entity_auth),
            mastertoken: None,
            headerdata: None,
            errordata: Some(errordata),
            signature,
        })
    }

    /// Entity that sent the error.
    #[must_use]
    pub fn entity_auth(&self) -> &EntityAuthData {
        &self.entity_auth
    }

    /// Entity the error is addressed to.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    /// Message ID of the error message.
    #[must_use]
    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    /// Protocol response code.
    #[must_use]
    pub fn response_code(&self) -> ResponseCode {
        self.response_code
    }

    /// Implementation-specific error code.
    #[must_use]
    pub fn internal_code(&self) -> Option<u32> {
        self.internal_code
    }

    /// Developer-facing error text.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// User-facing error text.
    #[must_use]
    pub fn user_message(&self) -> Option<&str> {
        self.user_message.as_deref()
    }
}
