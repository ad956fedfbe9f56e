//! Master token: the sealed session credential.
//!
//! Issued by the remote side, a master token binds an entity identity
//! to session keys under a serial number. The token body is cleartext
//! JSON (so expiry and serial numbers are always readable); the
//! session payload inside it is ciphertext under the process-wide
//! seal context and is opened only after the signature verifies.
//!
//! A token that parses but does not verify is *untrusted*: its
//! numbers are usable (e.g. to look up a cached session context) but
//! it exposes no identity and no keys.

use sealframe_crypto::{CryptoContext, SessionKeys};
use sealframe_proto::{
    MAX_ID,
    envelope::{self, MasterTokenData, SealedToken, SessionData},
};
use serde_json::Value;

use crate::error::{ErrorKind, SealError};

/// Decrypted session payload, present only on verified tokens.
#[derive(Clone, PartialEq)]
struct SessionInfo {
    identity: String,
    encryption_key: Vec<u8>,
    hmac_key: Vec<u8>,
    issuer_data: Option<Value>,
}

impl std::fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never appears in logs.
        f.debug_struct("SessionInfo").field("identity", &self.identity).finish_non_exhaustive()
    }
}

/// A parsed master token.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterToken {
    renewal_window: u64,
    expiration: u64,
    sequence_number: u64,
    serial_number: u64,
    session: Option<SessionInfo>,
}

impl MasterToken {
    /// Issue a new sealed master token.
    ///
    /// Returns the semantic token (verified, with session payload)
    /// and its wire form.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::MessageFormatError`] if a number exceeds
    /// [`MAX_ID`]; [`ErrorKind::InternalException`] if sealing fails.
    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        crypto: &dyn CryptoContext,
        identity: &str,
        sequence_number: u64,
        serial_number: u64,
        renewal_window: u64,
        expiration: u64,
        keys: &SessionKeys,
        issuer_data: Option<Value>,
    ) -> Result<(Self, SealedToken), SealError> {
        check_id("sequencenumber", sequence_number)?;
        check_id("serialnumber", serial_number)?;

        let session_data = SessionData {
            identity: identity.to_string(),
            encryptionkey: keys.encryption_key().to_vec(),
            hmackey: keys.hmac_key().to_vec(),
            issuerdata: issuer_data.clone(),
        };
        let sessiondata = crypto.encrypt(&envelope::encode(&session_data)?)?;

        let token_data = MasterTokenData {
            renewalwindow: renewal_window,
            expiration,
            sequencenumber: sequence_number,
            serialnumber: serial_number,
            sessiondata,
        };
        let tokendata = envelope::encode(&token_data)?;
        let signature = crypto.sign(&tokendata)?;

        let token = Self {
            renewal_window,
            expiration,
            sequence_number,
            serial_number,
            session: Some(SessionInfo {
                identity: identity.to_string(),
                encryption_key: keys.encryption_key().to_vec(),
                hmac_key: keys.hmac_key().to_vec(),
                issuer_data,
            }),
        };
        Ok((token, SealedToken { tokendata, signature }))
    }

    /// Parse a sealed master token.
    ///
    /// Signature verification gates the session payload: a token whose
    /// signature does not verify is returned untrusted rather than
    /// rejected, because a cached session context may still vouch for
    /// its serial number.
    ///
    /// # Errors
    ///
    /// Parse kinds for malformed token data; never fails on a bad
    /// signature alone.
    pub fn parse(wire: &SealedToken, crypto: &dyn CryptoContext) -> Result<Self, SealError> {
        let data: MasterTokenData = envelope::decode(&wire.tokendata)?;
        check_id("sequencenumber", data.sequencenumber)?;
        check_id("serialnumber", data.serialnumber)?;

        let session = if crypto.verify(&wire.tokendata, &wire.signature)? {
            let plaintext = crypto.decrypt(&data.sessiondata).map_err(|e| {
                SealError::new(ErrorKind::MessageFormatError, format!("session data: {e}"))
            })?;
            let session: SessionData = envelope::decode(&plaintext)?;
            Some(SessionInfo {
                identity: session.identity,
                encryption_key: session.encryptionkey,
                hmac_key: session.hmackey,
                issuer_data: session.issuerdata,
            })
        } else {
            None
        };

        Ok(Self {
            renewal_window: data.renewalwindow,
            expiration: data.expiration,
            sequence_number: data.sequencenumber,
            serial_number: data.serialnumber,
            session,
        })
    }

    /// Whether the signature verified and the session payload opened.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.session.is_some()
    }

    /// Entity identity; `None` on untrusted tokens.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.identity.as_str())
    }

    /// Issuer-defined opaque data; `None` on untrusted tokens.
    #[must_use]
    pub fn issuer_data(&self) -> Option<&Value> {
        self.session.as_ref().and_then(|s| s.issuer_data.as_ref())
    }

    /// Session keys carried by the token.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::MasterTokenUntrusted`] on untrusted tokens;
    /// [`ErrorKind::MessageFormatError`] if the key material has the
    /// wrong length.
    pub fn session_keys(&self) -> Result<SessionKeys, SealError> {
        let session = self.session.as_ref().ok_or_else(|| {
            SealError::new(ErrorKind::MasterTokenUntrusted, "token carries no usable keys")
        })?;
        SessionKeys::from_slices(&session.encryption_key, &session.hmac_key)
            .map_err(|e| SealError::new(ErrorKind::MessageFormatError, e.to_string()))
    }

    /// Issue ordering number.
    #[must_use]
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Stable session identifier.
    #[must_use]
    pub fn serial_number(&self) -> u64 {
        self.serial_number
    }

    /// Epoch second after which the token may be renewed.
    #[must_use]
    pub fn renewal_window(&self) -> u64 {
        self.renewal_window
    }

    /// Epoch second after which the token is expired.
    #[must_use]
    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    /// Whether the token is expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expiration
    }

    /// Whether the token has entered its renewal window at `now`.
    #[must_use]
    pub fn is_renewable(&self, now: u64) -> bool {
        now >= self.renewal_window
    }
}

fn check_id(field: &'static str, value: u64) -> Result<(), SealError> {
    if value > MAX_ID {
        return Err(SealError::new(
            ErrorKind::MessageFormatError,
            format!("{field} {value} exceeds maximum"),
        ));
    }
    Ok(())
}
