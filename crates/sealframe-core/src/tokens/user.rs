//! User-ID token: binds a user identity to a master token.
//!
//! Structure mirrors the master token (cleartext numbers, encrypted
//! user payload behind the signature) with one addition: the token
//! names the master token serial number it attaches to. A user-ID
//! token presented with a different master token is untrusted.

use sealframe_crypto::CryptoContext;
use sealframe_proto::{
    MAX_ID,
    envelope::{self, SealedToken, UserData, UserIdTokenData},
};

use crate::{
    error::{ErrorKind, SealError},
    tokens::MasterToken,
};

/// A parsed user-ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdToken {
    renewal_window: u64,
    expiration: u64,
    mt_serial_number: u64,
    serial_number: u64,
    user: Option<String>,
}

impl UserIdToken {
    /// Issue a new sealed user-ID token bound to `master_token`.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::MessageFormatError`] if a number exceeds the
    /// maximum; [`ErrorKind::InternalException`] if sealing fails.
    pub fn issue(
        crypto: &dyn CryptoContext,
        master_token: &MasterToken,
        user: &str,
        serial_number: u64,
        renewal_window: u64,
        expiration: u64,
    ) -> Result<(Self, SealedToken), SealError> {
        if serial_number > MAX_ID {
            return Err(SealError::new(
                ErrorKind::MessageFormatError,
                format!("serialnumber {serial_number} exceeds maximum"),
            ));
        }

        let userdata =
            crypto.encrypt(&envelope::encode(&UserData { identity: user.to_string() })?)?;
        let token_data = UserIdTokenData {
            renewalwindow: renewal_window,
            expiration,
            mtserialnumber: master_token.serial_number(),
            serialnumber: serial_number,
            userdata,
        };
        let tokendata = envelope::encode(&token_data)?;
        let signature = crypto.sign(&tokendata)?;

        let token = Self {
            renewal_window,
            expiration,
            mt_serial_number: master_token.serial_number(),
            serial_number,
            user: Some(user.to_string()),
        };
        Ok((token, SealedToken { tokendata, signature }))
    }

    /// Parse a sealed user-ID token.
    ///
    /// As with master tokens, a bad signature produces an untrusted
    /// token rather than an error; the trust decision belongs to
    /// credential resolution, which has the message ID in hand.
    ///
    /// # Errors
    ///
    /// Parse kinds for malformed token data.
    pub fn parse(wire: &SealedToken, crypto: &dyn CryptoContext) -> Result<Self, SealError> {
        let data: UserIdTokenData = envelope::decode(&wire.tokendata)?;
        if data.serialnumber > MAX_ID || data.mtserialnumber > MAX_ID {
            return Err(SealError::new(
                ErrorKind::MessageFormatError,
                "serial number exceeds maximum",
            ));
        }

        let user = if crypto.verify(&wire.tokendata, &wire.signature)? {
            let plaintext = crypto.decrypt(&data.userdata).map_err(|e| {
                SealError::new(ErrorKind::MessageFormatError, format!("user data: {e}"))
            })?;
            let user: UserData = envelope::decode(&plaintext)?;
            Some(user.identity)
        } else {
            None
        };

        Ok(Self {
            renewal_window: data.renewalwindow,
            expiration: data.expiration,
            mt_serial_number: data.mtserialnumber,
            serial_number: data.serialnumber,
            user,
        })
    }

    /// Whether the signature verified and the user payload opened.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.user.is_some()
    }

    /// User identity; `None` on untrusted tokens.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Serial number of the master token this token attaches to.
    #[must_use]
    pub fn mt_serial_number(&self) -> u64 {
        self.mt_serial_number
    }

    /// Stable identifier for this token.
    #[must_use]
    pub fn serial_number(&self) -> u64 {
        self.serial_number
    }

    /// Whether this token attaches to the given master token.
    #[must_use]
    pub fn is_bound_to(&self, master_token: &MasterToken) -> bool {
        self.mt_serial_number == master_token.serial_number()
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
