//! Key-response negotiation.
//!
//! A header may carry key response data: the remote side performed a
//! key exchange answering one of the key requests the local side sent
//! earlier. Negotiation matches the response against the caller's
//! ordered request list, finds the factory for the scheme, and lets
//! it derive the key-exchange crypto context.
//!
//! Whether that derived context becomes the payload crypto context
//! depends on the deployment role; that decision lives in the stream,
//! not here.

use std::sync::Arc;

use sealframe_crypto::{CryptoContext, SessionKeys, SymmetricCryptoContext};
use sealframe_proto::envelope::{KeyRequest, KeyResponse};
use tracing::debug;

use crate::{
    context::SealContext,
    error::{ErrorKind, SealError},
};

/// Factory for one key exchange scheme.
pub trait KeyExchangeFactory: Send + Sync {
    /// Scheme name this factory handles.
    fn scheme(&self) -> &str;

    /// Derive the key-exchange crypto context from a matched
    /// request/response pair.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::KeyxResponseRequestMismatch`] when the response
    /// parameters are inconsistent with the request.
    fn derive_crypto_context(
        &self,
        request: &KeyRequest,
        response: &KeyResponse,
    ) -> Result<Arc<dyn CryptoContext>, SealError>;
}

/// Negotiate a key response against the caller's request list.
///
/// Returns the derived key-exchange crypto context.
///
/// # Errors
///
/// - [`ErrorKind::KeyxResponseRequestMismatch`] if no request matches
/// - [`ErrorKind::KeyxFactoryNotFound`] if no factory is registered
///   for the scheme
pub fn negotiate(
    ctx: &SealContext,
    requests: &[KeyRequest],
    response: &KeyResponse,
) -> Result<Arc<dyn CryptoContext>, SealError> {
    let request = requests.iter().find(|req| req.matches(response)).ok_or_else(|| {
        SealError::new(
            ErrorKind::KeyxResponseRequestMismatch,
            format!("response scheme '{}' matches none of {} requests", response.scheme, requests.len()),
        )
    })?;

    let factory = ctx.key_exchange_factory(&response.scheme).ok_or_else(|| {
        SealError::new(
            ErrorKind::KeyxFactoryNotFound,
            format!("no factory for scheme '{}'", response.scheme),
        )
    })?;

    debug!(scheme = %response.scheme, "deriving key exchange crypto context");
    factory.derive_crypto_context(request, response)
}

/// Symmetric-wrapped key exchange.
///
/// The responder generates fresh session keys and returns them
/// wrapped under a context both sides already share (the requester's
/// session or preshared context). The request and response carry a
/// `wrapid` naming that shared context.
pub struct SymmetricWrappedKeyExchange {
    wrap_crypto: Arc<dyn CryptoContext>,
}

/// Wire scheme name of [`SymmetricWrappedKeyExchange`].
pub const SYMMETRIC_WRAPPED: &str = "symmetric_wrapped";

impl SymmetricWrappedKeyExchange {
    /// Factory wrapping and unwrapping under the given shared
    /// context.
    pub fn new(wrap_crypto: Arc<dyn CryptoContext>) -> Self {
        Self { wrap_crypto }
    }

    /// Build response keydata for tests and responders: fresh session
    /// keys wrapped under the shared context.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InternalException`] if wrapping fails.
    pub fn wrap_response(
        &self,
        wrapid: &str,
        keys: &SessionKeys,
    ) -> Result<serde_json::Value, SealError> {
        use base64::{Engine, engine::general_purpose::STANDARD};

        let encryption = self.wrap_crypto.wrap_key(keys.encryption_key())?;
        let hmac = self.wrap_crypto.wrap_key(keys.hmac_key())?;
        Ok(serde_json::json!({
            "wrapid": wrapid,
            "encryptionkey": STANDARD.encode(encryption),
            "hmackey": STANDARD.encode(hmac),
        }))
    }
}

impl KeyExchangeFactory for SymmetricWrappedKeyExchange {
    fn scheme(&self) -> &str {
        SYMMETRIC_WRAPPED
    }

    fn derive_crypto_context(
        &self,
        _request: &KeyRequest,
        response: &KeyResponse,
    ) -> Result<Arc<dyn CryptoContext>, SealError> {
        use base64::{Engine, engine::general_purpose::STANDARD};

        let field = |name: &str| -> Result<Vec<u8>, SealError> {
            let text = response.keydata.get(name).and_then(|v| v.as_str()).ok_or_else(|| {
                SealError::new(
                    ErrorKind::KeyxResponseRequestMismatch,
                    format!("response keydata is missing '{name}'"),
                )
            })?;
            STANDARD.decode(text).map_err(|e| {
                SealError::new(ErrorKind::KeyxResponseRequestMismatch, format!("'{name}': {e}"))
            })
        };

        let encryption_key = self.wrap_crypto.unwrap_key(&field("encryptionkey")?).map_err(
            |e| SealError::new(ErrorKind::KeyxResponseRequestMismatch, e.to_string()),
        )?;
        let hmac_key = self
            .wrap_crypto
            .unwrap_key(&field("hmackey")?)
            .map_err(|e| SealError::new(ErrorKind::KeyxResponseRequestMismatch, e.to_string()))?;

        let keys = SessionKeys::from_slices(&encryption_key, &hmac_key)
            .map_err(|e| SealError::new(ErrorKind::KeyxResponseRequestMismatch, e.to_string()))?;
        Ok(Arc::new(SymmetricCryptoContext::from_keys(keys)))
    }
}

#[cfg(test)]
mod tests {
    use sealframe_crypto::NullCryptoContext;

    use super::*;
    use crate::{context::Role, tokens::MemoryTokenFactory};

    fn wrap_context() -> Arc<dyn CryptoContext> {
        Arc::new(SymmetricCryptoContext::from_keys(SessionKeys::new([7u8; 32], [8u8; 32])))
    }

    fn test_ctx(with_factory: bool) -> SealContext {
        let mut ctx = SealContext::new(
            Role::TrustedNetworkClient,
            Arc::new(NullCryptoContext),
            Arc::new(MemoryTokenFactory::new()),
        );
        if with_factory {
            ctx.register_key_exchange_factory(Arc::new(SymmetricWrappedKeyExchange::new(
                wrap_context(),
            )));
        }
        ctx
    }

    fn request(wrapid: &str) -> KeyRequest {
        KeyRequest {
            scheme: SYMMETRIC_WRAPPED.to_string(),
            keydata: serde_json::json!({ "wrapid": wrapid }),
        }
    }

    fn response(wrapid: &str) -> KeyResponse {
        let exchange = SymmetricWrappedKeyExchange::new(wrap_context());
        let keys = SessionKeys::new([9u8; 32], [10u8; 32]);
        KeyResponse {
            scheme: SYMMETRIC_WRAPPED.to_string(),
            mastertoken: None,
            keydata: exchange.wrap_response(wrapid, &keys).unwrap(),
        }
    }

    #[test]
    fn matched_response_derives_context() {
        let ctx = test_ctx(true);
        let derived =
            negotiate(&ctx, &[request("w1")], &response("w1")).expect("negotiation failed");

        // The derived context holds the unwrapped session keys and
        // must interoperate with a context built from the originals.
        let original = SymmetricCryptoContext::from_keys(SessionKeys::new([9u8; 32], [10u8; 32]));
        let sealed = original.encrypt(b"payload").unwrap();
        assert_eq!(derived.decrypt(&sealed).unwrap(), b"payload");
    }

    #[test]
    fn first_matching_request_wins() {
        let ctx = test_ctx(true);
        let requests = [request("w0"), request("w1"), request("w1")];
        assert!(negotiate(&ctx, &requests, &response("w1")).is_ok());
    }

    #[test]
    fn unmatched_response_is_a_mismatch() {
        let ctx = test_ctx(true);
        let err = negotiate(&ctx, &[request("w0")], &response("w1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyxResponseRequestMismatch);

        let err = negotiate(&ctx, &[], &response("w1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyxResponseRequestMismatch);
    }

    #[test]
    fn missing_factory_is_reported_after_matching() {
        let ctx = test_ctx(false);
        let err = negotiate(&ctx, &[request("w1")], &response("w1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyxFactoryNotFound);
    }

    #[test]
    fn wrong_wrap_context_fails_derivation() {
        let exchange = SymmetricWrappedKeyExchange::new(Arc::new(
            SymmetricCryptoContext::from_keys(SessionKeys::new([1u8; 32], [1u8; 32])),
        ));
        let err =
            exchange.derive_crypto_context(&request("w1"), &response("w1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyxResponseRequestMismatch);
    }
}
