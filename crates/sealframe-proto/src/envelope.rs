//! Serde structs for wire envelopes and their sealed plaintexts.
//!
//! Every object on the wire is a signed envelope: ciphertext plus a
//! signature over the raw ciphertext bytes. This module defines the
//! envelope shapes and the plaintext shapes that appear once a crypto
//! context opens them. Binary fields travel as base64 strings.
//!
//! Nothing here is validated beyond structure. Signature checks,
//! decryption, and trust decisions belong to the protocol layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// Serde adapter for mandatory base64 byte fields.
pub mod b64 {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Encode bytes as a base64 string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Decode a base64 string into bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional base64 byte fields.
pub mod b64_opt {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Encode optional bytes as a base64 string.
    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    /// Decode an optional base64 string into bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        text.map(|t| STANDARD.decode(t).map_err(serde::de::Error::custom)).transpose()
    }
}

/// Decode a wire object into a typed struct.
///
/// # Errors
///
/// [`ProtocolError::JsonDecode`] if the bytes are not a JSON text of
/// the expected shape.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::JsonDecode(e.to_string()))
}

/// Encode a typed struct into wire bytes.
///
/// # Errors
///
/// [`ProtocolError::JsonEncode`] if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ProtocolError::JsonEncode(e.to_string()))
}

/// First object of a message: the header envelope.
///
/// Exactly one of `headerdata` (message header) or `errordata` (error
/// header) is present; the protocol layer disambiguates on that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Entity authentication data `{scheme, authdata}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entityauthdata: Option<EntityAuth>,

    /// Sealed master token, if the sender holds one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastertoken: Option<SealedToken>,

    /// Ciphertext of [`HeaderData`] under the header crypto context
    #[serde(default, with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub headerdata: Option<Vec<u8>>,

    /// Ciphertext of [`ErrorData`] under the entity auth context
    #[serde(default, with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub errordata: Option<Vec<u8>>,

    /// Signature over the raw ciphertext bytes
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

/// Entity authentication claim carried in clear.
///
/// `authdata` is scheme-specific; only the matching entity auth
/// factory can interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAuth {
    /// Scheme name, e.g. `"preshared"` or `"ed25519"`
    pub scheme: String,
    /// Scheme-specific claim
    pub authdata: Value,
}

/// Sealed token envelope shared by master tokens and user-ID tokens.
///
/// `tokendata` is cleartext JSON (the trust-relevant numbers are
/// visible); only the session/user data nested inside it is encrypted.
/// The signature binds the whole of `tokendata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedToken {
    /// Raw token data bytes (JSON text)
    #[serde(with = "b64")]
    pub tokendata: Vec<u8>,
    /// Signature over `tokendata`
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

/// Cleartext body of a sealed master token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterTokenData {
    /// Epoch seconds after which the token may be renewed
    pub renewalwindow: u64,
    /// Epoch seconds after which the token is expired
    pub expiration: u64,
    /// Issue ordering number (newer tokens have larger values)
    pub sequencenumber: u64,
    /// Stable identifier for this token's session
    pub serialnumber: u64,
    /// Ciphertext of [`SessionData`] under the process seal context
    #[serde(with = "b64")]
    pub sessiondata: Vec<u8>,
}

/// Decrypted session payload of a master token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Entity identity the token was issued to
    pub identity: String,
    /// Session encryption key
    #[serde(with = "b64")]
    pub encryptionkey: Vec<u8>,
    /// Session HMAC key
    #[serde(with = "b64")]
    pub hmackey: Vec<u8>,
    /// Opaque issuer-defined data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuerdata: Option<Value>,
}

/// Cleartext body of a sealed user-ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdTokenData {
    /// Epoch seconds after which the token may be renewed
    pub renewalwindow: u64,
    /// Epoch seconds after which the token is expired
    pub expiration: u64,
    /// Serial number of the master token this token is bound to
    pub mtserialnumber: u64,
    /// Stable identifier for this token
    pub serialnumber: u64,
    /// Ciphertext of [`UserData`] under the process seal context
    #[serde(with = "b64")]
    pub userdata: Vec<u8>,
}

/// Decrypted user payload of a user-ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    /// User identity
    pub identity: String,
}

/// Opaque application token carried in a message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTokenWire {
    /// Application-chosen token name
    pub name: String,
    /// Master token serial this token is bound to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtserialnumber: Option<u64>,
    /// User-ID token serial this token is bound to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utserialnumber: Option<u64>,
    /// Token bytes; opaque unless the caller supplied a crypto context
    /// for this name
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

/// Capability advertisement inside header data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Compression algorithm names the sender accepts, in preference
    /// order
    #[serde(default)]
    pub compressionalgos: Vec<String>,
    /// Encoder format names the sender accepts
    #[serde(default)]
    pub encoderformats: Vec<String>,
}

impl Capabilities {
    /// First advertised compression algorithm we also support.
    ///
    /// Unknown names are skipped rather than rejected; capabilities
    /// are an advertisement, not a demand.
    #[must_use]
    pub fn preferred_compression(&self) -> Option<crate::CompressionAlgorithm> {
        self.compressionalgos
            .iter()
            .find_map(|name| crate::CompressionAlgorithm::from_name(name).ok())
    }
}

/// Key request entry: the sender asks the recipient to perform this
/// key exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRequest {
    /// Key exchange scheme name
    pub scheme: String,
    /// Scheme-specific request parameters
    pub keydata: Value,
}

impl KeyRequest {
    /// Whether `response` answers this request.
    ///
    /// Schemes must match. If both sides carry a `wrapid` parameter it
    /// must match too; schemes without that discriminator match on
    /// scheme alone.
    pub fn matches(&self, response: &KeyResponse) -> bool {
        if self.scheme != response.scheme {
            return false;
        }
        match (self.keydata.get("wrapid"), response.keydata.get("wrapid")) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Key response entry: the remote side performed a key exchange
/// answering one of our requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyResponse {
    /// Key exchange scheme name
    pub scheme: String,
    /// Master token issued alongside the exchange, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastertoken: Option<SealedToken>,
    /// Scheme-specific response parameters
    pub keydata: Value,
}

/// Decrypted plaintext of a message header's `headerdata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderData {
    /// Message ID, monotonically increasing per sender
    pub messageid: u64,

    /// Anti-replay ID; present only when the sender wants replay
    /// protection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonreplayableid: Option<u64>,

    /// Whether the recipient may renew the sender's tokens
    #[serde(default)]
    pub renewable: bool,

    /// Whether this is an explicit handshake message
    #[serde(default)]
    pub handshake: bool,

    /// Sender capability advertisement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,

    /// Key exchange requests, in sender preference order
    #[serde(default)]
    pub keyrequestdata: Vec<KeyRequest>,

    /// Key exchange response answering one of our requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyresponsedata: Option<KeyResponse>,

    /// User authentication claim; scheme-specific and opaque here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userauthdata: Option<Value>,

    /// Sealed user-ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub useridtoken: Option<SealedToken>,

    /// Application service tokens
    #[serde(default)]
    pub servicetokens: Vec<ServiceTokenWire>,
}

/// Decrypted plaintext of an error header's `errordata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Entity the error is addressed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Message ID of this error message
    pub messageid: u64,
    /// Protocol response code
    pub errorcode: u32,
    /// Implementation-specific error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internalcode: Option<u32>,
    /// Developer-facing error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errormsg: Option<String>,
    /// User-facing error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usermsg: Option<String>,
}

/// A payload chunk on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadEnvelope {
    /// Ciphertext of [`PayloadData`] under the payload crypto context
    #[serde(with = "b64")]
    pub payload: Vec<u8>,
    /// Signature over the raw ciphertext bytes
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

/// Decrypted plaintext of a payload chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadData {
    /// Position within the message; starts at
    /// [`crate::FIRST_PAYLOAD_SEQUENCE`] and increments by 1
    pub sequencenumber: u64,
    /// Must equal the header's message ID
    pub messageid: u64,
    /// True on the final chunk of the message
    #[serde(default)]
    pub endofmsg: bool,
    /// Compression applied to `data`, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressionalgo: Option<String>,
    /// Application bytes, compressed per `compressionalgo`
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let envelope = Envelope {
            entityauthdata: Some(EntityAuth {
                scheme: "preshared".to_string(),
                authdata: serde_json::json!({"pskid": "entity-a"}),
            }),
            mastertoken: None,
            headerdata: Some(vec![1, 2, 3]),
            errordata: None,
            signature: vec![4, 5, 6],
        };

        let wire = encode(&envelope).unwrap();
        let parsed: Envelope = decode(&wire).unwrap();
        assert_eq!(envelope, parsed);
    }

    #[test]
    fn headerdata_is_base64_on_the_wire() {
        let envelope = Envelope {
            entityauthdata: None,
            mastertoken: None,
            headerdata: Some(b"cipher".to_vec()),
            errordata: None,
            signature: b"sig".to_vec(),
        };

        let wire = String::from_utf8(encode(&envelope).unwrap()).unwrap();
        assert!(wire.contains("\"Y2lwaGVy\""), "got: {wire}");
        assert!(wire.contains("\"c2ln\""), "got: {wire}");
    }

    #[test]
    fn header_data_defaults() {
        let parsed: HeaderData = decode(br#"{"messageid": 7}"#).unwrap();
        assert_eq!(parsed.messageid, 7);
        assert_eq!(parsed.nonreplayableid, None);
        assert!(!parsed.renewable);
        assert!(!parsed.handshake);
        assert!(parsed.keyrequestdata.is_empty());
        assert!(parsed.servicetokens.is_empty());
    }

    #[test]
    fn bad_base64_is_a_decode_error() {
        let result: Result<PayloadEnvelope> =
            decode(br#"{"payload": "!!!", "signature": "c2ln"}"#);
        assert!(matches!(result, Err(ProtocolError::JsonDecode(_))));
    }

    #[test]
    fn payload_data_round_trip() {
        let data = PayloadData {
            sequencenumber: 1,
            messageid: 42,
            endofmsg: true,
            compressionalgo: Some("GZIP".to_string()),
            data: vec![0xAB; 16],
        };

        let wire = encode(&data).unwrap();
        let parsed: PayloadData = decode(&wire).unwrap();
        assert_eq!(data, parsed);
    }

    #[test]
    fn preferred_compression_skips_unknown_names() {
        let capabilities = Capabilities {
            compressionalgos: vec!["LZW".to_string(), "LZ4".to_string(), "GZIP".to_string()],
            encoderformats: vec!["JSON".to_string()],
        };
        assert_eq!(
            capabilities.preferred_compression(),
            Some(crate::CompressionAlgorithm::Lz4)
        );

        assert_eq!(Capabilities::default().preferred_compression(), None);
    }

    #[test]
    fn key_request_matching() {
        let request = KeyRequest {
            scheme: "symmetric_wrapped".to_string(),
            keydata: serde_json::json!({"wrapid": "w1"}),
        };

        let same = KeyResponse {
            scheme: "symmetric_wrapped".to_string(),
            mastertoken: None,
            keydata: serde_json::json!({"wrapid": "w1", "encryptionkey": ""}),
        };
        assert!(request.matches(&same));

        let other_wrap = KeyResponse {
            scheme: "symmetric_wrapped".to_string(),
            mastertoken: None,
            keydata: serde_json::json!({"wrapid": "w2"}),
        };
        assert!(!request.matches(&other_wrap));

        let other_scheme = KeyResponse {
            scheme: "diffie_hellman".to_string(),
            mastertoken: None,
            keydata: serde_json::json!({"wrapid": "w1"}),
        };
        assert!(!request.matches(&other_scheme));
    }
}
