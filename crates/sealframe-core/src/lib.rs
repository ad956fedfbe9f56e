//! Receive-side pipeline of the sealframe message security layer.
//!
//! A message is one header followed by zero or more payload chunks,
//! each independently sealed. This crate turns a raw byte stream into
//! decrypted application bytes while enforcing the protocol: header
//! validation, credential trust, key response negotiation, freshness
//! and anti-replay rules, and chunk ordering.
//!
//! The entry point is [`MessageInputStream`]. Everything it needs is
//! injected through a [`SealContext`]: the process-wide seal crypto
//! context, entity auth and key exchange factories, the token
//! factory, the session store, the deployment role, and the clock.
//!
//! ```no_run
//! use std::{collections::HashMap, sync::Arc, time::Duration};
//!
//! use sealframe_core::{MessageInputStream, ReadOutcome, Role, SealContext};
//! use sealframe_crypto::NullCryptoContext;
//! use sealframe_proto::BufferSource;
//!
//! # fn demo(wire: Vec<u8>) -> Result<(), sealframe_core::SealError> {
//! let ctx = Arc::new(SealContext::new(
//!     Role::TrustedNetworkClient,
//!     Arc::new(NullCryptoContext),
//!     Arc::new(sealframe_core::tokens::MemoryTokenFactory::new()),
//! ));
//! let mut stream =
//!     MessageInputStream::new(ctx, BufferSource::new(wire), Vec::new(), HashMap::new());
//!
//! let timeout = Duration::from_secs(5);
//! while !stream.is_ready(timeout)? {}
//! while let ReadOutcome::Data(bytes) = stream.read(Some(4096), timeout)? {
//!     // application bytes, in order
//!     drop(bytes);
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod context;
pub mod credentials;
pub mod entityauth;
pub mod error;
pub mod freshness;
pub mod header;
pub mod keyx;
pub mod store;
pub mod stream;
pub mod tokens;

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{Role, SealContext};
pub use entityauth::{EntityAuthData, EntityAuthFactory};
pub use error::{ErrorKind, ResponseCode, SealError};
pub use header::{ErrorHeader, Header, MessageHeader};
pub use keyx::KeyExchangeFactory;
pub use store::SealStore;
pub use stream::{MessageInputStream, ReadOutcome, StreamConfig};
pub use tokens::{MasterToken, ServiceToken, TokenFactory, UserIdToken};
