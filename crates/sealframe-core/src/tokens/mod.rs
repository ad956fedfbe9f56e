//! Sealed credentials: master tokens, user-ID tokens, service tokens.
//!
//! Tokens arrive inside headers and are opened with the process-wide
//! seal crypto context. The trust-relevant numbers (serial, sequence,
//! expiry) are cleartext in the token body; only the session/user
//! payload nested inside is encrypted, and only after the signature
//! verifies.

mod factory;
mod master;
mod service;
mod user;

pub use factory::{
    AcceptDecision, MemoryTokenFactory, NON_REPLAYABLE_ID_WINDOW, TokenFactory, window_decision,
};
pub use master::MasterToken;
pub use service::ServiceToken;
pub use user::UserIdToken;
