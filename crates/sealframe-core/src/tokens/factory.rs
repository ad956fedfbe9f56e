//! Token factory: trust, revocation, and anti-replay state.
//!
//! The factory is the process's authority on token trust. The receive
//! pipeline consults it for revocation decisions and for acceptance
//! of non-replayable IDs. The largest-seen ID per master-token serial
//! number is the one piece of mutable state with strong ordering
//! requirements: the compare-and-advance must be linearizable per
//! serial number.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use crate::tokens::{MasterToken, UserIdToken};

/// Width of the non-replayable ID acceptance window.
pub const NON_REPLAYABLE_ID_WINDOW: u64 = 65536;

/// IDs live in `[0, 2^63)` and the window wraps modulo 2^63.
const ID_MODULUS: u128 = 1 << 63;

/// Outcome of presenting a non-replayable ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDecision {
    /// ID accepted; largest-seen advanced
    Accept,
    /// ID at or below the largest seen
    Replayed,
    /// ID too far ahead; the receiver cannot safely advance
    Unrecoverable,
}

/// Decide whether `incoming` is acceptable given the largest-seen ID.
///
/// With largest-seen `L`, an incoming ID `N` is accepted iff
/// `(N - L) mod 2^63` lies in `(0, WINDOW]`. Otherwise IDs at or
/// below `L` are replays and IDs further ahead are unrecoverable.
/// With no largest-seen yet, anything is accepted.
#[must_use]
pub fn window_decision(largest: Option<u64>, incoming: u64) -> AcceptDecision {
    let Some(largest) = largest else {
        return AcceptDecision::Accept;
    };

    let ahead = (ID_MODULUS + u128::from(incoming) - u128::from(largest)) % ID_MODULUS;
    if ahead == 0 {
        return AcceptDecision::Replayed;
    }
    if ahead <= u128::from(NON_REPLAYABLE_ID_WINDOW) {
        return AcceptDecision::Accept;
    }
    if incoming <= largest {
        AcceptDecision::Replayed
    } else {
        AcceptDecision::Unrecoverable
    }
}

/// Process-wide token trust authority.
///
/// All methods are called with parsed tokens; implementations decide
/// trust, not structure. `accept_non_replayable_id` must advance the
/// largest-seen ID atomically with the acceptance decision.
pub trait TokenFactory: Send + Sync {
    /// Revocation check for an entity identity. Returns the reason if
    /// revoked.
    fn is_entity_revoked(&self, identity: &str) -> Option<String>;

    /// Revocation check for a master token. Returns the reason if
    /// revoked.
    fn is_master_token_revoked(&self, token: &MasterToken) -> Option<String>;

    /// Revocation check for a user-ID token presented with a master
    /// token. Returns the reason if revoked.
    fn is_user_id_token_revoked(
        &self,
        master_token: &MasterToken,
        user_id_token: &UserIdToken,
    ) -> Option<String>;

    /// Present a non-replayable ID for the master token's serial
    /// number. On [`AcceptDecision::Accept`] the largest-seen ID has
    /// been advanced before this returns.
    fn accept_non_replayable_id(&self, token: &MasterToken, id: u64) -> AcceptDecision;
}

struct MemoryTokenFactoryInner {
    revoked_entities: HashSet<String>,
    revoked_master_tokens: HashSet<u64>,
    revoked_user_id_tokens: HashSet<u64>,
    /// Largest accepted non-replayable ID per master token serial.
    largest_seen: HashMap<u64, u64>,
}

/// In-memory token factory for tests and single-process deployments.
///
/// State lives behind one mutex, making the compare-and-advance on
/// `accept_non_replayable_id` trivially linearizable per serial
/// number. Clone handles share state.
#[derive(Clone)]
pub struct MemoryTokenFactory {
    inner: Arc<Mutex<MemoryTokenFactoryInner>>,
}

impl MemoryTokenFactory {
    /// Create an empty factory: nothing revoked, no IDs seen.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryTokenFactoryInner {
                revoked_entities: HashSet::new(),
                revoked_master_tokens: HashSet::new(),
                revoked_user_id_tokens: HashSet::new(),
                largest_seen: HashMap::new(),
            })),
        }
    }

    /// Revoke an entity identity.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for an
    /// in-memory factory.
    #[allow(clippy::expect_used)]
    pub fn revoke_entity(&self, identity: impl Into<String>) {
        self.inner.lock().expect("Mutex poisoned").revoked_entities.insert(identity.into());
    }

    /// Revoke a master token by serial number.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn revoke_master_token(&self, serial_number: u64) {
        self.inner.lock().expect("Mutex poisoned").revoked_master_tokens.insert(serial_number);
    }

    /// Revoke a user-ID token by serial number.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn revoke_user_id_token(&self, serial_number: u64) {
        self.inner.lock().expect("Mutex poisoned").revoked_user_id_tokens.insert(serial_number);
    }

    /// Pin the largest-seen ID for a serial number (test setup).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn set_largest_seen(&self, serial_number: u64, id: u64) {
        self.inner.lock().expect("Mutex poisoned").largest_seen.insert(serial_number, id);
    }

    /// Largest-seen ID for a serial number.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn largest_seen(&self, serial_number: u64) -> Option<u64> {
        self.inner.lock().expect("Mutex poisoned").largest_seen.get(&serial_number).copied()
    }
}

impl Default for MemoryTokenFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenFactory for MemoryTokenFactory {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn is_entity_revoked(&self, identity: &str) -> Option<String> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner
            .revoked_entities
            .contains(identity)
            .then(|| format!("entity '{identity}' revoked"))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn is_master_token_revoked(&self, token: &MasterToken) -> Option<String> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner
            .revoked_master_tokens
            .contains(&token.serial_number())
            .then(|| format!("master token serial {} revoked", token.serial_number()))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn is_user_id_token_revoked(
        &self,
        _master_token: &MasterToken,
        user_id_token: &UserIdToken,
    ) -> Option<String> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner
            .revoked_user_id_tokens
            .contains(&user_id_token.serial_number())
            .then(|| format!("user id token serial {} revoked", user_id_token.serial_number()))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn accept_non_replayable_id(&self, token: &MasterToken, id: u64) -> AcceptDecision {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let largest = inner.largest_seen.get(&token.serial_number()).copied();

        let decision = window_decision(largest, id);
        if decision == AcceptDecision::Accept {
            inner.largest_seen.insert(token.serial_number(), id);
        }
        decision
    }
}
