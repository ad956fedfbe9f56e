//! Session store: cached crypto contexts keyed by master token
//! serial number.
//!
//! The store is process-wide and read-mostly. Installing a context
//! for a newly accepted master token is atomic with respect to
//! concurrent readers; a reader sees either the old entry or the new
//! one, never a partial state.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use sealframe_crypto::CryptoContext;

/// Cache of session crypto contexts by master token serial number.
#[derive(Default)]
pub struct SealStore {
    contexts: RwLock<HashMap<u64, Arc<dyn CryptoContext>>>,
}

impl SealStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session context for a serial number, replacing any
    /// previous entry.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[allow(clippy::expect_used)]
    pub fn save(&self, serial_number: u64, crypto: Arc<dyn CryptoContext>) {
        self.contexts.write().expect("RwLock poisoned").insert(serial_number, crypto);
    }

    /// Cached session context for a serial number, if any.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[allow(clippy::expect_used)]
    pub fn cached(&self, serial_number: u64) -> Option<Arc<dyn CryptoContext>> {
        self.contexts.read().expect("RwLock poisoned").get(&serial_number).cloned()
    }

    /// Drop the session context for a serial number.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[allow(clippy::expect_used)]
    pub fn remove(&self, serial_number: u64) {
        self.contexts.write().expect("RwLock poisoned").remove(&serial_number);
    }
}
