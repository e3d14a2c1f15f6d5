//! # Unconfirmed Transaction Set
//!
//! Transactions sent (or resumed) whose confirmation has not been recorded,
//! keyed by transaction id. Mutated only at submission and at completion.

use std::collections::HashMap;

use alloy_primitives::B256;
use parking_lot::Mutex;

/// In-flight transactions and the entry each one publishes.
#[derive(Debug, Default)]
pub struct UnconfirmedSet {
    inner: Mutex<HashMap<B256, String>>,
}

impl UnconfirmedSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `tx_id` as publishing entry `id`.
    pub fn insert(&self, tx_id: B256, id: impl Into<String>) {
        self.inner.lock().insert(tx_id, id.into());
    }

    /// Stops tracking `tx_id`, returning its entry.
    pub fn remove(&self, tx_id: &B256) -> Option<String> {
        self.inner.lock().remove(tx_id)
    }

    /// Checks if `tx_id` is in flight.
    #[must_use]
    pub fn contains(&self, tx_id: &B256) -> bool {
        self.inner.lock().contains_key(tx_id)
    }

    /// Number of in-flight transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Checks if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
