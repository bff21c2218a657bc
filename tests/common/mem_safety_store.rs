//! [`MemSafetyStore`], an in-memory [`SafetyStateStore`] that survives "restarts" of the safety rules
//! that use it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use bft_core::safety_rules::{SafetyState, SafetyStateStore, SafetyStoreError};

/// Clones share the same underlying state, so a clone handed to a fresh `SafetyRules` simulates a
/// validator restarting on the same disk.
#[derive(Clone, Default)]
pub(crate) struct MemSafetyStore {
    state: Arc<Mutex<Option<SafetyState>>>,
    failing: Arc<AtomicBool>,
    writes: Arc<Mutex<Vec<SafetyState>>>,
}

impl MemSafetyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `store` fail (or succeed again).
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst)
    }

    /// The durable state, as a restarted validator would load it.
    pub(crate) fn persisted(&self) -> Option<SafetyState> {
        *self.state.lock().unwrap()
    }

    /// Every state successfully written, in order.
    pub(crate) fn writes(&self) -> Vec<SafetyState> {
        self.writes.lock().unwrap().clone()
    }
}

impl SafetyStateStore for MemSafetyStore {
    fn load(&self) -> Option<SafetyState> {
        self.persisted()
    }

    fn store(&mut self, state: &SafetyState) -> Result<(), SafetyStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SafetyStoreError("disk full".to_string()));
        }
        *self.state.lock().unwrap() = Some(*state);
        self.writes.lock().unwrap().push(*state);
        Ok(())
    }
}
