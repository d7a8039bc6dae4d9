//! Process-wide module initialization state.
//!
//! Held as an explicit object and handed to the [`Registry`](crate::Registry)
//! so tests can create a fresh one per case instead of sharing a global.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared `Uninitialized <-> Initialized` flag.
///
/// Cloning yields another view of the same state.
#[derive(Debug, Clone, Default)]
pub struct ModuleState {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    initialized: AtomicBool,
    /// Bumped on every Uninitialized -> Initialized transition
    epoch: AtomicU64,
}

impl ModuleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to Initialized.
    ///
    /// Returns `true` if this call performed the transition and `false` if
    /// the module was already initialized (no side effect).
    pub fn initialize(&self) -> bool {
        let transitioned = self
            .inner
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if transitioned {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }
        transitioned
    }

    /// Transition back to Uninitialized. Returns `true` if the module was
    /// initialized.
    pub(crate) fn teardown(&self) -> bool {
        self.inner
            .initialized
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Number of times the module has been initialized. Sessions opened in
    /// an older epoch are no longer valid.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }
}
