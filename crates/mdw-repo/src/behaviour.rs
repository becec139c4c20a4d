//! Behaviour filter
//!
//! Repository behaviours (automatic revisioning on artifact update in the
//! reference host) run unless suppressed. Suppression is scoped: each
//! [`BehaviourFilter::disable`] returns a guard, and behaviours resume once
//! every outstanding guard has been dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-transaction behaviour switch
#[derive(Debug, Clone, Default)]
pub struct BehaviourFilter {
    disabled: Arc<AtomicUsize>,
}

impl BehaviourFilter {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress behaviours until the returned guard is dropped
    #[must_use = "behaviours are re-enabled as soon as the guard is dropped"]
    pub fn disable(&self) -> BehaviourGuard {
        self.disabled.fetch_add(1, Ordering::SeqCst);
        BehaviourGuard {
            disabled: Arc::clone(&self.disabled),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst) == 0
    }
}

/// Scoped suppression; releases on drop, including during unwinding
#[derive(Debug)]
pub struct BehaviourGuard {
    disabled: Arc<AtomicUsize>,
}

impl Drop for BehaviourGuard {
    fn drop(&mut self) {
        self.disabled.fetch_sub(1, Ordering::SeqCst);
    }
}
