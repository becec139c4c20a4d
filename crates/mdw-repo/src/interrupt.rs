//! Cooperative interrupt signal
//!
//! An [`Interrupt`] is a one-shot broadcast: once raised it stays raised.
//! Besides polling with [`Interrupt::is_interrupted`], waiters can select on
//! [`Interrupt::signal`], a channel that becomes disconnected when the
//! interrupt is raised.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Inner {
    raised: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
}

/// Shared, clonable interrupt flag
#[derive(Debug, Clone)]
pub struct Interrupt {
    inner: Arc<Inner>,
    signal: Receiver<()>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self {
            inner: Arc::new(Inner {
                raised: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
            }),
            signal: rx,
        }
    }

    /// Raise the interrupt; idempotent
    pub fn interrupt(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        // Dropping the only sender disconnects every receiver clone.
        self.inner.trigger.lock().take();
    }

    #[inline]
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) once interrupted
    ///
    /// Nothing is ever sent on it; use it in `select!` and treat any
    /// readiness as the interrupt.
    #[inline]
    #[must_use]
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}
