//! Cooperative cancellation for long-running operations.
//!
//! An [`AbortHandle`] is held by whoever may cancel (the agent loop, a
//! Ctrl+C handler); the paired [`AbortSignal`] is passed into the operation,
//! which polls it and kills its subprocess once it fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancels the operation observing the paired [`AbortSignal`].
#[derive(Debug, Clone)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

/// Read side of an [`AbortHandle`].
///
/// The default signal never fires.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a new handle/signal pair.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, AbortSignal) {
        let aborted = Arc::new(AtomicBool::new(false));
        (
            Self {
                aborted: Arc::clone(&aborted),
            },
            AbortSignal { aborted },
        )
    }

    /// Fire the signal. Idempotent.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}
