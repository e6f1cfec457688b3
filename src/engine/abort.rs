//! Cancellation signal shared between the engine and the operator UI
//!
//! The engine samples the signal cooperatively at the top of each command
//! dispatch and inside waitfor poll loops. The trigger side (Ctrl-C
//! handler, abort button) runs on another task, so the flag is atomic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply clonable abort token
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the signal before a new run
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Request that the current run stop as soon as possible
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether an abort has been requested
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
