//! Cancellation for a running download.
//!
//! The coordinator hands a clone of the token to every worker. Whoever owns
//! the download (e.g. the CLI on Ctrl-C) calls `cancel`; workers notice at
//! their next safe point, after a block write and its checkpoint update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared stop flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleep for `duration`, waking early if cancelled. Returns true if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        const TICK: Duration = Duration::from_millis(50);
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(TICK));
        }
    }
}
