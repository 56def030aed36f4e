use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of [`CancellationToken::sleep`]. Bounds how long a sleeping worker can
/// take to notice a cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// One-way cancellation signal shared between the controller and its workers.
///
/// A token created with [`child`](CancellationToken::child) is cancelled either directly or
/// through any of its ancestors, which lets a single connection be torn down without
/// stopping the whole server.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Box<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that observes this one but can also be cancelled on its own.
    pub fn child(&self) -> CancellationToken {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// # Returns
    ///
    /// * `true` if the token was cancelled before or during the sleep.
    /// * `false` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
