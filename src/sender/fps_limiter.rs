use std::time::{Duration, Instant};

use crate::core::cancel::CancellationToken;

/// Paces a loop to a target frame rate by sleeping off whatever is left of each frame
/// interval.
#[derive(Debug)]
pub struct FpsLimiter {
    interval: Duration,
    last: Instant,
}

impl FpsLimiter {
    /// `fps` of zero is treated as one.
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / fps.max(1),
            last: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleeps until one interval has passed since the previous call.
    ///
    /// # Returns
    ///
    /// * `true` if `cancel` fired while waiting.
    pub fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let elapsed = self.last.elapsed();
        let cancelled = if elapsed < self.interval {
            cancel.sleep(self.interval - elapsed)
        } else {
            cancel.is_cancelled()
        };
        self.last = Instant::now();
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval() {
        assert_eq!(FpsLimiter::new(50).interval(), Duration::from_millis(20));
        assert_eq!(FpsLimiter::new(0).interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_holds_rate() {
        let cancel = CancellationToken::new();
        let mut limiter = FpsLimiter::new(100);
        let start = Instant::now();
        for _ in 0..5 {
            assert!(!limiter.wait(&cancel));
        }
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_no_sleep_when_behind() {
        let cancel = CancellationToken::new();
        let mut limiter = FpsLimiter::new(100);
        std::thread::sleep(Duration::from_millis(30));
        let start = Instant::now();
        assert!(!limiter.wait(&cancel));
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_cancel_interrupts_wait() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut limiter = FpsLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.wait(&cancel));
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
