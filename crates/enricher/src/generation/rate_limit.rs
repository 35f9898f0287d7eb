//! Fixed-delay rate control between consecutive external calls.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Enforces a minimum spacing between consecutive calls, across all
/// threads sharing the limiter.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_call: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Blocks until `delay` has passed since the previous call, then
    /// records this call.
    pub fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        // The lock is held while sleeping so waiters queue up in turn.
        let mut last = self.last_call.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                thread::sleep(self.delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}
