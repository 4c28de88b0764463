//! Reconnect backoff with jitter

use std::time::Duration;

use rand::Rng;

/// Exponential backoff: 100 ms doubling to a 5 s cap, jittered ±20 %
///
/// `reset` after a successful connection so the next failure starts over.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: f64,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(5), 0.2)
    }
}

impl Backoff {
    /// Create a backoff schedule
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Self {
            base,
            cap,
            jitter,
            attempt: 0,
        }
    }

    /// Number of failures since the last reset
    #[inline]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, advancing the schedule
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base.as_secs_f64() * f64::from(2u32.saturating_pow(self.attempt.min(16)));
        let capped = exp.min(self.cap.as_secs_f64());
        self.attempt = self.attempt.saturating_add(1);

        let spread = if self.jitter > 0.0 {
            rand::rng().random_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64((capped * (1.0 + spread)).max(0.0))
    }

    /// Start the schedule over after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
