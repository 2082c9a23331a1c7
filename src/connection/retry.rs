use rand::Rng;
use std::time::Duration;

/// Reconnect backoff policy.
///
/// Delay before attempt k (1-indexed) is `min(base * 2^k, cap)` multiplied
/// by a uniform jitter factor in [0.5, 1.0]. The loop aborts after
/// `max_attempts` failed attempts or `max_elapsed` of total retry time,
/// whichever comes first.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay the exponent scales from
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Maximum number of reconnect attempts
    pub max_attempts: u32,
    /// Maximum total time spent retrying
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
            max_elapsed: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Jittered delay before the given attempt (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let (_, max) = self.window_for(attempt);
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        max.mul_f64(jitter)
    }

    /// The [min, max] range `delay_for` draws from, before jitter is applied
    /// to the upper bound.
    pub fn window_for(&self, attempt: u32) -> (Duration, Duration) {
        let exp = self
            .base_delay
            .as_secs_f64()
            * 2f64.powi(attempt.min(30) as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        (
            Duration::from_secs_f64(capped * 0.5),
            Duration::from_secs_f64(capped),
        )
    }

    /// Whether the retry budget is spent after `attempts` failed attempts
    /// and `elapsed` total retry time.
    pub fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        attempts >= self.max_attempts || elapsed >= self.max_elapsed
    }
}
