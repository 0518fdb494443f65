/// Exponential backoff with full jitter, generalized from the fixed
/// 1s/2s/4s retry schedules used throughout the pipeline workers.
///
/// `delay_for(attempt)` returns a duration in `[0, min(base * 2^attempt, max)]`
/// chosen uniformly at random (full jitter), capped at `max`.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        BackoffPolicy { base_ms, max_ms }
    }

    /// attempt is 0-based (first retry = attempt 0).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(self.max_ms);
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::new(200, 5_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_max() {
        let policy = BackoffPolicy::new(100, 1_000);
        for attempt in 0..10 {
            let d = policy.delay_for(attempt);
            assert!(d.as_millis() <= 1_000);
        }
    }

    #[test]
    fn delay_grows_with_attempt_cap() {
        let policy = BackoffPolicy::new(10, 40);
        // by attempt 2, exponential term (10*2^2=40) already saturates the cap
        let d = policy.delay_for(5);
        assert!(d.as_millis() <= 40);
    }
}
