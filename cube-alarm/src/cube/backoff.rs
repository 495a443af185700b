//! Reconnect delays for the cube link.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::Duration;

/// Never retry tighter than this, whatever the jitter says.
pub const MIN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct ExponentialBackoff {
    current: Duration,
    initial: Duration,
    max: Duration,
    // RandomState is seeded from OS randomness, so two daemons restarted
    // together still spread their retries.
    jitter_state: RandomState,
    jitter_step: u64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
            jitter_state: RandomState::new(),
            jitter_step: 0,
        }
    }

    /// Return the next delay and advance the state.
    ///
    /// Jitter can halve the first 1 s step. A cube that drops out of range
    /// usually refuses the next attempt at once, so without [`MIN_DELAY`]
    /// the link would hammer the radio with sub-second connects right after
    /// every loss.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.current;
        self.current = (self.current * 2).min(self.max);

        let mut hasher = self.jitter_state.build_hasher();
        hasher.write_u64(self.jitter_step);
        self.jitter_step = self.jitter_step.wrapping_add(1);
        let hash = hasher.finish();
        let jitter = 0.5 + (hash as f64 / u64::MAX as f64) * 0.5;

        nominal.mul_f64(jitter).max(MIN_DELAY)
    }

    /// Back to the initial delay, after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_below_one_second() {
        let mut backoff = ExponentialBackoff::default();

        assert_eq!(backoff.next_delay(), MIN_DELAY);

        let d2 = backoff.next_delay();
        assert!(d2 >= MIN_DELAY, "d2={d2:?}");
        assert!(d2 <= Duration::from_secs(2), "d2={d2:?}");

        let d3 = backoff.next_delay();
        assert!(d3 >= Duration::from_secs(2), "d3={d3:?}");
        assert!(d3 <= Duration::from_secs(4), "d3={d3:?}");
    }

    #[test]
    fn first_retry_after_loss_waits_a_full_second() {
        for _ in 0..64 {
            let mut backoff = ExponentialBackoff::default();
            assert_eq!(backoff.next_delay(), MIN_DELAY);
        }
    }

    #[test]
    fn caps_at_max() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(32), Duration::from_secs(60));

        let _ = backoff.next_delay();
        for _ in 0..5 {
            let d = backoff.next_delay();
            assert!(d >= Duration::from_secs(30), "d={d:?}");
            assert!(d <= Duration::from_secs(60), "d={d:?}");
        }
    }

    #[test]
    fn reset_restores_initial() {
        let mut backoff = ExponentialBackoff::default();
        for _ in 0..4 {
            let _ = backoff.next_delay();
        }

        backoff.reset();

        assert_eq!(backoff.next_delay(), MIN_DELAY);
    }

    #[test]
    fn tiny_initial_delay_is_floored() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(100));
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), MIN_DELAY);
        }
    }
}
