//! Retry strategies for scheduled timer items.
//!
//! A strategy decides, after a scheduled item fails, whether it should run
//! again and after how long. The per-item bookkeeping lives in [`RetryState`],
//! which is embedded in the scheduled item itself, so it is dropped together
//! with the item on success, exhaustion or drain.

use rand::Rng;
use std::time::Duration;

/// Retry bookkeeping for a single scheduled item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Number of retries granted so far.
    pub retries: u32,
    /// Interval returned by the last granted retry.
    pub current_interval: Option<Duration>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Decides whether and when a failed item should be retried.
pub trait RetryStrategy: Send + Sync {
    /// Called after a failure. Returns the delay before the next attempt,
    /// or `None` when the item should be given up.
    fn next_interval(&self, state: &mut RetryState) -> Option<Duration>;

    /// Called after a successful run.
    fn clear(&self, state: &mut RetryState) {
        *state = RetryState::default();
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn next_interval(&self, _state: &mut RetryState) -> Option<Duration> {
        None
    }

    fn clear(&self, _state: &mut RetryState) {}
}

/// Exponential backoff with multiplicative jitter and a hard cap.
///
/// The first failure waits `init_interval`. Every further failure doubles the
/// previous interval, scales it by a random factor in `[0.5, 1.5)` and caps it
/// at `max_interval`. After `max_retries` granted retries the next failure
/// gives up.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffWithJitter {
    init_interval: Duration,
    max_interval: Duration,
    max_retries: u32,
}

impl ExponentialBackoffWithJitter {
    pub fn new(init_interval: Duration, max_interval: Duration, max_retries: u32) -> Self {
        Self {
            init_interval,
            max_interval,
            max_retries,
        }
    }

    pub fn init_interval(&self) -> Duration {
        self.init_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn jitter() -> f64 {
        rand::rng().random_range(0.5..1.5)
    }
}

impl Default for ExponentialBackoffWithJitter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300), 10)
    }
}

impl RetryStrategy for ExponentialBackoffWithJitter {
    fn next_interval(&self, state: &mut RetryState) -> Option<Duration> {
        if state.retries >= self.max_retries {
            return None;
        }

        let next = match state.current_interval {
            None => self.init_interval.min(self.max_interval),
            Some(current) => {
                let scaled = current.as_secs_f64() * 2.0 * Self::jitter();
                Duration::try_from_secs_f64(scaled)
                    .unwrap_or(self.max_interval)
                    .min(self.max_interval)
            }
        };

        state.retries += 1;
        state.current_interval = Some(next);
        Some(next)
    }
}
