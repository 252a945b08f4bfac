//! Backoff schedule for the webhook attempt loop.
//!
//! Dispatch uses a short fixed schedule rather than open-ended exponential
//! backoff: the configured delay list is consumed in order, and if the
//! attempt budget outruns the list, each further delay doubles the previous
//! one. The whole sequence completes within the dispatching task.

use std::time::Duration;

/// Default total attempt budget (initial attempt plus retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delays between attempts, in seconds.
pub const DEFAULT_RETRY_DELAY_SECONDS: [u64; 2] = [1, 2];

/// Delay plan for a bounded sequence of delivery attempts.
///
/// Attempts are numbered from 1. `delay_after(n)` answers "attempt `n`
/// failed; how long until attempt `n + 1`?", or `None` when the budget is
/// exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    max_attempts: u32,
    delays: Vec<Duration>,
}

impl RetrySchedule {
    /// Creates a schedule from an attempt budget and a delay list.
    ///
    /// A budget below 1 is clamped to 1 (the initial attempt always runs).
    /// An empty delay list falls back to the defaults.
    pub fn new(max_attempts: u32, delays: Vec<Duration>) -> Self {
        let delays = if delays.is_empty() {
            DEFAULT_RETRY_DELAY_SECONDS.iter().map(|s| Duration::from_secs(*s)).collect()
        } else {
            delays
        };
        Self { max_attempts: max_attempts.max(1), delays }
    }

    /// Total attempt budget, including the initial attempt.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt, or `None` when no
    /// further attempt remains.
    ///
    /// Beyond the configured list the delay doubles per step, starting from
    /// the last configured entry.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let index = attempt.saturating_sub(1) as usize;
        if let Some(delay) = self.delays.get(index) {
            return Some(*delay);
        }

        // Budget outran the configured list; `new` guarantees the list is
        // non-empty, so the fallback base is never used.
        let last = self.delays.last().copied().unwrap_or(Duration::from_secs(1));
        let steps = (index - self.delays.len() + 1).min(20) as u32;
        Some(last.saturating_mul(2_u32.saturating_pow(steps)))
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Vec::new())
    }
}
