//! Time abstractions for testable timing behavior.
//!
//! Rate windows, credential expiry, retry backoff, and webhook timestamps
//! all read time through the [`Clock`] trait so tests can drive them
//! deterministically.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};

/// Clock abstraction for time operations.
///
/// Production code uses [`RealClock`]; tests inject [`TestClock`] to step
/// through rate windows and retry schedules without real waiting.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Returns the current system time for timestamps.
    fn now_system(&self) -> SystemTime;

    /// Returns the current wall-clock time as a UTC timestamp.
    ///
    /// Window arithmetic and expiry checks work in `DateTime<Utc>`, so this
    /// is the accessor most callers want.
    fn now_utc(&self) -> DateTime<Utc> {
        self.now_system().into()
    }

    /// Sleeps for the specified duration.
    ///
    /// Production maps to `tokio::time::sleep`; test clocks advance virtual
    /// time immediately instead of waiting.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real clock backed by system time and tokio's sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test clock with controllable time progression.
///
/// Monotonic and system time advance together via [`advance`](Self::advance);
/// system time alone can also jump backwards, which windows must tolerate.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// Monotonic time in nanoseconds since clock creation.
    monotonic_ns: Arc<AtomicU64>,
    /// System time as nanoseconds since UNIX_EPOCH.
    system_ns: Arc<AtomicU64>,
    /// Base instant for monotonic time calculations.
    base_instant: Instant,
}

impl TestClock {
    /// Creates a new test clock starting at the current time.
    pub fn new() -> Self {
        Self::with_start_time(SystemTime::now())
    }

    /// Creates a test clock starting at a specific system time.
    pub fn with_start_time(start: SystemTime) -> Self {
        let since_epoch = start.duration_since(UNIX_EPOCH).unwrap_or_default();

        Self {
            monotonic_ns: Arc::new(AtomicU64::new(0)),
            system_ns: Arc::new(AtomicU64::new(
                u64::try_from(since_epoch.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0),
            )),
            base_instant: Instant::now(),
        }
    }

    /// Advances both clocks by the specified duration.
    pub fn advance(&self, duration: Duration) {
        let duration_ns = u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0);

        self.monotonic_ns.fetch_add(duration_ns, Ordering::AcqRel);
        self.system_ns.fetch_add(duration_ns, Ordering::AcqRel);
    }

    /// Jumps the clock to a specific system time.
    ///
    /// Forward jumps advance both clocks; backward jumps move system time
    /// only, since monotonic time never decreases.
    pub fn jump_to(&self, time: SystemTime) {
        let target_ns = u64::try_from(
            time.duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
                .min(u128::from(u64::MAX)),
        )
        .unwrap_or(0);
        let current_ns = self.system_ns.load(Ordering::Acquire);

        if target_ns > current_ns {
            self.advance(Duration::from_nanos(target_ns - current_ns));
        } else {
            self.system_ns.store(target_ns, Ordering::Release);
        }
    }

    /// Returns elapsed time since clock creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.monotonic_ns.load(Ordering::Acquire))
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        let elapsed_ns = self.monotonic_ns.load(Ordering::Acquire);
        self.base_instant + Duration::from_nanos(elapsed_ns)
    }

    fn now_system(&self) -> SystemTime {
        let ns = self.system_ns.load(Ordering::Acquire);
        UNIX_EPOCH + Duration::from_nanos(ns)
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        // Yield so other tasks observe the new time
        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_monotonic_time() {
        let clock = TestClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(10));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(10));
    }

    #[test]
    fn utc_accessor_tracks_system_time() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let clock = TestClock::with_start_time(start);

        assert_eq!(clock.now_utc().timestamp(), 1_700_000_000);

        clock.advance(Duration::from_secs(3600));
        assert_eq!(clock.now_utc().timestamp(), 1_700_003_600);
    }

    #[test]
    fn backward_jump_moves_system_time_only() {
        let clock = TestClock::with_start_time(SystemTime::UNIX_EPOCH + Duration::from_secs(2000));
        let monotonic_before = clock.now();

        clock.jump_to(SystemTime::UNIX_EPOCH + Duration::from_secs(1000));

        assert_eq!(clock.now_system(), SystemTime::UNIX_EPOCH + Duration::from_secs(1000));
        assert!(clock.now() >= monotonic_before);
    }

    #[tokio::test]
    async fn sleep_advances_virtual_time() {
        let clock = TestClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_secs(5)).await;

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
    }
}
