//! Time abstraction for deterministic breaker testing.
//!
//! All duration comparisons in the breaker use the monotonic `Instant` side
//! of the clock; the wall-clock side exists only for human-readable
//! reporting. Injecting a [`MockClock`] lets tests drive timeout and backoff
//! behavior without sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Clock source consulted by the breaker.
///
/// Production code uses [`SystemClock`]; tests inject [`MockClock`] to
/// control time progression deterministically.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic instant. Drives every timeout decision.
    fn now(&self) -> Instant;

    /// Current wall-clock time. Used only for reporting.
    fn system_time(&self) -> SystemTime;

    /// Seconds since the UNIX epoch as a float, for status serialization.
    fn epoch_secs(&self) -> f64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
    }
}

/// Real system clock for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Controllable clock for tests.
///
/// Clones share the same elapsed offset, so a test can hold one handle while
/// the breaker under test holds another.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock anchored at the current instant with zero elapsed
    /// time.
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the clock by `duration` without sleeping.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance the clock by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Total time this clock has been advanced.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + self.elapsed()
    }
}
