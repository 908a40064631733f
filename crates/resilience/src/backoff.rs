//! Exponential backoff for failed recovery probes.
//!
//! Invoked exclusively when a half-open probe fails: each consecutive failed
//! recovery attempt doubles the delay the circuit must additionally wait, up
//! to a configured ceiling. The escalation counter lives in the breaker and
//! resets only when the circuit closes.

use std::time::Duration;

/// Computes the escalating delay after repeated probe failures.
///
/// The delay for `n` consecutive failed half-open episodes is
/// `min(base * 2^n, max)`. With base 1s and max 60s the sequence is
/// 2s, 4s, 8s, 16s, 32s, 60s, 60s, ...
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Create a policy from a base delay and a ceiling.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay after `consecutive_failures` failed half-open episodes.
    ///
    /// Saturates at the ceiling; large counts never overflow.
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        let factor = match 2u32.checked_pow(consecutive_failures) {
            Some(factor) => factor,
            None => return self.max,
        };
        self.base.checked_mul(factor).map_or(self.max, |delay| delay.min(self.max))
    }
}
