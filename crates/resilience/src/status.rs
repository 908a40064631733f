//! Read-only breaker snapshots and status serialization.
//!
//! The snapshot is the typed form handed to in-process consumers; the flat
//! JSON map is the stable contract for any HTTP status layer built on top.
//! Neither accessor mutates breaker state.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::breaker::CircuitState;
use crate::config::CircuitBreakerConfig;

/// Backoff portion of a breaker snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSnapshot {
    /// Failed half-open episodes since the circuit last closed.
    pub consecutive_half_open_failures: u32,
    /// Delay computed by the most recent probe failure, if any.
    pub current_backoff_delay: Option<Duration>,
    /// Wall-clock estimate of when the current backoff expires.
    pub backoff_expires_at: Option<SystemTime>,
}

/// Immutable snapshot of a breaker's state and counters.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    /// Circuit state at snapshot time.
    pub state: CircuitState,
    /// Consecutive-failure counter.
    pub failure_count: u64,
    /// Probe successes in the current half-open episode.
    pub success_count: u64,
    /// Probe calls admitted in the current half-open episode.
    pub half_open_calls: u64,
    /// Failures recorded over the breaker's lifetime.
    pub total_failures: u64,
    /// Successes recorded over the breaker's lifetime.
    pub total_successes: u64,
    /// Wall-clock time of the most recent recorded failure.
    pub last_failure_time: Option<SystemTime>,
    /// Wall-clock time the circuit most recently opened; `None` while
    /// closed.
    pub opened_at: Option<SystemTime>,
    /// Wall-clock time of the most recent state transition.
    pub last_state_change: Option<DateTime<Utc>>,
    /// Backoff escalation state.
    pub backoff: BackoffSnapshot,
}

impl BreakerSnapshot {
    /// Serialize into the flat key/value status map consumed by the external
    /// status API.
    pub fn to_status(&self, name: &str, config: &CircuitBreakerConfig) -> Value {
        json!({
            "name": name,
            "state": self.state.as_status_str(),
            "failure_count": self.failure_count,
            "success_count": self.success_count,
            "total_failures": self.total_failures,
            "total_successes": self.total_successes,
            "last_failure_time": self.last_failure_time.map(epoch_secs),
            "opened_at": self.opened_at.map(epoch_secs),
            "last_state_change": self
                .last_state_change
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            "backoff": {
                "consecutive_half_open_failures": self.backoff.consecutive_half_open_failures,
                "current_backoff_delay": self.backoff.current_backoff_delay.map(|d| d.as_secs_f64()),
                "backoff_expires_at": self.backoff.backoff_expires_at.map(epoch_secs),
            },
            "config": {
                "failure_threshold": config.failure_threshold,
                "recovery_timeout": config.recovery_timeout.as_secs_f64(),
                "half_open_max_calls": config.half_open_max_calls,
                "success_threshold": config.success_threshold,
                "backoff_base_delay": config.backoff_base_delay.as_secs_f64(),
                "backoff_max_delay": config.backoff_max_delay.as_secs_f64(),
            },
        })
    }
}

fn epoch_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}
