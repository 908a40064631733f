//! Circuit breaker state machine.
//!
//! One breaker instance guards one downstream resource (for the relay, one
//! broker connection feeding the WebSocket fan-out). The breaker never
//! performs the guarded operation itself: callers ask [`can_execute`] before
//! attempting the operation and report the outcome back through
//! [`record_success`] / [`record_failure`].
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: downstream assumed failing, calls rejected until the recovery
//!   timeout (plus any probe backoff) elapses
//! - Half-open: a bounded number of probe calls test recovery
//!
//! # State transitions
//! ```text
//! Closed → Open: failure_count reaches failure_threshold
//! Open → Half-open: recovery timeout and backoff elapsed, checked lazily
//!                   on the next permission call (no background timer)
//! Half-open → Closed: success_threshold probe successes
//! Half-open → Open: any single probe failure (escalates backoff)
//! ```
//!
//! [`can_execute`]: CircuitBreakerCore::can_execute
//! [`record_success`]: CircuitBreakerCore::record_success
//! [`record_failure`]: CircuitBreakerCore::record_failure

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::clock::{Clock, SystemClock};
use crate::config::{CircuitBreakerConfig, ConfigResult};
use crate::status::{BackoffSnapshot, BreakerSnapshot};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Failing fast, calls rejected.
    Open,
    /// Recovery testing, limited probe calls admitted.
    HalfOpen,
}

impl CircuitState {
    /// Lowercase wire form used by the status map.
    pub fn as_status_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Unguarded circuit breaker core.
///
/// All mutators take `&mut self`; this type is for callers that already run
/// under external serialization (a single-threaded event loop, or a caller
/// holding its own lock). Shared multi-threaded use goes through
/// [`CircuitBreaker`], which wraps this core in a mutex.
pub struct CircuitBreakerCore<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    backoff: BackoffPolicy,
    clock: C,

    state: CircuitState,
    /// Consecutive failures; only consulted for the closed → open decision
    /// but incremented in every state for observability parity.
    failure_count: u64,
    /// Probe successes during the current half-open episode.
    success_count: u64,
    /// Probe calls admitted during the current half-open episode.
    half_open_calls: u64,
    /// Failed half-open episodes since the circuit last closed. Drives the
    /// backoff escalation and survives repeated open ↔ half-open cycles.
    consecutive_half_open_failures: u32,
    current_backoff_delay: Option<Duration>,
    backoff_expires_at: Option<Instant>,
    opened_at: Option<Instant>,
    opened_at_wall: Option<SystemTime>,
    last_failure_time: Option<SystemTime>,
    last_state_change: Option<DateTime<Utc>>,
    total_failures: u64,
    total_successes: u64,
}

impl<C: Clock> fmt::Debug for CircuitBreakerCore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerCore")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("failure_count", &self.failure_count)
            .field("success_count", &self.success_count)
            .field("consecutive_half_open_failures", &self.consecutive_half_open_failures)
            .finish()
    }
}

impl CircuitBreakerCore<SystemClock> {
    /// Create a breaker core with the system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreakerCore<C> {
    /// Create a breaker core with an injected clock.
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let backoff = BackoffPolicy::new(config.backoff_base_delay, config.backoff_max_delay);
        Ok(Self {
            name: name.into(),
            config,
            backoff,
            clock,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_calls: 0,
            consecutive_half_open_failures: 0,
            current_backoff_delay: None,
            backoff_expires_at: None,
            opened_at: None,
            opened_at_wall: None,
            last_failure_time: None,
            last_state_change: None,
            total_failures: 0,
            total_successes: 0,
        })
    }

    /// Breaker name, used for logging and status reporting only.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The immutable configuration this breaker was built with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call may proceed right now.
    ///
    /// Must be called immediately before each guarded operation. While open,
    /// this lazily evaluates recovery eligibility: once the recovery timeout
    /// has elapsed since the circuit opened and any probe backoff has
    /// expired, the circuit moves to half-open and the triggering call is
    /// itself admitted as the first probe. While half-open, calls are
    /// admitted until `half_open_max_calls` probes are in flight.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.recovery_eligible() {
                    self.transition_to_half_open();
                    true
                } else {
                    debug!(name = %self.name, "circuit open, rejecting call");
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_calls < self.config.half_open_max_calls {
                    self.half_open_calls += 1;
                    true
                } else {
                    debug!(name = %self.name, "half-open probe budget exhausted, rejecting call");
                    false
                }
            }
        }
    }

    /// Record a successful guarded operation.
    pub fn record_success(&mut self) {
        self.total_successes += 1;

        match self.state {
            CircuitState::Closed => {
                if self.failure_count > 0 {
                    self.failure_count = 0;
                }
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.success_threshold {
                    self.transition_to_closed();
                    info!(name = %self.name, "circuit closed after successful recovery");
                }
            }
            CircuitState::Open => {
                // Outcome of a call admitted before the circuit opened;
                // counted in totals, no transition effect.
            }
        }
    }

    /// Record a failed guarded operation.
    ///
    /// The consecutive-failure counter increments in every state so metrics
    /// stay honest, but only drives a transition while closed. A single
    /// failure while half-open reopens the circuit and escalates the probe
    /// backoff.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.total_failures += 1;
        self.last_failure_time = Some(self.clock.system_time());

        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= self.config.failure_threshold {
                    self.transition_to_open();
                    warn!(
                        name = %self.name,
                        failures = self.failure_count,
                        "circuit opened after consecutive failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.consecutive_half_open_failures =
                    self.consecutive_half_open_failures.saturating_add(1);
                let delay = self.backoff.delay_after(self.consecutive_half_open_failures);
                self.current_backoff_delay = Some(delay);
                self.backoff_expires_at = Some(self.clock.now() + delay);
                self.transition_to_open();
                warn!(
                    name = %self.name,
                    failed_recoveries = self.consecutive_half_open_failures,
                    backoff_secs = delay.as_secs_f64(),
                    "recovery probe failed, circuit reopened with backoff"
                );
            }
            CircuitState::Open => {
                // Already open; counters updated above, nothing to trip.
            }
        }
    }

    /// Force the circuit closed and clear all counters and backoff state,
    /// including the cumulative totals.
    ///
    /// Administrative override; idempotent.
    pub fn reset(&mut self) {
        self.transition_to_closed();
        self.last_failure_time = None;
        self.total_failures = 0;
        self.total_successes = 0;
        info!(name = %self.name, "circuit manually reset to closed");
    }

    /// Immutable snapshot of the current state and counters.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let wall = self.clock.system_time();

        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            half_open_calls: self.half_open_calls,
            total_failures: self.total_failures,
            total_successes: self.total_successes,
            last_failure_time: self.last_failure_time,
            opened_at: self.opened_at_wall,
            last_state_change: self.last_state_change,
            backoff: BackoffSnapshot {
                consecutive_half_open_failures: self.consecutive_half_open_failures,
                current_backoff_delay: self.current_backoff_delay,
                backoff_expires_at: self
                    .backoff_expires_at
                    .map(|deadline| deadline_to_wall(deadline, now, wall)),
            },
        }
    }

    /// Flat key/value status map for an external status API.
    pub fn status(&self) -> serde_json::Value {
        self.snapshot().to_status(&self.name, &self.config)
    }

    fn recovery_eligible(&self) -> bool {
        let Some(opened_at) = self.opened_at else {
            return false;
        };
        let now = self.clock.now();
        if now.duration_since(opened_at) < self.config.recovery_timeout {
            return false;
        }
        self.backoff_expires_at.map_or(true, |expires| now >= expires)
    }

    fn transition_to_open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(self.clock.now());
        self.opened_at_wall = Some(self.clock.system_time());
        self.success_count = 0;
        self.half_open_calls = 0;
        self.last_state_change = Some(self.wall_now());
    }

    fn transition_to_half_open(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.success_count = 0;
        // The call that triggered the transition is admitted as the first
        // probe.
        self.half_open_calls = 1;
        self.last_state_change = Some(self.wall_now());
        info!(name = %self.name, "circuit half-open, probing recovery");
    }

    fn transition_to_closed(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.half_open_calls = 0;
        self.consecutive_half_open_failures = 0;
        self.current_backoff_delay = None;
        self.backoff_expires_at = None;
        self.opened_at = None;
        self.opened_at_wall = None;
        self.last_state_change = Some(self.wall_now());
    }

    fn wall_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }
}

/// Translate a monotonic deadline into a wall-clock estimate for reporting.
fn deadline_to_wall(deadline: Instant, now: Instant, wall: SystemTime) -> SystemTime {
    match deadline.checked_duration_since(now) {
        Some(remaining) => wall + remaining,
        None => wall.checked_sub(now.duration_since(deadline)).unwrap_or(wall),
    }
}

/// Thread-safe circuit breaker.
///
/// Wraps a [`CircuitBreakerCore`] in a mutex so that concurrent callers
/// observe atomic check-then-act semantics: two simultaneous permission
/// checks during half-open cannot both be admitted past the probe budget.
/// The guarded operation itself runs outside the lock; the breaker cannot
/// force a caller to report an outcome.
///
/// Cloning is cheap and shares the underlying core. All methods are
/// non-blocking (the lock is held only for the duration of a counter
/// update), so they are safe to call from async contexts without a
/// dedicated async variant.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    core: Arc<Mutex<CircuitBreakerCore<C>>>,
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self { core: Arc::clone(&self.core) }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.lock();
        fmt::Debug::fmt(&*core, f)
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker with the system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }

    /// Create a breaker with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self { core: Arc::new(Mutex::new(default_core(name))) }
    }
}

fn default_core(name: impl Into<String>) -> CircuitBreakerCore<SystemClock> {
    // Default config always passes validation; keep the infallible path out
    // of the Result-returning constructors.
    match CircuitBreakerCore::new(name, CircuitBreakerConfig::default()) {
        Ok(core) => core,
        Err(_) => unreachable!("default circuit breaker config is valid"),
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with an injected clock.
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        Ok(Self { core: Arc::new(Mutex::new(CircuitBreakerCore::with_clock(name, config, clock)?)) })
    }

    /// Whether a call may proceed right now. See
    /// [`CircuitBreakerCore::can_execute`].
    pub fn can_execute(&self) -> bool {
        self.core.lock().can_execute()
    }

    /// Record a successful guarded operation.
    pub fn record_success(&self) {
        self.core.lock().record_success();
    }

    /// Record a failed guarded operation.
    pub fn record_failure(&self) {
        self.core.lock().record_failure();
    }

    /// Force the circuit closed and clear all counters.
    pub fn reset(&self) {
        self.core.lock().reset();
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        self.core.lock().state()
    }

    /// Breaker name.
    pub fn name(&self) -> String {
        self.core.lock().name().to_string()
    }

    /// Immutable snapshot of state and counters.
    pub fn snapshot(&self) -> BreakerSnapshot {
        self.core.lock().snapshot()
    }

    /// Flat key/value status map for an external status API.
    pub fn status(&self) -> serde_json::Value {
        self.core.lock().status()
    }
}
