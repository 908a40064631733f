//! Integration tests for the circuit breaker
//!
//! Exercises full trip/recovery cycles, backoff escalation, the registry,
//! and concurrent access through the shared wrapper.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_resilience::{
    BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState, MockClock,
};

fn fanout_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::builder()
        .failure_threshold(3)
        .recovery_timeout(Duration::from_secs(30))
        .half_open_max_calls(1)
        .success_threshold(1)
        .backoff_base_delay(Duration::from_secs(1))
        .backoff_max_delay(Duration::from_secs(60))
        .build()
        .expect("Failed to build config")
}

/// Validates the happy-path recovery cycle.
///
/// # Test Steps
/// 1. Trip the breaker with 3 consecutive failures
/// 2. Advance the clock past the 30s recovery timeout
/// 3. Verify the next permission check admits a probe and goes half-open
/// 4. Report the probe as successful
/// 5. Confirm the circuit closes with all counters cleared
#[test]
fn test_trip_then_successful_recovery() {
    let clock = MockClock::new();
    let breaker =
        CircuitBreaker::with_clock("bus", fanout_config(), clock.clone()).expect("valid config");

    for _ in 0..3 {
        assert!(breaker.can_execute());
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.can_execute());

    clock.advance_secs(31);
    assert!(breaker.can_execute());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(snapshot.opened_at, None);
    assert_eq!(snapshot.backoff.consecutive_half_open_failures, 0);
}

/// Validates the failed-recovery path and its backoff.
///
/// # Test Steps
/// 1. Trip the breaker and advance past the recovery timeout
/// 2. Admit a probe, then report it failed
/// 3. Verify the circuit reopens with a 2s backoff recorded
/// 4. Verify a permission check shortly after the reopen is rejected
/// 5. Verify the probe is admitted again once timeout and backoff both
///    elapse
#[test]
fn test_failed_probe_reopens_with_backoff() {
    let clock = MockClock::new();
    let breaker =
        CircuitBreaker::with_clock("bus", fanout_config(), clock.clone()).expect("valid config");

    for _ in 0..3 {
        breaker.record_failure();
    }
    clock.advance_secs(31);
    assert!(breaker.can_execute());

    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.backoff.consecutive_half_open_failures, 1);
    assert_eq!(snapshot.backoff.current_backoff_delay, Some(Duration::from_secs(2)));

    // Immediately after the reopen neither gate is satisfied.
    clock.advance_secs(1);
    assert!(!breaker.can_execute());
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance_secs(30);
    assert!(breaker.can_execute());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

/// Validates exponential escalation across repeated failed recoveries and
/// the full reset once a recovery finally succeeds.
#[test]
fn test_repeated_failed_recoveries_escalate_then_clear() {
    let clock = MockClock::new();
    let breaker =
        CircuitBreaker::with_clock("bus", fanout_config(), clock.clone()).expect("valid config");

    for _ in 0..3 {
        breaker.record_failure();
    }

    let expected_delays = [2.0, 4.0, 8.0, 16.0, 32.0, 60.0, 60.0];
    for delay in expected_delays {
        clock.advance_secs(120); // past timeout and any prior backoff
        assert!(breaker.can_execute());
        breaker.record_failure();
        let backoff = breaker.snapshot().backoff;
        assert_eq!(backoff.current_backoff_delay, Some(Duration::from_secs_f64(delay)));
    }
    assert_eq!(breaker.snapshot().backoff.consecutive_half_open_failures, 7);

    // A successful probe clears the escalation entirely.
    clock.advance_secs(120);
    assert!(breaker.can_execute());
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.snapshot().backoff.consecutive_half_open_failures, 0);
    assert_eq!(breaker.snapshot().backoff.current_backoff_delay, None);
}

/// Validates the status map contract consumed by the HTTP status layer.
#[test]
fn test_status_map_contract() {
    let clock = MockClock::new();
    let breaker =
        CircuitBreaker::with_clock("bus", fanout_config(), clock.clone()).expect("valid config");

    clock.advance_secs(10);
    for _ in 0..3 {
        breaker.record_failure();
    }

    let status = breaker.status();
    assert_eq!(status["name"], "bus");
    assert_eq!(status["state"], "open");
    assert_eq!(status["failure_count"], 3);
    assert_eq!(status["total_failures"], 3);
    assert!((status["opened_at"].as_f64().expect("float") - 10.0).abs() < 1e-6);
    assert!((status["last_failure_time"].as_f64().expect("float") - 10.0).abs() < 1e-6);
    assert!(status["last_state_change"].as_str().expect("string").starts_with("1970-01-01T"));
    assert_eq!(status["config"]["failure_threshold"], 3);
    assert_eq!(status["config"]["recovery_timeout"], 30.0);
    assert_eq!(status["backoff"]["consecutive_half_open_failures"], 0);
}

/// Validates that manual reset is an unconditional override from any state.
#[test]
fn test_manual_reset_from_open() {
    let breaker = CircuitBreaker::new("bus", fanout_config()).expect("valid config");

    for _ in 0..3 {
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    breaker.reset();
    breaker.reset(); // idempotent
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.can_execute());

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(snapshot.total_failures, 0);
    assert_eq!(snapshot.last_failure_time, None);
}

/// Validates atomic check-then-act under concurrent tasks.
///
/// With `half_open_max_calls = 1`, exactly one of many concurrent callers
/// may be admitted as the recovery probe; the rest must be rejected.
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_probe_admission() {
    let clock = MockClock::new();
    let breaker = CircuitBreaker::with_clock("bus", fanout_config(), clock.clone())
        .expect("valid config");

    for _ in 0..3 {
        breaker.record_failure();
    }
    clock.advance_secs(31);

    let admitted = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let breaker = breaker.clone();
        let admitted = Arc::clone(&admitted);
        handles.push(tokio::spawn(async move {
            if breaker.can_execute() {
                admitted.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

/// Validates that concurrent outcome reports keep totals consistent.
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_outcome_reporting() {
    let breaker = Arc::new(CircuitBreaker::with_defaults("bus"));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let breaker = Arc::clone(&breaker);
        handles.push(tokio::spawn(async move {
            breaker.record_success();
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    assert_eq!(breaker.snapshot().total_successes, 32);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Validates registry wiring as the composition root would use it: one
/// breaker per guarded resource, shared handles, aggregate status.
#[test]
fn test_registry_round_trip() {
    let registry = BreakerRegistry::new();

    let bus = registry.get_or_create("bus", fanout_config()).expect("valid config");
    let db = registry
        .get_or_create("db", CircuitBreakerConfig::default())
        .expect("valid config");

    for _ in 0..3 {
        bus.record_failure();
    }
    db.record_success();

    // A collaborator resolving the same name sees the tripped breaker.
    let bus_again = registry.get("bus").expect("registered");
    assert_eq!(bus_again.state(), CircuitState::Open);

    let statuses = registry.status_all();
    assert_eq!(statuses["bus"]["state"], "open");
    assert_eq!(statuses["db"]["state"], "closed");
    assert_eq!(statuses["db"]["total_successes"], 1);

    registry.reset_all();
    assert_eq!(bus.state(), CircuitState::Closed);
}
