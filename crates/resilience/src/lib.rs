//! Circuit breaker primitives protecting the relay broadcast fan-out.
//!
//! A breaker guards one repeatedly-invoked I/O operation (for the relay,
//! publishing to the message bus that feeds the WebSocket fan-out) and
//! answers a single question: may this call proceed? Callers report success
//! or failure back, and the breaker trips open after consecutive failures,
//! fails fast while the dependency recovers, then cautiously re-admits
//! probe calls — with exponential backoff when recovery probes keep
//! failing.
//!
//! The breaker never performs, retries, or queues the guarded operation and
//! holds no timers: recovery eligibility is evaluated lazily against a
//! monotonic clock on each permission check.
//!
//! ```
//! use relay_resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("bus", CircuitBreakerConfig::default())?;
//! if breaker.can_execute() {
//!     match publish() {
//!         Ok(()) => breaker.record_success(),
//!         Err(_) => breaker.record_failure(),
//!     }
//! } else {
//!     // degrade gracefully: skip the broadcast, log a warning
//! }
//! # fn publish() -> Result<(), std::io::Error> { Ok(()) }
//! # Ok::<(), relay_resilience::ConfigError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod breaker;
pub mod clock;
pub mod config;
pub mod registry;
pub mod status;

// Re-export commonly used types for convenience
// ------------------------------
pub use backoff::BackoffPolicy;
pub use breaker::{CircuitBreaker, CircuitBreakerCore, CircuitState};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{
    CircuitBreakerConfig, CircuitBreakerConfigBuilder, ConfigError, ConfigResult,
};
pub use registry::BreakerRegistry;
pub use status::{BackoffSnapshot, BreakerSnapshot};
