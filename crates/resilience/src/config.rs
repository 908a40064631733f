//! Circuit breaker configuration.
//!
//! Configuration is immutable for the breaker's lifetime and validated at
//! construction. Validation failure is the only error this crate produces;
//! everything downstream of a valid config is infallible.

use std::time::Duration;

use thiserror::Error;

/// Configuration validation error, surfaced at breaker construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A threshold or duration failed validation.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Which constraint was violated.
        message: String,
    },
}

/// Result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunable thresholds and timeouts for a circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in closed state before the circuit opens.
    pub failure_threshold: u64,
    /// Minimum time the circuit stays open before a recovery probe is
    /// admitted.
    pub recovery_timeout: Duration,
    /// Maximum probe calls admitted during one half-open episode.
    pub half_open_max_calls: u64,
    /// Successful probes required to close the circuit from half-open.
    pub success_threshold: u64,
    /// Base delay for the exponential backoff applied after a failed probe.
    pub backoff_base_delay: Duration,
    /// Upper bound on the backoff delay.
    pub backoff_max_delay: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
            success_threshold: 2,
            backoff_base_delay: Duration::from_secs(1),
            backoff_max_delay: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// Thresholds must be at least 1 and the backoff ceiling must not be
    /// below the base delay.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.half_open_max_calls == 0 {
            return Err(ConfigError::Invalid {
                message: "half_open_max_calls must be greater than 0".to_string(),
            });
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "success_threshold must be greater than 0".to_string(),
            });
        }

        if self.backoff_max_delay < self.backoff_base_delay {
            return Err(ConfigError::Invalid {
                message: "backoff_max_delay must be at least backoff_base_delay".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    /// Consecutive failures before the circuit opens.
    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Minimum open duration before a recovery probe is admitted.
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    /// Maximum probe calls per half-open episode.
    pub fn half_open_max_calls(mut self, max_calls: u64) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    /// Successful probes required to close the circuit.
    pub fn success_threshold(mut self, threshold: u64) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Base delay for probe-failure backoff.
    pub fn backoff_base_delay(mut self, delay: Duration) -> Self {
        self.config.backoff_base_delay = delay;
        self
    }

    /// Ceiling for probe-failure backoff.
    pub fn backoff_max_delay(mut self, delay: Duration) -> Self {
        self.config.backoff_max_delay = delay;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
