//! Configuration types for building policies from settings files.
//!
//! Deserializable mirrors of the policy constructors, for applications that
//! keep resilience tuning in configuration rather than code. `build()`
//! validates what the constructors would otherwise assert.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::breaker::CircuitBreaker;
use crate::timeout::{TimeoutPolicy, TimeoutStrategy};

/// Invalid policy settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failure_threshold must be at least 1")]
    ZeroThreshold,

    #[error("{field} must be a non-zero duration")]
    ZeroDuration { field: &'static str },
}

/// Settings for a [`CircuitBreaker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive handled failures required to open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open before admitting a trial call.
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate and build a breaker counting every failure. Use
    /// [`CircuitBreaker::builder`] directly when predicates or hooks are
    /// needed.
    pub fn build(&self) -> Result<CircuitBreaker, ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.break_duration.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "break_duration",
            });
        }
        Ok(CircuitBreaker::new(
            self.failure_threshold,
            self.break_duration,
        ))
    }
}

/// Settings for a [`TimeoutPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline for the guarded operation.
    pub duration: Duration,

    /// How the deadline is enforced.
    pub strategy: TimeoutStrategy,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
            strategy: TimeoutStrategy::Optimistic,
        }
    }
}

impl TimeoutConfig {
    pub fn build(&self) -> Result<TimeoutPolicy, ConfigError> {
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "duration" });
        }
        Ok(TimeoutPolicy::new(self.duration, self.strategy))
    }
}
