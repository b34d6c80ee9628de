//! Error types synthesized by the policy layers.
//!
//! Application failures travel the pipeline as [`BoxError`] so that any error
//! type can flow through unchanged; the engine only ever inspects them via
//! the classifiers in [`crate::classify`]. The types below are the failures
//! the layers themselves raise. Each is a distinct struct so that enclosing
//! policies can match on it by type — a fallback configured for
//! [`TimeoutError`] must not accidentally absorb a [`BrokenCircuitError`].

use std::time::Duration;

use thiserror::Error;

/// Boxed error channel shared by every layer in a pipeline.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type produced at each layer boundary.
pub type PolicyResult<T> = std::result::Result<T, BoxError>;

/// Raised by the timeout layer when the deadline expires before the guarded
/// operation completes.
#[derive(Debug, Error)]
#[error("operation timed out after {duration:?}")]
pub struct TimeoutError {
    /// The configured deadline that expired.
    pub duration: Duration,
}

/// Raised by an open circuit breaker instead of invoking the guarded
/// operation.
#[derive(Debug, Error)]
#[error("circuit is open; calls are failing fast (retry after {retry_after:?})")]
pub struct BrokenCircuitError {
    /// Time remaining until the breaker will admit a trial call.
    ///
    /// Zero when the rejection came from a half-open breaker whose single
    /// trial slot was already taken.
    pub retry_after: Duration,
}

/// Raised by a manually isolated circuit breaker.
///
/// Distinct from [`BrokenCircuitError`] so observers can tell "failing" from
/// "deliberately disabled".
#[derive(Debug, Error)]
#[error("circuit is isolated; calls are rejected until reset() is invoked")]
pub struct IsolatedCircuitError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings() {
        let err = TimeoutError {
            duration: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "operation timed out after 5s");

        let err = BrokenCircuitError {
            retry_after: Duration::from_secs(2),
        };
        assert!(err.to_string().contains("retry after 2s"));

        assert!(IsolatedCircuitError.to_string().contains("reset()"));
    }

    #[test]
    fn boxed_errors_downcast_to_their_type() {
        let boxed: BoxError = Box::new(IsolatedCircuitError);
        assert!(boxed.downcast_ref::<IsolatedCircuitError>().is_some());
        assert!(boxed.downcast_ref::<BrokenCircuitError>().is_none());
    }
}
