//! # Failure classification (orientation)
//!
//! Every reactive policy carries an ordered set of matchers deciding which
//! failures it "handles". A circuit breaker only counts handled failures
//! toward its threshold; a fallback only absorbs handled failures. The same
//! failure can be handled by an inner policy and unhandled by an outer one —
//! classification is strictly per-policy and has no side effects.
//!
//! Matchers are plain predicate objects built at policy construction time:
//! [`handle_type`] matches a concrete error type, [`handle_when`] refines a
//! type match with a value predicate, [`handle_any`] matches everything.

use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::BoxError;

/// Decides whether a raised failure matches a policy's handled set.
pub trait ErrorClassifier: Send + Sync {
    /// Returns `true` when the policy should treat `error` as handled.
    fn handles(&self, error: &BoxError) -> bool;
}

/// Matches failures that downcast to the error type `E`.
pub struct HandleType<E> {
    _marker: PhantomData<fn() -> E>,
}

/// Build a matcher for the concrete error type `E`.
pub fn handle_type<E>() -> HandleType<E>
where
    E: Error + 'static,
{
    HandleType {
        _marker: PhantomData,
    }
}

impl<E> ErrorClassifier for HandleType<E>
where
    E: Error + 'static,
{
    fn handles(&self, error: &BoxError) -> bool {
        error.downcast_ref::<E>().is_some()
    }
}

/// Matches failures of type `E` that also satisfy a value predicate.
pub struct HandleWhen<E, F> {
    predicate: F,
    _marker: PhantomData<fn() -> E>,
}

/// Build a matcher for type `E` refined by `predicate`.
pub fn handle_when<E, F>(predicate: F) -> HandleWhen<E, F>
where
    E: Error + 'static,
    F: Fn(&E) -> bool + Send + Sync,
{
    HandleWhen {
        predicate,
        _marker: PhantomData,
    }
}

impl<E, F> ErrorClassifier for HandleWhen<E, F>
where
    E: Error + 'static,
    F: Fn(&E) -> bool + Send + Sync,
{
    fn handles(&self, error: &BoxError) -> bool {
        error
            .downcast_ref::<E>()
            .map_or(false, |e| (self.predicate)(e))
    }
}

/// Matches every failure.
pub struct HandleAny;

/// Build a matcher that accepts every failure.
pub fn handle_any() -> HandleAny {
    HandleAny
}

impl ErrorClassifier for HandleAny {
    fn handles(&self, _error: &BoxError) -> bool {
        true
    }
}

/// An ordered set of matchers owned by one policy.
///
/// A failure is handled if any matcher accepts it; an empty set handles
/// nothing. Policies that are constructed without explicit matchers install
/// [`HandleAny`] themselves, so an empty set only occurs when deliberately
/// built that way.
#[derive(Clone, Default)]
pub struct ClassifierSet {
    matchers: Vec<Arc<dyn ErrorClassifier>>,
}

impl ClassifierSet {
    /// An empty set that handles nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a matcher, preserving insertion order.
    pub fn push(&mut self, matcher: Arc<dyn ErrorClassifier>) {
        self.matchers.push(matcher);
    }

    /// Append a matcher, builder style.
    pub fn with(mut self, matcher: Arc<dyn ErrorClassifier>) -> Self {
        self.push(matcher);
        self
    }

    /// True when no matcher has been installed.
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Classify `error` against every matcher in order.
    pub fn handles(&self, error: &BoxError) -> bool {
        self.matchers.iter().any(|m| m.handles(error))
    }
}

impl fmt::Debug for ClassifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierSet")
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BrokenCircuitError, TimeoutError};
    use std::time::Duration;

    fn timeout_err() -> BoxError {
        Box::new(TimeoutError {
            duration: Duration::from_secs(1),
        })
    }

    fn broken_err() -> BoxError {
        Box::new(BrokenCircuitError {
            retry_after: Duration::from_secs(1),
        })
    }

    #[test]
    fn type_matcher_is_exact() {
        let matcher = handle_type::<TimeoutError>();
        assert!(matcher.handles(&timeout_err()));
        assert!(!matcher.handles(&broken_err()));
    }

    #[test]
    fn when_matcher_applies_value_predicate() {
        let matcher =
            handle_when::<TimeoutError, _>(|e| e.duration >= Duration::from_secs(5));
        let short: BoxError = Box::new(TimeoutError {
            duration: Duration::from_secs(1),
        });
        let long: BoxError = Box::new(TimeoutError {
            duration: Duration::from_secs(10),
        });
        assert!(!matcher.handles(&short));
        assert!(matcher.handles(&long));
        assert!(!matcher.handles(&broken_err()));
    }

    #[test]
    fn any_matcher_accepts_everything() {
        assert!(handle_any().handles(&timeout_err()));
        assert!(handle_any().handles(&broken_err()));
    }

    #[test]
    fn empty_set_handles_nothing() {
        let set = ClassifierSet::new();
        assert!(set.is_empty());
        assert!(!set.handles(&timeout_err()));
    }

    #[test]
    fn set_accepts_when_any_matcher_accepts() {
        let set = ClassifierSet::new()
            .with(Arc::new(handle_type::<TimeoutError>()))
            .with(Arc::new(handle_type::<BrokenCircuitError>()));
        assert!(set.handles(&timeout_err()));
        assert!(set.handles(&broken_err()));

        let io: BoxError = Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            "connection reset",
        ));
        assert!(!set.handles(&io));
    }
}
