//! # Circuit breaker policy (orientation)
//!
//! Tracks consecutive handled failures against a threshold and fails fast
//! once the guarded dependency looks unhealthy. After the configured break
//! duration a single trial call probes the dependency; its outcome decides
//! whether the circuit closes again or re-opens. `isolate()` forces the
//! circuit open until `reset()`, independent of timers and failure counts.
//!
//! The state machine itself is pure and lives in [`state`]; this module owns
//! the mutex around it, the classification of outcomes, the observability
//! hooks, and the control surface. The mutex guards bookkeeping only — the
//! guarded operation always runs with no lock held.
//!
//! A breaker handle is `Clone`; clones share one state record, so the handle
//! used inside a composed pipeline and the handle kept for
//! `isolate()`/`reset()`/`circuit_state()` observe the same circuit.

mod state;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use state::{CircuitState, Clock, SystemClock};

use state::{Permit, StateMachine, Transition};

use crate::classify::{handle_any, handle_type, handle_when, ClassifierSet};
use crate::context::Context;
use crate::error::{BoxError, BrokenCircuitError, IsolatedCircuitError, PolicyResult};
use crate::policy::{Next, Policy};

type BreakHook = Arc<dyn Fn(&BoxError, Duration) + Send + Sync>;
type StateHook = Arc<dyn Fn() + Send + Sync>;

/// The circuit-breaker policy. See the module docs for the state machine.
#[derive(Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

struct Shared {
    machine: Mutex<StateMachine>,
    clock: Arc<dyn Clock>,
    handles: ClassifierSet,
    break_duration: Duration,
    last_failure: Mutex<Option<String>>,
    on_break: Option<BreakHook>,
    on_half_open: Option<StateHook>,
    on_reset: Option<StateHook>,
}

impl Shared {
    // Poisoning cannot leave the machine inconsistent (every mutation is a
    // single call into the pure state machine), so recover the data instead
    // of propagating the panic to unrelated callers.
    fn machine(&self) -> MutexGuard<'_, StateMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_failure(&self) -> MutexGuard<'_, Option<String>> {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl CircuitBreaker {
    /// A breaker counting every failure, opening after `failure_threshold`
    /// consecutive ones and staying open for `break_duration`.
    ///
    /// # Panics
    ///
    /// Panics if `failure_threshold` is zero.
    pub fn new(failure_threshold: u32, break_duration: Duration) -> Self {
        Self::builder()
            .failure_threshold(failure_threshold)
            .break_duration(break_duration)
            .build()
    }

    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::default()
    }

    /// Current state. An `Open` circuit whose break duration has elapsed
    /// reports `HalfOpen` (what the next admitted call will observe) without
    /// consuming the trial slot.
    pub fn circuit_state(&self) -> CircuitState {
        let now = self.shared.clock.now();
        self.shared.machine().state_at(now)
    }

    /// Consecutive handled failures recorded since the last reset to
    /// `Closed`.
    pub fn consecutive_failures(&self) -> u32 {
        self.shared.machine().consecutive_failures()
    }

    /// Display string of the failure that last opened the circuit, cleared
    /// when the circuit closes.
    pub fn last_failure(&self) -> Option<String> {
        self.shared.last_failure().clone()
    }

    /// Manually force the circuit open. All calls are rejected with
    /// [`IsolatedCircuitError`] until [`reset`](Self::reset), regardless of
    /// elapsed time.
    pub fn isolate(&self) {
        let transition = self.shared.machine().isolate();
        if transition.is_some() {
            warn!("circuit isolated; all calls rejected until reset()");
        }
    }

    /// Manually return the circuit to `Closed` with the failure count
    /// cleared.
    pub fn reset(&self) {
        let transition = self.shared.machine().reset();
        if transition.is_some() {
            self.shared.last_failure().take();
            info!("circuit manually reset to closed");
            if let Some(hook) = &self.shared.on_reset {
                hook();
            }
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.circuit_state())
            .field("break_duration", &self.shared.break_duration)
            .finish()
    }
}

/// Releases the HalfOpen trial slot if the admitted call's future is dropped
/// before reporting an outcome, so the breaker cannot wedge in HalfOpen.
struct TrialGuard {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for TrialGuard {
    fn drop(&mut self) {
        if self.armed {
            self.shared.machine().abandon_trial();
        }
    }
}

#[async_trait]
impl<T> Policy<T> for CircuitBreaker
where
    T: Send + 'static,
{
    async fn call(&self, next: Next<T>, ctx: Context) -> PolicyResult<T> {
        let shared = &self.shared;
        let now = shared.clock.now();
        let (permit, transition) = shared.machine().try_acquire(now);

        if transition == Some(Transition::HalfOpened) {
            info!("circuit half-open; admitting a trial call");
            if let Some(hook) = &shared.on_half_open {
                hook();
            }
        }

        let trial = match permit {
            Permit::Allowed { trial } => trial,
            Permit::RejectedOpen { retry_after } => {
                debug!(
                    operation = ctx.operation_key().unwrap_or("<unnamed>"),
                    ?retry_after,
                    "circuit open; rejecting call without invoking the operation"
                );
                return Err(BrokenCircuitError { retry_after }.into());
            }
            Permit::RejectedIsolated => {
                debug!(
                    operation = ctx.operation_key().unwrap_or("<unnamed>"),
                    "circuit isolated; rejecting call"
                );
                return Err(IsolatedCircuitError.into());
            }
        };

        let mut guard = TrialGuard {
            shared: Arc::clone(&self.shared),
            armed: trial,
        };
        let result = next(ctx).await;
        guard.armed = false;

        let transition = match &result {
            Ok(_) => shared.machine().record_success(),
            Err(error) if shared.handles.handles(error) => {
                let now = shared.clock.now();
                shared.machine().record_handled_failure(now)
            }
            Err(_) => {
                shared.machine().record_unhandled_failure(trial);
                None
            }
        };

        match transition {
            Some(Transition::Opened) => {
                // Reachable only on the Err arm.
                if let Err(error) = &result {
                    warn!(
                        error = %error,
                        break_duration = ?shared.break_duration,
                        "circuit opened; failing fast"
                    );
                    *shared.last_failure() = Some(error.to_string());
                    if let Some(hook) = &shared.on_break {
                        hook(error, shared.break_duration);
                    }
                }
            }
            Some(Transition::Closed) => {
                shared.last_failure().take();
                info!("trial call succeeded; circuit closed");
                if let Some(hook) = &shared.on_reset {
                    hook();
                }
            }
            _ => {}
        }

        result
    }
}

/// Builder for [`CircuitBreaker`].
pub struct CircuitBreakerBuilder {
    failure_threshold: u32,
    break_duration: Duration,
    handles: ClassifierSet,
    on_break: Option<BreakHook>,
    on_half_open: Option<StateHook>,
    on_reset: Option<StateHook>,
    clock: Arc<dyn Clock>,
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration: Duration::from_secs(30),
            handles: ClassifierSet::new(),
            on_break: None,
            on_half_open: None,
            on_reset: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl CircuitBreakerBuilder {
    /// Consecutive handled failures required to open the circuit. Must be at
    /// least 1.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// How long the circuit stays open before admitting a trial call.
    pub fn break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Count failures of type `E` toward the threshold.
    pub fn handle<E>(mut self) -> Self
    where
        E: std::error::Error + 'static,
    {
        self.handles.push(Arc::new(handle_type::<E>()));
        self
    }

    /// Count failures of type `E` satisfying `predicate`.
    pub fn handle_when<E, F>(mut self, predicate: F) -> Self
    where
        E: std::error::Error + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.handles.push(Arc::new(handle_when::<E, F>(predicate)));
        self
    }

    /// Count every failure toward the threshold (the default when no
    /// `handle*` call is made).
    pub fn handle_any(mut self) -> Self {
        self.handles.push(Arc::new(handle_any()));
        self
    }

    /// Hook fired when the circuit opens (threshold crossing or failed
    /// trial), with the failure and the break duration.
    pub fn on_break(mut self, hook: impl Fn(&BoxError, Duration) + Send + Sync + 'static) -> Self {
        self.on_break = Some(Arc::new(hook));
        self
    }

    /// Hook fired when an expired circuit admits its trial call.
    pub fn on_half_open(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_half_open = Some(Arc::new(hook));
        self
    }

    /// Hook fired when the circuit returns to `Closed`, via a successful
    /// trial or [`CircuitBreaker::reset`].
    pub fn on_reset(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reset = Some(Arc::new(hook));
        self
    }

    /// Replace the time source. Production uses [`SystemClock`]; tests
    /// inject a manually advanced clock.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// # Panics
    ///
    /// Panics if `failure_threshold` is zero.
    pub fn build(self) -> CircuitBreaker {
        assert!(
            self.failure_threshold >= 1,
            "failure_threshold must be at least 1"
        );
        let handles = if self.handles.is_empty() {
            ClassifierSet::new().with(Arc::new(handle_any()))
        } else {
            self.handles
        };
        CircuitBreaker {
            shared: Arc::new(Shared {
                machine: Mutex::new(StateMachine::new(
                    self.failure_threshold,
                    self.break_duration,
                )),
                clock: self.clock,
                handles,
                break_duration: self.break_duration,
                last_failure: Mutex::new(None),
                on_break: self.on_break,
                on_half_open: self.on_half_open,
                on_reset: self.on_reset,
            }),
        }
    }
}
