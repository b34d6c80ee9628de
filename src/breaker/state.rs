//! Pure circuit-breaker state machine.
//!
//! No locks, no timers, no I/O: every transition is a plain method taking the
//! current instant, so the HalfOpen edge cases are unit-testable with
//! fabricated clocks. The concurrency wrapper in the parent module owns the
//! mutex and calls in here while holding it.

use std::fmt;
use std::time::{Duration, Instant};

/// Current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; calls pass through and handled failures are counted.
    Closed,
    /// Failing fast; calls are rejected until the break duration elapses.
    Open,
    /// One trial call is admitted to probe the guarded dependency.
    HalfOpen,
    /// Manually forced open; only `reset()` leaves this state.
    Isolated,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
            CircuitState::Isolated => "Isolated",
        };
        f.write_str(name)
    }
}

/// Source of the current instant, injected so tests drive time manually.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock backed by `Instant::now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Outcome of asking the machine to admit a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Permit {
    /// Invoke the operation. `trial` marks the single HalfOpen probe.
    Allowed { trial: bool },
    /// Reject without invoking; the circuit is open (or the trial slot is
    /// taken).
    RejectedOpen { retry_after: Duration },
    /// Reject without invoking; the circuit is manually isolated.
    RejectedIsolated,
}

/// State changes the wrapper reacts to (hooks, logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Opened,
    HalfOpened,
    Closed,
    Isolated,
}

#[derive(Debug)]
pub(crate) struct StateMachine {
    state: CircuitState,
    failure_threshold: u32,
    break_duration: Duration,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl StateMachine {
    pub(crate) fn new(failure_threshold: u32, break_duration: Duration) -> Self {
        debug_assert!(failure_threshold >= 1);
        Self {
            state: CircuitState::Closed,
            failure_threshold,
            break_duration,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }

    /// The raw state enum, with an expired `Open` reported as `HalfOpen`
    /// (matching what the next admitted call will observe). Read-only.
    pub(crate) fn state_at(&self, now: Instant) -> CircuitState {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened_at))
                if now.duration_since(opened_at) >= self.break_duration =>
            {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Decide whether a call may proceed, transitioning `Open → HalfOpen`
    /// when the break duration has elapsed. Trial-slot acquisition happens
    /// here, in the same step.
    pub(crate) fn try_acquire(&mut self, now: Instant) -> (Permit, Option<Transition>) {
        match self.state {
            CircuitState::Closed => (Permit::Allowed { trial: false }, None),
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| now.duration_since(at))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.break_duration {
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    (Permit::Allowed { trial: true }, Some(Transition::HalfOpened))
                } else {
                    let retry_after = self.break_duration - elapsed;
                    (Permit::RejectedOpen { retry_after }, None)
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    // Fast fail; the trial slot stays with its holder.
                    (
                        Permit::RejectedOpen {
                            retry_after: Duration::ZERO,
                        },
                        None,
                    )
                } else {
                    self.trial_in_flight = true;
                    (Permit::Allowed { trial: true }, None)
                }
            }
            CircuitState::Isolated => (Permit::RejectedIsolated, None),
        }
    }

    /// Record a successful call.
    pub(crate) fn record_success(&mut self) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.close();
                Some(Transition::Closed)
            }
            // A success reported by a call admitted before the circuit
            // opened is not evidence the dependency recovered; the trial
            // decides.
            CircuitState::Open => None,
            CircuitState::Isolated => None,
        }
    }

    /// Record a failure the breaker's classifier marked handled. Threshold
    /// crossing and the transition into `Open` happen in this one step.
    pub(crate) fn record_handled_failure(&mut self, now: Instant) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.open(now);
                    Some(Transition::Opened)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.open(now);
                Some(Transition::Opened)
            }
            CircuitState::Open => None,
            CircuitState::Isolated => None,
        }
    }

    /// Record a failure outside the breaker's handled set. Inconclusive: the
    /// state enum never changes, but the consecutive streak is broken and a
    /// trial's slot is released so the next call probes again.
    pub(crate) fn record_unhandled_failure(&mut self, trial: bool) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::HalfOpen if trial => {
                self.trial_in_flight = false;
            }
            _ => {}
        }
    }

    /// Release an admitted trial whose call never reported an outcome.
    pub(crate) fn abandon_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    /// Manual override: reject everything until `reset`.
    pub(crate) fn isolate(&mut self) -> Option<Transition> {
        if self.state == CircuitState::Isolated {
            return None;
        }
        self.state = CircuitState::Isolated;
        self.opened_at = None;
        self.trial_in_flight = false;
        Some(Transition::Isolated)
    }

    /// Manual override: back to `Closed` with the failure count cleared.
    pub(crate) fn reset(&mut self) -> Option<Transition> {
        let was_closed = self.state == CircuitState::Closed;
        self.close();
        self.consecutive_failures = 0;
        if was_closed {
            None
        } else {
            Some(Transition::Closed)
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_in_flight = false;
    }
}
