//! # Timeout policy (orientation)
//!
//! Bounds how long a guarded operation may run. On expiry the policy raises
//! [`TimeoutError`], a distinct type that enclosing policies can match on —
//! a fallback configured with `handle::<TimeoutError>()` turns a slow call
//! into a substituted result, and a breaker wrapped outside the timeout
//! counts expiries toward its threshold.
//!
//! Two strategies, mirroring the two ways async work can be cut short:
//!
//! - [`TimeoutStrategy::Optimistic`] awaits the operation under a deadline
//!   and drops its future on expiry. Dropping is async Rust's cooperative
//!   cancellation: the operation stops at its next await point.
//! - [`TimeoutStrategy::Pessimistic`] spawns the operation onto its own task
//!   and races it against the deadline. On expiry the caller gets the
//!   timeout immediately while the task keeps running detached; its eventual
//!   result is discarded. The task is abandoned, never aborted — resource
//!   cleanup of the abandoned call is the operation's own responsibility.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::Context;
use crate::error::{PolicyResult, TimeoutError};
use crate::policy::{Next, Policy};

type TimeoutHook = Arc<dyn Fn(&Context, Duration) + Send + Sync>;

/// How the deadline is enforced against the guarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeoutStrategy {
    /// Await under the deadline; drop the operation's future on expiry.
    Optimistic,
    /// Race a detached task against the deadline; abandon it on expiry.
    Pessimistic,
}

/// Bounds an operation's execution time.
pub struct TimeoutPolicy {
    duration: Duration,
    strategy: TimeoutStrategy,
    on_timeout: Option<TimeoutHook>,
}

impl TimeoutPolicy {
    pub fn new(duration: Duration, strategy: TimeoutStrategy) -> Self {
        Self {
            duration,
            strategy,
            on_timeout: None,
        }
    }

    /// Shortcut for [`TimeoutStrategy::Optimistic`].
    pub fn optimistic(duration: Duration) -> Self {
        Self::new(duration, TimeoutStrategy::Optimistic)
    }

    /// Shortcut for [`TimeoutStrategy::Pessimistic`].
    pub fn pessimistic(duration: Duration) -> Self {
        Self::new(duration, TimeoutStrategy::Pessimistic)
    }

    /// Observability hook fired once per expiry. Never affects control flow.
    pub fn on_timeout(mut self, hook: impl Fn(&Context, Duration) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(hook));
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn strategy(&self) -> TimeoutStrategy {
        self.strategy
    }

    fn expired(&self, ctx: &Context) -> TimeoutError {
        warn!(
            operation = ctx.operation_key().unwrap_or("<unnamed>"),
            timeout = ?self.duration,
            strategy = ?self.strategy,
            "guarded operation timed out"
        );
        if let Some(hook) = &self.on_timeout {
            hook(ctx, self.duration);
        }
        TimeoutError {
            duration: self.duration,
        }
    }
}

impl fmt::Debug for TimeoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutPolicy")
            .field("duration", &self.duration)
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[async_trait]
impl<T> Policy<T> for TimeoutPolicy
where
    T: Send + 'static,
{
    async fn call(&self, next: Next<T>, ctx: Context) -> PolicyResult<T> {
        match self.strategy {
            TimeoutStrategy::Optimistic => {
                match tokio::time::timeout(self.duration, next(ctx.clone())).await {
                    Ok(result) => result,
                    Err(_) => Err(self.expired(&ctx).into()),
                }
            }
            TimeoutStrategy::Pessimistic => {
                let task = tokio::spawn(next(ctx.clone()));
                match tokio::time::timeout(self.duration, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join)) => {
                        if join.is_panic() {
                            std::panic::resume_unwind(join.into_panic());
                        }
                        Err(Box::new(join))
                    }
                    // Deadline first: drop the JoinHandle, detaching the task.
                    Err(_) => Err(self.expired(&ctx).into()),
                }
            }
        }
    }
}
