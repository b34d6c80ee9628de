//! # Fallback policy (orientation)
//!
//! Catches a classified failure escaping the layers it wraps and substitutes
//! a computed replacement result. A success passes through unchanged; a
//! failure the policy does not handle propagates unchanged. The handler
//! receives the failure and the call's execution context, which is how a
//! caller parameterizes the substitute ("which source was I querying?").

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::classify::{handle_any, handle_type, handle_when, ClassifierSet};
use crate::context::Context;
use crate::error::{BoxError, PolicyResult};
use crate::policy::{Next, Policy};

type Handler<T> = Arc<dyn Fn(&BoxError, &Context) -> T + Send + Sync>;
type FallbackHook = Arc<dyn Fn(&BoxError, &Context) + Send + Sync>;

/// Substitutes a computed value for an absorbed failure.
pub struct FallbackPolicy<T> {
    handles: ClassifierSet,
    handler: Handler<T>,
    on_fallback: Option<FallbackHook>,
}

impl<T> Clone for FallbackPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            handles: self.handles.clone(),
            handler: Arc::clone(&self.handler),
            on_fallback: self.on_fallback.clone(),
        }
    }
}

impl<T> fmt::Debug for FallbackPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("handles", &self.handles)
            .field("has_on_fallback", &self.on_fallback.is_some())
            .finish()
    }
}

impl<T> FallbackPolicy<T>
where
    T: Send + 'static,
{
    /// A fallback absorbing every failure, like the builder default.
    pub fn new(handler: impl Fn(&BoxError, &Context) -> T + Send + Sync + 'static) -> Self {
        Self::builder(handler).build()
    }

    /// Start building a fallback around `handler`.
    pub fn builder(
        handler: impl Fn(&BoxError, &Context) -> T + Send + Sync + 'static,
    ) -> FallbackPolicyBuilder<T> {
        FallbackPolicyBuilder {
            handles: ClassifierSet::new(),
            handler: Arc::new(handler),
            on_fallback: None,
        }
    }
}

/// Builder for [`FallbackPolicy`].
pub struct FallbackPolicyBuilder<T> {
    handles: ClassifierSet,
    handler: Handler<T>,
    on_fallback: Option<FallbackHook>,
}

impl<T> FallbackPolicyBuilder<T>
where
    T: Send + 'static,
{
    /// Absorb failures of type `E`.
    pub fn handle<E>(mut self) -> Self
    where
        E: std::error::Error + 'static,
    {
        self.handles.push(Arc::new(handle_type::<E>()));
        self
    }

    /// Absorb failures of type `E` satisfying `predicate`.
    pub fn handle_when<E, F>(mut self, predicate: F) -> Self
    where
        E: std::error::Error + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.handles.push(Arc::new(handle_when::<E, F>(predicate)));
        self
    }

    /// Absorb every failure.
    pub fn handle_any(mut self) -> Self {
        self.handles.push(Arc::new(handle_any()));
        self
    }

    /// Observability hook fired exactly once per absorbed failure, before the
    /// handler runs. Never affects control flow.
    pub fn on_fallback(mut self, hook: impl Fn(&BoxError, &Context) + Send + Sync + 'static) -> Self {
        self.on_fallback = Some(Arc::new(hook));
        self
    }

    /// Finish the policy. With no `handle*` calls the fallback absorbs every
    /// failure.
    pub fn build(self) -> FallbackPolicy<T> {
        let handles = if self.handles.is_empty() {
            ClassifierSet::new().with(Arc::new(handle_any()))
        } else {
            self.handles
        };
        FallbackPolicy {
            handles,
            handler: self.handler,
            on_fallback: self.on_fallback,
        }
    }
}

#[async_trait]
impl<T> Policy<T> for FallbackPolicy<T>
where
    T: Send + 'static,
{
    async fn call(&self, next: Next<T>, ctx: Context) -> PolicyResult<T> {
        match next(ctx.clone()).await {
            Ok(value) => Ok(value),
            Err(error) if self.handles.handles(&error) => {
                debug!(
                    operation = ctx.operation_key().unwrap_or("<unnamed>"),
                    error = %error,
                    "absorbing failure with fallback value"
                );
                if let Some(hook) = &self.on_fallback {
                    hook(&error, &ctx);
                }
                Ok((self.handler)(&error, &ctx))
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeoutError;
    use crate::policy::PolicyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn io_err() -> BoxError {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
    }

    #[tokio::test]
    async fn success_passes_through_unchanged() {
        let policy = FallbackPolicy::new(|_e, _ctx| "substitute");
        let result = policy.execute(|_ctx| async { Ok("real") }).await;
        assert_eq!(result.unwrap(), "real");
    }

    #[tokio::test]
    async fn handled_failure_is_absorbed() {
        let policy = FallbackPolicy::builder(|e, _ctx| format!("fallback: {e}"))
            .handle::<std::io::Error>()
            .build();
        let result = policy.execute(|_ctx| async { Err(io_err()) }).await;
        assert_eq!(result.unwrap(), "fallback: boom");
    }

    #[tokio::test]
    async fn unhandled_failure_propagates_unchanged() {
        let policy = FallbackPolicy::builder(|_e, _ctx| String::from("substitute"))
            .handle::<TimeoutError>()
            .build();
        let result = policy.execute(|_ctx| async { Err(io_err()) }).await;
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<std::io::Error>().is_some());
    }

    #[tokio::test]
    async fn handler_reads_the_context() {
        let policy = FallbackPolicy::new(|_e, ctx| {
            format!(
                "Warning: [{}] API failed",
                ctx.get("Src").and_then(|v| v.as_str()).unwrap_or("?")
            )
        });
        let ctx = Context::with("Src", "C");
        let result = policy.execute_in(ctx, |_ctx| async { Err(io_err()) }).await;
        assert_eq!(result.unwrap(), "Warning: [C] API failed");
    }

    #[tokio::test]
    async fn on_fallback_fires_once_per_absorbed_failure() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        let policy = FallbackPolicy::builder(|_e, _ctx| ())
            .handle::<std::io::Error>()
            .on_fallback(|_e, _ctx| {
                FIRED.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let absorbed = policy.execute(|_ctx| async { Err(io_err()) }).await;
        assert!(absorbed.is_ok());
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);

        let passed = policy.execute(|_ctx| async { Ok(()) }).await;
        assert!(passed.is_ok());
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);

        let unhandled = policy
            .execute(|_ctx| async {
                let err: BoxError = Box::new(TimeoutError {
                    duration: Duration::from_secs(1),
                });
                Err(err)
            })
            .await;
        assert!(unhandled.is_err());
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
    }
}
