//! # Tower integration (orientation)
//!
//! Exposes a policy pipeline as Tower middleware, so a client service stack
//! can sit behind a breaker, timeout, and fallback like any other layer:
//!
//! ```rust,ignore
//! let guarded = ServiceBuilder::new()
//!     .layer(PolicyLayer::new(pipeline))
//!     .service(http_client);
//! ```
//!
//! The inner service is shared behind `Arc<tokio::sync::Mutex<_>>` because
//! the policy may move the call onto another task (pessimistic timeout) and
//! the returned future must not borrow `&mut self`. Requests carry no
//! execution context through this path; pair a context with the call via
//! [`PolicyExt::execute_in`] when fallbacks need per-call parameters.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tower::{Layer, Service, ServiceExt};

use crate::error::BoxError;
use crate::policy::{Policy, PolicyExt};

/// Wraps a Tower service in a policy pipeline.
pub struct PolicyLayer<T> {
    policy: Arc<dyn Policy<T>>,
}

impl<T> PolicyLayer<T>
where
    T: Send + 'static,
{
    pub fn new(policy: impl Policy<T> + 'static) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    /// Use an already-shared policy, e.g. a breaker also kept for
    /// introspection.
    pub fn from_arc(policy: Arc<dyn Policy<T>>) -> Self {
        Self { policy }
    }
}

impl<T> Clone for PolicyLayer<T> {
    fn clone(&self) -> Self {
        Self {
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<S, T> Layer<S> for PolicyLayer<T> {
    type Service = Guarded<S, T>;

    fn layer(&self, inner: S) -> Self::Service {
        Guarded {
            inner: Arc::new(tokio::sync::Mutex::new(inner)),
            policy: Arc::clone(&self.policy),
        }
    }
}

/// A Tower service whose calls run through a policy pipeline.
pub struct Guarded<S, T> {
    inner: Arc<tokio::sync::Mutex<S>>,
    policy: Arc<dyn Policy<T>>,
}

impl<S, T> Clone for Guarded<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<S, T, Req> Service<Req> for Guarded<S, T>
where
    Req: Send + 'static,
    T: Send + 'static,
    S: Service<Req, Response = T, Error = BoxError> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = T;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        // Readiness is checked inside the guarded call, once a permit exists.
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let policy = Arc::clone(&self.policy);
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            policy
                .execute(move |_ctx| async move {
                    let mut guard = inner.lock().await;
                    ServiceExt::ready(&mut *guard).await?.call(req).await
                })
                .await
        })
    }
}
