//! # Policy trait (orientation)
//!
//! A policy is a unit of execution wrapping: it receives the *continuation*
//! for the work it guards and decides whether to invoke it, short-circuit it,
//! or transform its outcome. Policies compose by nesting — see
//! [`crate::wrap`] — so the continuation handed to an outer policy is itself
//! "run the next policy in the chain", down to the innermost continuation,
//! which is the caller's real operation.
//!
//! [`Policy`] is object-safe (continuations are boxed) so chains can be built
//! from `Arc<dyn Policy<T>>` at runtime. The ergonomic entry points live on
//! [`PolicyExt`], which every policy gets for free.

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::PolicyResult;

/// The continuation a policy invokes to run the work it guards.
///
/// Boxed so that [`Policy`] stays object-safe; `'static` so a pessimistic
/// timeout can move it onto its own task.
pub type Next<T> = Box<dyn FnOnce(Context) -> BoxFuture<'static, PolicyResult<T>> + Send>;

/// A unit of execution wrapping over operations producing `T`.
#[async_trait]
pub trait Policy<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Run `next` under this policy's rules.
    ///
    /// Implementations may decline to invoke `next` at all (an open circuit
    /// fails fast), invoke it and transform its failure (a timeout converts
    /// expiry, a fallback absorbs), or pass its outcome through untouched.
    async fn call(&self, next: Next<T>, ctx: Context) -> PolicyResult<T>;
}

/// Ergonomic execution surface, implemented for every [`Policy`].
#[async_trait]
pub trait PolicyExt<T>: Policy<T>
where
    T: Send + 'static,
{
    /// Execute `op` under this policy with an empty context.
    async fn execute<F, Fut>(&self, op: F) -> PolicyResult<T>
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = PolicyResult<T>> + Send + 'static,
    {
        self.execute_in(Context::new(), op).await
    }

    /// Execute `op` under this policy, threading `ctx` through the chain.
    async fn execute_in<F, Fut>(&self, ctx: Context, op: F) -> PolicyResult<T>
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = PolicyResult<T>> + Send + 'static,
    {
        let next: Next<T> = Box::new(move |ctx| Box::pin(op(ctx)));
        self.call(next, ctx).await
    }
}

#[async_trait]
impl<T, P> PolicyExt<T> for P
where
    T: Send + 'static,
    P: Policy<T> + ?Sized,
{
}
