//! # Policy composition (orientation)
//!
//! Chains policies into one callable pipeline. The first policy is the
//! outermost: it runs first on the way in and sees whatever failures escape
//! every layer inside it. Composition is explicit nesting — a wrap holds its
//! outer and inner halves and hands the inner one to the outer as its
//! continuation — so chains are built once, up front, and can never cycle.
//!
//! Ordering matters. Policies are not commutative: a breaker wrapped outside
//! a timeout counts expiries toward its threshold, while a timeout wrapped
//! outside a breaker bounds the whole guarded call including the breaker's
//! own fast-fail path.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::PolicyResult;
use crate::policy::{Next, Policy};

/// Two policies nested into one, outer wrapping inner.
pub struct PolicyWrap<T> {
    outer: Arc<dyn Policy<T>>,
    inner: Arc<dyn Policy<T>>,
}

impl<T> Clone for PolicyWrap<T> {
    fn clone(&self) -> Self {
        Self {
            outer: Arc::clone(&self.outer),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for PolicyWrap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyWrap").finish_non_exhaustive()
    }
}

impl<T> PolicyWrap<T>
where
    T: Send + 'static,
{
    /// Nest `inner` inside `outer`.
    pub fn new(outer: impl Policy<T> + 'static, inner: impl Policy<T> + 'static) -> Self {
        Self::from_arcs(Arc::new(outer), Arc::new(inner))
    }

    /// Nest already-shared policies, e.g. a breaker handle also kept for
    /// `isolate()`/`reset()`.
    pub fn from_arcs(outer: Arc<dyn Policy<T>>, inner: Arc<dyn Policy<T>>) -> Self {
        Self { outer, inner }
    }

    /// Wrap a further policy inside this chain, making `self` the outer part.
    pub fn wrap(self, inner: impl Policy<T> + 'static) -> PolicyWrap<T> {
        PolicyWrap {
            outer: Arc::new(self),
            inner: Arc::new(inner),
        }
    }
}

/// Fold an ordered sequence of policies into one pipeline, first outermost.
///
/// # Panics
///
/// Panics when fewer than two policies are supplied; a single policy needs
/// no wrap.
pub fn wrap_all<T, I>(policies: I) -> PolicyWrap<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Arc<dyn Policy<T>>>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut rev = policies.into_iter().rev();
    let (innermost, next_out) = match (rev.next(), rev.next()) {
        (Some(inner), Some(outer)) => (inner, outer),
        _ => panic!("wrap_all requires at least two policies"),
    };
    let mut chain = PolicyWrap {
        outer: next_out,
        inner: innermost,
    };
    for outer in rev {
        chain = PolicyWrap {
            outer,
            inner: Arc::new(chain),
        };
    }
    chain
}

#[async_trait]
impl<T> Policy<T> for PolicyWrap<T>
where
    T: Send + 'static,
{
    async fn call(&self, next: Next<T>, ctx: Context) -> PolicyResult<T> {
        let inner = Arc::clone(&self.inner);
        let inner_next: Next<T> =
            Box::new(move |ctx| Box::pin(async move { inner.call(next, ctx).await }));
        self.outer.call(inner_next, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyExt;
    use std::sync::Mutex;

    /// Probe policy recording its enter/exit points, so tests can assert the
    /// outer-to-inner delegation order.
    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl<T: Send + 'static> Policy<T> for Probe {
        async fn call(&self, next: Next<T>, ctx: Context) -> PolicyResult<T> {
            self.log.lock().unwrap().push(format!("{}_enter", self.name));
            let result = next(ctx).await;
            self.log.lock().unwrap().push(format!("{}_exit", self.name));
            result
        }
    }

    fn probe(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Policy<u32>> {
        Arc::new(Probe {
            name,
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn first_policy_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = wrap_all(vec![
            probe("outer", &log),
            probe("middle", &log),
            probe("inner", &log),
        ]);

        let result = pipeline
            .execute(|_ctx| async {
                Ok(7)
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "outer_enter",
                "middle_enter",
                "inner_enter",
                "inner_exit",
                "middle_exit",
                "outer_exit",
            ]
        );
    }

    #[tokio::test]
    async fn chained_wrap_matches_wrap_all() {
        let log_a = Arc::new(Mutex::new(Vec::new()));
        let log_b = Arc::new(Mutex::new(Vec::new()));

        let folded = wrap_all(vec![probe("1", &log_a), probe("2", &log_a), probe("3", &log_a)]);
        let chained = PolicyWrap::from_arcs(probe("1", &log_b), probe("2", &log_b))
            .wrap(Probe {
                name: "3",
                log: Arc::clone(&log_b),
            });

        folded.execute(|_ctx| async { Ok(0) }).await.unwrap();
        chained.execute(|_ctx| async { Ok(0) }).await.unwrap();
        assert_eq!(*log_a.lock().unwrap(), *log_b.lock().unwrap());
    }

    #[tokio::test]
    async fn context_reaches_the_innermost_operation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = wrap_all(vec![probe("a", &log), probe("b", &log)]);
        let ctx = Context::with("Src", "B");
        let result = pipeline
            .execute_in(ctx, |ctx| async move {
                assert_eq!(ctx.get("Src").and_then(|v| v.as_str()), Some("B"));
                Ok(1)
            })
            .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[test]
    #[should_panic(expected = "at least two policies")]
    fn wrap_all_rejects_a_single_policy() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let _ = wrap_all(vec![probe("only", &log)]);
    }
}
