//! # Breakwater
//!
//! Composable resilience policies for async Rust. Guard calls to unreliable
//! operations (remote APIs, slow services) with circuit breaking, bounded
//! timeouts, and fallback substitution, and compose the guards into one
//! pipeline where the outermost policy sees only what escapes every layer
//! inside it.
//!
//! ## Core concepts
//!
//! - **Policy**: a unit of execution wrapping implementing [`Policy`]. Built
//!   once with immutable configuration, reused across many calls.
//! - **Classification**: each reactive policy carries predicates deciding
//!   which failures it handles; everything else passes through untouched.
//! - **Composition**: [`PolicyWrap`] nests policies explicitly, first policy
//!   outermost. Order is behavior: breaker-outside-timeout counts expiries
//!   toward the breaker, timeout-outside-breaker does not.
//! - **Context**: a per-call [`Context`] bag threaded down the chain, read by
//!   fallback handlers to parameterize their substitute values.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use breakwater::{CircuitBreaker, FallbackPolicy, PolicyExt, PolicyWrap, TimeoutPolicy};
//!
//! # async fn example() -> Result<(), breakwater::BoxError> {
//! let breaker = CircuitBreaker::new(2, Duration::from_secs(5));
//! let fallback = FallbackPolicy::builder(|_err, ctx| {
//!     format!(
//!         "Warning: [{}] API failed",
//!         ctx.get("Src").and_then(|v| v.as_str()).unwrap_or("?")
//!     )
//! })
//! .handle_any()
//! .build();
//!
//! // First policy outermost: fallback sees whatever escapes the layers inside.
//! let pipeline = PolicyWrap::new(fallback, breaker.clone())
//!     .wrap(TimeoutPolicy::pessimistic(Duration::from_secs(5)));
//!
//! let ctx = breakwater::Context::with("Src", "A");
//! let result = pipeline
//!     .execute_in(ctx, |_ctx| async {
//!         // call the unreliable dependency here
//!         Ok(String::from("data"))
//!     })
//!     .await?;
//!
//! println!("{result}, breaker is {}", breaker.circuit_state());
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod layer;
pub mod policy;
pub mod timeout;
pub mod wrap;

pub use breaker::{CircuitBreaker, CircuitBreakerBuilder, CircuitState, Clock, SystemClock};
pub use classify::{handle_any, handle_type, handle_when, ClassifierSet, ErrorClassifier};
pub use config::{CircuitBreakerConfig, ConfigError, TimeoutConfig};
pub use context::{Context, ContextBuilder};
pub use error::{BoxError, BrokenCircuitError, IsolatedCircuitError, PolicyResult, TimeoutError};
pub use fallback::{FallbackPolicy, FallbackPolicyBuilder};
pub use layer::{Guarded, PolicyLayer};
pub use policy::{Next, Policy, PolicyExt};
pub use timeout::{TimeoutPolicy, TimeoutStrategy};
pub use wrap::{wrap_all, PolicyWrap};
