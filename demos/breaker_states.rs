//! Walk a circuit breaker through its states from the caller's point of
//! view: closed → open → half-open trials → isolate/reset overrides.
//!
//! Run with: `cargo run --example breaker_states`

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use breakwater::{BoxError, CircuitBreaker, FallbackPolicy, PolicyExt, PolicyResult, PolicyWrap};

#[derive(Debug, Error)]
#[error("break now")]
struct BreakNow;

async fn call(pipeline: &PolicyWrap<String>, fail: bool) -> String {
    pipeline
        .execute(move |_ctx| async move {
            if fail {
                Err(Box::new(BreakNow) as BoxError)
            } else {
                Ok(String::from("executed fine"))
            }
        })
        .await
        .expect("outer fallback absorbs everything")
}

fn report(breaker: &CircuitBreaker, note: &str) {
    println!("state = {} ({note})", breaker.circuit_state());
}

#[tokio::main]
async fn main() -> PolicyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let breaker = CircuitBreaker::builder()
        .failure_threshold(2)
        .break_duration(Duration::from_secs(5))
        .on_break(|e, d| println!("-- circuit broke on `{e}` for {d:?}"))
        .on_reset(|| println!("-- circuit closed again"))
        .build();
    let pipeline = PolicyWrap::new(FallbackPolicy::new(|e, _ctx| format!("fallback: {e}")), breaker.clone());

    println!("{}", call(&pipeline, false).await);
    report(&breaker, "before failures");

    println!("{}", call(&pipeline, true).await);
    report(&breaker, "1st failure");
    println!("{}", call(&pipeline, true).await);
    report(&breaker, "2nd failure, broken for 5s");

    println!("{}", call(&pipeline, false).await);
    report(&breaker, "rejected while open");

    sleep(Duration::from_secs(5)).await;
    report(&breaker, "break duration elapsed");
    println!("{}", call(&pipeline, false).await);
    report(&breaker, "trial succeeded");

    breaker.isolate();
    report(&breaker, "isolate() called");
    println!("{}", call(&pipeline, false).await);
    sleep(Duration::from_secs(2)).await;
    println!("{}", call(&pipeline, false).await);
    report(&breaker, "still isolated past the break duration");

    breaker.reset();
    report(&breaker, "reset() called");
    println!("{}", call(&pipeline, false).await);

    Ok(())
}
