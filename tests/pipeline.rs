//! End-to-end pipeline tests: composition ordering and a fan-out over
//! parallel data sources, each guarded by the same shared pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

use breakwater::{
    wrap_all, BoxError, CircuitBreaker, CircuitState, Context, FallbackPolicy, Policy, PolicyExt,
    PolicyResult, PolicyWrap, TimeoutError, TimeoutPolicy,
};

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    id: Uuid,
    subject: String,
}

impl Entry {
    fn new(subject: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
        }
    }
}

fn source_name(ctx: &Context) -> String {
    ctx.get("Src")
        .and_then(|v| v.as_str())
        .unwrap_or("?")
        .to_string()
}

/// Fallback ∘ Timeout over a slow operation substitutes a value instead of
/// propagating `TimeoutError`.
#[tokio::test]
async fn fallback_around_timeout_absorbs_the_expiry() {
    let pipeline = PolicyWrap::new(
        FallbackPolicy::builder(|_e, ctx| format!("Warning: [{}] API timeout", source_name(ctx)))
            .handle::<TimeoutError>()
            .build(),
        TimeoutPolicy::pessimistic(Duration::from_millis(20)),
    );

    let ctx = Context::with("Src", "B");
    let result = pipeline
        .execute_in(ctx, |_ctx| async {
            sleep(Duration::from_millis(200)).await;
            Ok(String::from("too late"))
        })
        .await;

    assert_eq!(result.unwrap(), "Warning: [B] API timeout");
}

/// A fallback scoped to `TimeoutError` lets other failures escape to the
/// outer, catch-all fallback — classification is per-policy.
#[tokio::test]
async fn inner_fallback_scope_defers_to_the_outer_layer() {
    let pipeline = wrap_all(vec![
        Arc::new(
            FallbackPolicy::builder(|_e, ctx| format!("Warning: [{}] API failed", source_name(ctx)))
                .handle_any()
                .build(),
        ) as Arc<dyn Policy<String>>,
        Arc::new(
            FallbackPolicy::builder(|_e, ctx| {
                format!("Warning: [{}] API timeout", source_name(ctx))
            })
            .handle::<TimeoutError>()
            .build(),
        ) as _,
        Arc::new(TimeoutPolicy::pessimistic(Duration::from_millis(20))) as _,
    ]);

    let ctx = Context::with("Src", "C");
    let result = pipeline
        .execute_in(ctx, |_ctx| async {
            let err: BoxError = Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ));
            Err(err)
        })
        .await;

    assert_eq!(result.unwrap(), "Warning: [C] API failed");
}

/// Ordering is behavior: a breaker outside the timeout counts expiries
/// toward its threshold, while a timeout outside the breaker leaves the
/// breaker blind to them.
#[tokio::test]
async fn wrapping_order_decides_whether_timeouts_trip_the_breaker() {
    async fn run_slow(pipeline: &(dyn Policy<()>)) -> PolicyResult<()> {
        pipeline
            .execute(|_ctx| async {
                sleep(Duration::from_millis(100)).await;
                Ok(())
            })
            .await
    }

    // Breaker outside timeout: expiries are handled failures.
    let breaker = CircuitBreaker::builder()
        .failure_threshold(2)
        .break_duration(Duration::from_secs(30))
        .handle::<TimeoutError>()
        .build();
    let pipeline = PolicyWrap::new(
        breaker.clone(),
        TimeoutPolicy::pessimistic(Duration::from_millis(10)),
    );
    run_slow(&pipeline).await.unwrap_err();
    run_slow(&pipeline).await.unwrap_err();
    assert_eq!(breaker.circuit_state(), CircuitState::Open);

    // Timeout outside breaker: the breaker never sees the expiry.
    let breaker = CircuitBreaker::builder()
        .failure_threshold(2)
        .break_duration(Duration::from_secs(30))
        .handle::<TimeoutError>()
        .build();
    let pipeline = PolicyWrap::new(
        TimeoutPolicy::pessimistic(Duration::from_millis(10)),
        breaker.clone(),
    );
    run_slow(&pipeline).await.unwrap_err();
    run_slow(&pipeline).await.unwrap_err();
    assert_eq!(breaker.circuit_state(), CircuitState::Closed);
}

/// The fan-out scenario: one shared pipeline guarding three external
/// sources queried in parallel, with a local row always present. The slow
/// source is substituted by the timeout fallback, the failing source by the
/// generic one.
#[tokio::test]
async fn parallel_sources_share_one_pipeline() {
    async fn call_third_party(src: &str) -> PolicyResult<Vec<Entry>> {
        match src {
            "A" => Ok(vec![
                Entry::new("Data from ExtraData[A] #1"),
                Entry::new("Data from ExtraData[A] #2"),
            ]),
            "B" => {
                sleep(Duration::from_millis(500)).await;
                Ok(vec![Entry::new("Data from ExtraData[B]")])
            }
            _ => {
                let err: BoxError =
                    Box::new(std::io::Error::new(std::io::ErrorKind::Other, "Error"));
                Err(err)
            }
        }
    }

    let pipeline: Arc<dyn Policy<Vec<Entry>>> = Arc::new(wrap_all(vec![
        Arc::new(
            FallbackPolicy::builder(|_e, ctx| {
                vec![Entry::new(format!(
                    "Warning: [{}] API failed",
                    source_name(ctx)
                ))]
            })
            .handle_any()
            .build(),
        ) as Arc<dyn Policy<Vec<Entry>>>,
        Arc::new(
            FallbackPolicy::builder(|_e, ctx| {
                vec![Entry::new(format!(
                    "Warning: [{}] API timeout",
                    source_name(ctx)
                ))]
            })
            .handle::<TimeoutError>()
            .build(),
        ) as _,
        Arc::new(TimeoutPolicy::pessimistic(Duration::from_millis(50))) as _,
    ]));

    let mut rows = vec![Entry::new("Data from local service")];
    let tasks: Vec<_> = ["A", "B", "C"]
        .into_iter()
        .map(|src| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .execute_in(Context::with("Src", src), move |_ctx| async move {
                        call_third_party(src).await
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        rows.extend(task.await.unwrap().unwrap());
    }

    let subjects: Vec<&str> = rows.iter().map(|e| e.subject.as_str()).collect();
    assert_eq!(subjects.len(), 5);
    assert!(subjects.contains(&"Data from local service"));
    assert!(subjects.contains(&"Data from ExtraData[A] #1"));
    assert!(subjects.contains(&"Warning: [B] API timeout"));
    assert!(subjects.contains(&"Warning: [C] API failed"));
}

/// Hooks observe; they never steer. A panicking-free hook chain with
/// side effects must leave results identical to a hook-free pipeline.
#[tokio::test]
async fn hooks_do_not_alter_control_flow() {
    static OBSERVED: AtomicUsize = AtomicUsize::new(0);

    let pipeline = PolicyWrap::new(
        FallbackPolicy::builder(|_e, _ctx| "substitute")
            .handle::<TimeoutError>()
            .on_fallback(|_e, _ctx| {
                OBSERVED.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
        TimeoutPolicy::optimistic(Duration::from_millis(10)).on_timeout(|_ctx, _d| {
            OBSERVED.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let result = pipeline
        .execute(|_ctx| async {
            sleep(Duration::from_millis(100)).await;
            Ok("too late")
        })
        .await;

    assert_eq!(result.unwrap(), "substitute");
    assert_eq!(OBSERVED.load(Ordering::SeqCst), 2);
}
