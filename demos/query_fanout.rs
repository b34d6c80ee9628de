//! Fan out to three third-party sources in parallel, each call guarded by
//! one shared fallback → timeout-fallback → pessimistic-timeout pipeline.
//! Slow and failing sources are substituted with warning rows; the caller
//! always gets a complete result set.
//!
//! Run with: `cargo run --example query_fanout`

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

use breakwater::{wrap_all, Context, FallbackPolicy, Policy, PolicyExt, PolicyResult, TimeoutError, TimeoutPolicy};

#[derive(Debug)]
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

async fn call_third_party(src: &str, delay: Duration) -> PolicyResult<Vec<Entry>> {
    sleep(delay).await;
    Ok((1..=2)
        .map(|n| Entry::new(format!("Data from ExtraData[{src}] #{n}")))
        .collect())
}

fn source(ctx: &Context) -> String {
    ctx.get("Src")
        .and_then(|v| v.as_str())
        .unwrap_or("?")
        .to_string()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let pipeline: Arc<dyn Policy<Vec<Entry>>> = Arc::new(wrap_all(vec![
        Arc::new(
            FallbackPolicy::builder(|_e, ctx| {
                vec![Entry::new(format!("Warning: [{}] API failed", source(ctx)))]
            })
            .handle_any()
            .build(),
        ) as Arc<dyn Policy<Vec<Entry>>>,
        Arc::new(
            FallbackPolicy::builder(|_e, ctx| {
                vec![Entry::new(format!("Warning: [{}] API timeout", source(ctx)))]
            })
            .handle::<TimeoutError>()
            .build(),
        ) as _,
        Arc::new(TimeoutPolicy::pessimistic(Duration::from_secs(5))) as _,
    ]));

    let mut rows = vec![Entry::new("Data from local service")];

    let jobs: Vec<(&str, _)> = vec![
        ("SrcA", Some(Duration::from_secs(3))),
        ("SrcB", Some(Duration::from_secs(8))),
        ("SrcC", None),
    ];

    let tasks: Vec<_> = jobs
        .into_iter()
        .map(|(src, delay)| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .execute_in(Context::with("Src", src), move |_ctx| async move {
                        match delay {
                            Some(delay) => call_third_party(src, delay).await,
                            None => Err("Error".into()),
                        }
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        match task.await {
            Ok(Ok(entries)) => rows.extend(entries),
            Ok(Err(e)) => eprintln!("unrecoverable: {e}"),
            Err(e) => eprintln!("task failed: {e}"),
        }
    }

    for row in &rows {
        println!("{} {}", row.id, row.subject);
    }
}
