//! # Example: point_lookup
//!
//! Fans 2 000 coordinate lookups out over 4 workers against a simulated
//! point API. Each worker opens one authenticated client (its session), the
//! API occasionally rate-limits (`429`), and the built-in [`LogWriter`]
//! renders retries and progress through `tracing`.
//!
//! ## Flow
//! ```text
//! main thread
//!   ├─► SupervisorBuilder::new(cfg, lookup).with_sessions(ApiClients).with_subscribers([LogWriter])
//!   ├─► scope(|sup| enqueue(point) × 2000)
//!   │       └─► lane = seq mod 4 ──► worker ──► lookup(point, client)
//!   │                                         ├─ 429 ─► TaskRetrying, backoff, retry
//!   │                                         └─ ok  ─► value (Progress every 250)
//!   └─► ordered Vec<Reading>
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=fanvisor=info cargo run --example point_lookup --features logging
//! ```

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanvisor::{
    BackoffPolicy, Config, JitterPolicy, LogWriter, RetryPolicy, SessionProvider, Subscribe,
    Supervisor, SupervisorBuilder, TaskError,
};
use rand::Rng;
use tracing_subscriber::EnvFilter;

const DATASET: &str = "drought-risk-projections-v1";

#[derive(Clone, Copy, Debug)]
struct Point {
    lat: f64,
    lon: f64,
}

#[derive(Debug)]
struct Reading {
    point: Point,
    score: f64,
}

/// Authenticated client owned by one worker.
struct ApiClient {
    worker: usize,
    token: String,
}

impl ApiClient {
    async fn get_point(&self, dataset: &str, p: Point) -> Result<f64, TaskError> {
        let (latency, throttled) = {
            let mut rng = rand::rng();
            (rng.random_range(2..15), rng.random_bool(0.02))
        };
        tokio::time::sleep(Duration::from_millis(latency)).await;

        if throttled {
            return Err(TaskError::status(
                429,
                format!("{} throttled on worker {}", self.token, self.worker),
            ));
        }
        if !(-90.0..=90.0).contains(&p.lat) {
            return Err(TaskError::status(400, format!("{dataset}: latitude out of range")));
        }
        Ok((p.lat.abs() * 7.0 + p.lon.abs() * 3.0) % 100.0)
    }
}

struct ApiClients;

#[async_trait(?Send)]
impl SessionProvider for ApiClients {
    type Session = ApiClient;

    async fn open(&self, worker: usize) -> Result<ApiClient, TaskError> {
        // Token exchange would happen here.
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(ApiClient {
            worker,
            token: format!("token-{worker}"),
        })
    }

    async fn close(&self, worker: usize, client: ApiClient) {
        println!("[clients] worker {worker} closed {}", client.token);
    }
}

fn random_points(n: usize) -> Vec<Point> {
    let mut rng = rand::rng();
    (0..n)
        .map(|_| Point {
            lat: rng.random_range(49.9..59.5),
            lon: rng.random_range(-8.2..1.8),
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fanvisor=info")),
        )
        .init();

    let cfg = Config {
        workers: 4,
        max_in_flight: 64,
        max_queue_size: 200,
        progress_every: 250,
        retry: RetryPolicy {
            max_attempts: 5,
            budget: Duration::from_secs(30),
            backoff: BackoffPolicy {
                first: Duration::from_millis(50),
                max: Duration::from_secs(1),
                factor: 2.0,
                jitter: JitterPolicy::Equal,
            },
            ..RetryPolicy::default()
        },
        ..Config::default()
    };

    let lookup = |p: Point, client: Rc<ApiClient>| async move {
        let score = client.get_point(DATASET, p).await?;
        Ok::<_, TaskError>(Reading { point: p, score })
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup: Supervisor<Point, Reading> = SupervisorBuilder::new(cfg, lookup)
        .with_sessions(ApiClients)
        .with_subscribers(subs)
        .build();

    let points = random_points(2_000);
    let readings = sup.scope(|sup| {
        for p in &points {
            sup.enqueue(*p)?;
        }
        Ok(())
    })?;

    let mean = readings.iter().map(|r| r.score).sum::<f64>() / readings.len() as f64;
    println!("[main] {} readings, mean score {mean:.2}", readings.len());
    if let Some(first) = readings.first() {
        println!(
            "[main] first: ({:.3}, {:.3}) -> {:.2}",
            first.point.lat, first.point.lon, first.score
        );
    }
    Ok(())
}
