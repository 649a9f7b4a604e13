//! # Example: flaky_retry
//!
//! Shows how [`RetryPolicy`] classifies errors and what the caller sees.
//!
//! Two runs over the same flaky endpoint:
//! 1. Connection resets on the first two attempts of every item: retried
//!    transparently, the run succeeds.
//! 2. Item #3 answers `404`: not retried, its worker cancels the rest of its
//!    lane and `results()` reports the failure.
//!
//! ## Flow
//! ```text
//! attempt 1 ── Network ──► retry (backoff)
//! attempt 2 ── Network ──► retry (backoff)
//! attempt 3 ── Ok      ──► value
//!
//! item #3  ── Status 404 ──► TaskFailed ──► cancel siblings ──► Err(RuntimeError::TaskFailed)
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example flaky_retry
//! ```

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fanvisor::{BackoffPolicy, Config, RetryPolicy, RuntimeError, Supervisor, TaskError};

fn config() -> Config {
    Config {
        workers: 2,
        max_in_flight: 4,
        progress_every: 0,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: BackoffPolicy {
                first: Duration::from_millis(20),
                ..BackoffPolicy::default()
            },
            ..RetryPolicy::default()
        },
        ..Config::default()
    }
}

fn run(missing: Option<u32>) -> Result<Vec<String>, RuntimeError> {
    let attempts: Arc<Mutex<HashMap<u32, u32>>> = Arc::default();
    let flaky = move |id: u32, _: Rc<()>| {
        let attempt = {
            let mut map = attempts.lock().unwrap_or_else(|e| e.into_inner());
            let n = map.entry(id).or_insert(0);
            *n += 1;
            *n
        };
        async move {
            if Some(id) == missing {
                println!("[flaky] #{id} -> 404");
                return Err(TaskError::status(404, format!("item {id} not found")));
            }
            if attempt < 3 {
                println!("[flaky] #{id} attempt {attempt} -> connection reset");
                return Err(TaskError::network("connection reset by peer"));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(format!("item-{id}"))
        }
    };

    let sup: Supervisor<u32, String> = Supervisor::new(config(), flaky);
    sup.scope(|sup| {
        for id in 0..8 {
            sup.enqueue(id)?;
        }
        Ok(())
    })
}

fn main() {
    match run(None) {
        Ok(items) => println!("[main] run 1 ok: {items:?}"),
        Err(e) => println!("[main] run 1 failed: {e}"),
    }

    match run(Some(3)) {
        Ok(items) => println!("[main] run 2 unexpectedly ok: {items:?}"),
        Err(e) => println!("[main] run 2 failed as expected: {e} ({})", e.as_label()),
    }
}
