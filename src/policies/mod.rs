//! Retry policies.
//!
//! This module groups the knobs that control **whether** a failed task
//! invocation is retried and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RetryPolicy`] classification (transient vs final) and limits (attempts / budget)
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! Config { retry: RetryPolicy { backoff: BackoffPolicy { jitter, .. }, .. }, .. }
//!      └─► core::runner::TaskRunner uses:
//!           - retry.execute(call, observer) around every task invocation
//!           - backoff.delay(n) to schedule the next attempt
//! ```
//!
//! ## Defaults
//! - retry network errors and `429`, nothing else; unlimited attempts within 120s.
//! - `BackoffPolicy::default()` → first=1s, factor=2.0, max=60s, jitter=Full.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::{FallbackRetry, RetryNotice, RetryPolicy};
