//! # fanvisor
//!
//! **Fanvisor** is a bounded-concurrency fan-out engine for Rust.
//!
//! It takes an unbounded stream of independent remote calls, spreads them over
//! several parallel workers that each multiplex many in-flight calls, retries
//! transient failures, and hands back the results in submission order. A
//! failure that cannot be retried stops the owning worker, cancels its
//! siblings and is reported to the caller instead of a partial result list.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller thread: start() ── enqueue(payload)* ── results()
//!            │
//!            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - sequence counter (single writer)                               │
//! │  - lane selection: sequence mod N                                 │
//! │  - Bus (broadcast events) ──► listener thread ──► SubscriberSet   │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   [lane 0]           [lane 1]     ...   [lane N-1]     bounded mpsc (backpressure)
//!        │                  │                  │
//!   ┌────▼─────────┐   ┌────▼─────────┐   ┌────▼─────────┐
//!   │   Worker 0   │   │   Worker 1   │   │  Worker N-1  │   OS thread + LocalSet
//!   │ session (Rc) │   │ session (Rc) │   │ session (Rc) │
//!   │ in-flight ≤k │   │ in-flight ≤k │   │ in-flight ≤k │   k = max_in_flight / N
//!   └────┬─────────┘   └────┬─────────┘   └────┬─────────┘
//!        │ TaskRunner × k   │                  │
//!        │ (RetryPolicy,    │                  │
//!        │  cancellation)   │                  │
//!        ▼                  ▼                  ▼
//!   BTreeMap<seq, T> | RuntimeError   (all-or-nothing per lane)
//!                           │
//!                           ▼
//!              merged and ordered by sequence
//! ```
//!
//! ### Failure path
//! ```text
//! task error ──► RetryPolicy::should_retry?
//!                  ├─ yes, budget left ─► TaskRetrying, sleep(backoff), retry
//!                  └─ no / exhausted   ─► TaskFailed
//!                                          └─► worker: cancel siblings, close lane,
//!                                              drain, WorkerFailed
//!                                              └─► stop()/results() return the error
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Engine**        | Lanes, workers, lifecycle and ordered results.               | [`Supervisor`], [`SupervisorBuilder`]       |
//! | **Tasks**         | The remote call and its per-worker session.                  | [`TaskFunction`], [`SessionProvider`]       |
//! | **Policies**      | Classification, attempt/time limits and backoff.             | [`RetryPolicy`], [`BackoffPolicy`]          |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, progress).       | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors for task invocations and for the engine.        | [`TaskError`], [`RuntimeError`]             |
//! | **Configuration** | Centralize runtime settings.                                 | [`Config`]                                  |
//! | **Caching**       | Compute-once process-wide flags.                             | [`CachedFlag`]                              |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber (renders events through `tracing`).
//!
//! ## Example
//! ```rust
//! use std::rc::Rc;
//! use std::time::Duration;
//! use fanvisor::{Config, RetryPolicy, RuntimeError, Supervisor, TaskError};
//!
//! fn main() -> Result<(), RuntimeError> {
//!     let cfg = Config {
//!         workers: 4,
//!         max_in_flight: 32,
//!         retry: RetryPolicy { max_attempts: 3, ..RetryPolicy::default() },
//!         ..Config::default()
//!     };
//!
//!     let lookup = |id: u32, _session: Rc<()>| async move {
//!         tokio::time::sleep(Duration::from_millis(1)).await;
//!         Ok::<_, TaskError>(format!("record-{id}"))
//!     };
//!
//!     let sup: Supervisor<u32, String> = Supervisor::new(cfg, lookup);
//!     let records = sup.scope(|sup| {
//!         for id in 0..100 {
//!             sup.enqueue(id)?;
//!         }
//!         Ok(())
//!     })?;
//!
//!     assert_eq!(records.len(), 100);
//!     assert_eq!(records[42], "record-42");
//!     Ok(())
//! }
//! ```
mod cache;
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use cache::CachedFlag;
pub use core::{
    Config, IN_FLIGHT_PER_WORKER, Supervisor, SupervisorBuilder, SupervisorState, WorkerState,
};
pub use error::{RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, FallbackRetry, JitterPolicy, RetryNotice, RetryPolicy};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{NoSession, SessionProvider, TaskFunction, TaskFuture, TaskResult, WorkItem};

// Optional: expose the built-in `tracing` subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
