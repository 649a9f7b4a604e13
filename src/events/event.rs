//! # Runtime events emitted by the supervisor, workers and task runners.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Engine lifecycle**: supervisor and worker state transitions
//! - **Task events**: retries, final failures, cancellations, progress
//! - **Subscriber events**: overflow and panics inside subscribers
//!
//! The [`Event`] struct carries optional metadata (worker index, item
//! sequence, attempt, delay, reason).
//!
//! ## Ordering guarantees
//! Each event has a process-wide `seq` that increases monotonically. Events
//! published by different worker threads may be delivered out of order; sort
//! by `seq` to restore it.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use fanvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskRetrying)
//!     .with_worker(1)
//!     .with_sequence(42)
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(250))
//!     .with_reason("status 429: slow down");
//!
//! assert_eq!(ev.kind, EventKind::TaskRetrying);
//! assert_eq!(ev.sequence, Some(42));
//! assert_eq!(ev.delay_ms, Some(250));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Supervisor ===
    /// All workers were launched.
    ///
    /// Sets: `workers`.
    SupervisorStarted,

    /// Every worker reached `Stopped`.
    ///
    /// Sets: `completed` (number of items enqueued), `reason` on failure.
    SupervisorStopped,

    // === Workers ===
    /// Worker opened its session and entered `Running`.
    ///
    /// Sets: `worker`.
    WorkerStarted,

    /// Worker received the terminal sentinel and waits for in-flight tasks.
    ///
    /// Sets: `worker`, `completed` (tasks still in flight).
    WorkerDraining,

    /// Worker finished normally.
    ///
    /// Sets: `worker`, `completed` (results produced).
    WorkerStopped,

    /// Worker terminated with a fatal error.
    ///
    /// Sets: `worker`, `sequence` (if task-related), `reason`.
    WorkerFailed,

    // === Tasks ===
    /// A transient failure will be retried.
    ///
    /// Sets: `worker`, `sequence`, `attempt`, `delay_ms`, `reason`.
    TaskRetrying,

    /// A task failed finally; siblings in the same worker are being cancelled.
    ///
    /// Sets: `worker`, `sequence`, `reason`.
    TaskFailed,

    /// A task was cancelled because a sibling failed.
    ///
    /// Sets: `worker`, `sequence`.
    TaskCanceled,

    /// Periodic progress marker.
    ///
    /// Sets: `worker`, `sequence` (the completed item).
    Progress,

    // === Subscribers ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (subscriber name and panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (subscriber name and cause).
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker (lane) index.
    pub worker: Option<usize>,
    /// Work item sequence number.
    pub sequence: Option<u64>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay before the next attempt in milliseconds.
    pub delay_ms: Option<u32>,
    /// Number of workers launched.
    pub workers: Option<usize>,
    /// Lifecycle counter: items enqueued (`SupervisorStopped`), tasks still
    /// in flight (`WorkerDraining`) or results produced (`WorkerStopped`).
    pub completed: Option<u64>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            sequence: None,
            attempt: None,
            delay_ms: None,
            workers: None,
            completed: None,
            reason: None,
        }
    }

    /// Attaches a worker index.
    #[inline]
    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attaches a work item sequence number.
    #[inline]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches the number of workers.
    #[inline]
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    /// Attaches a lifecycle counter.
    #[inline]
    pub fn with_completed(mut self, n: u64) -> Self {
        self.completed = Some(n);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }
}
