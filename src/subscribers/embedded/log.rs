//! # LogWriter: events to `tracing`
//!
//! Renders every [`Event`] as a structured `tracing` record under the
//! `fanvisor` target. Retries and progress are `info`, failures `warn`/`error`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO fanvisor: worker started worker=0
//! INFO fanvisor: retrying task worker=0 sequence=12 attempt=1 delay_ms=840 reason="status 429: slow down"
//! INFO fanvisor: finished task worker=1 sequence=100
//! WARN fanvisor: task failed worker=2 sequence=57 reason="status 400: bad request"
//! INFO fanvisor: worker draining worker=0 in_flight=37
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::SupervisorStarted => {
                info!(target: "fanvisor", workers = ?e.workers, "supervisor started");
            }
            EventKind::SupervisorStopped => {
                info!(target: "fanvisor", enqueued = ?e.completed, reason, "supervisor stopped");
            }
            EventKind::WorkerStarted => {
                info!(target: "fanvisor", worker = ?e.worker, "worker started");
            }
            EventKind::WorkerDraining => {
                info!(target: "fanvisor", worker = ?e.worker, in_flight = ?e.completed, "worker draining");
            }
            EventKind::WorkerStopped => {
                info!(target: "fanvisor", worker = ?e.worker, results = ?e.completed, "worker stopped");
            }
            EventKind::WorkerFailed => {
                error!(target: "fanvisor", worker = ?e.worker, sequence = ?e.sequence, reason, "worker failed");
            }
            EventKind::TaskRetrying => {
                info!(
                    target: "fanvisor",
                    worker = ?e.worker,
                    sequence = ?e.sequence,
                    attempt = ?e.attempt,
                    delay_ms = ?e.delay_ms,
                    reason,
                    "retrying task"
                );
            }
            EventKind::TaskFailed => {
                warn!(target: "fanvisor", worker = ?e.worker, sequence = ?e.sequence, reason, "task failed");
            }
            EventKind::TaskCanceled => {
                debug!(target: "fanvisor", worker = ?e.worker, sequence = ?e.sequence, "task canceled");
            }
            EventKind::Progress => {
                info!(target: "fanvisor", worker = ?e.worker, sequence = ?e.sequence, "finished task");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "fanvisor", reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                error!(target: "fanvisor", reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}
