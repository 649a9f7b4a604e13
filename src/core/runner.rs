//! # Run one work item to completion.
//!
//! [`TaskRunner`] wraps a single task-function invocation with the worker's
//! [`RetryPolicy`], races it against the worker's cancellation token, and
//! turns the outcome into a tagged result.
//!
//! ## Outcomes
//! ```text
//! Ok(Some(TaskResult))   success (after zero or more retries)
//! Ok(None)               cancelled because a sibling failed; no result
//! Err(TaskFailed{..})    final or exhausted error, tagged with sequence + payload
//! ```
//!
//! ## Rules
//! - Cancellation is checked first at every resumption (`biased` select), so a
//!   cancelled runner never reports a late success or failure.
//! - A panic inside the task function is caught and reported as a fatal error.
//! - Retry notices and progress markers are published to the [`Bus`]; they
//!   never affect the outcome.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{RuntimeError, TaskError},
    events::{Bus, Event, EventKind},
    policies::{RetryNotice, RetryPolicy},
    tasks::{TaskFunction, TaskResult, WorkItem},
};

/// What a runner reports back to its worker.
pub(crate) type RunnerOutcome<T> = Result<Option<TaskResult<T>>, RuntimeError>;

/// Everything a runner needs that is shared by all runners of one worker.
pub(crate) struct RunnerContext<F, S> {
    /// Worker index (for tagging and events).
    pub worker: usize,
    /// The task function.
    pub task: Arc<F>,
    /// The worker's session.
    pub session: Rc<S>,
    /// Retry policy.
    pub retry: RetryPolicy,
    /// Event bus.
    pub bus: Bus,
    /// Progress interval (`None` = disabled).
    pub progress_every: Option<u64>,
}

/// Executes one work item with retries and cooperative cancellation.
pub(crate) struct TaskRunner<F, S> {
    ctx: Rc<RunnerContext<F, S>>,
    token: CancellationToken,
}

impl<F, S> TaskRunner<F, S> {
    /// Creates a runner bound to the worker context and a child cancellation token.
    pub fn new(ctx: Rc<RunnerContext<F, S>>, token: CancellationToken) -> Self {
        Self { ctx, token }
    }

    /// Runs `item` until success, final failure or cancellation.
    pub async fn run<P>(
        self,
        item: WorkItem<P>,
    ) -> RunnerOutcome<<F as TaskFunction<P, S>>::Output>
    where
        F: TaskFunction<P, S>,
        P: Clone + fmt::Debug,
    {
        let WorkItem { sequence, payload } = item;
        let ctx = &*self.ctx;

        let observe = |notice: &RetryNotice<'_>| {
            ctx.bus.publish(
                Event::new(EventKind::TaskRetrying)
                    .with_worker(ctx.worker)
                    .with_sequence(sequence)
                    .with_attempt(notice.attempt)
                    .with_delay(notice.delay)
                    .with_reason(notice.error.to_string()),
            );
        };
        let call = ctx.retry.execute(
            || ctx.task.invoke(payload.clone(), Rc::clone(&ctx.session)),
            &observe,
        );
        let guarded = std::panic::AssertUnwindSafe(call).catch_unwind();

        let res = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TaskError::Canceled),
            res = guarded => res.unwrap_or_else(|panic_err| Err(panic_to_error(panic_err))),
        };

        match res {
            Ok(value) => {
                self.report_progress(sequence);
                Ok(Some(TaskResult { sequence, value }))
            }
            Err(TaskError::Canceled) => {
                ctx.bus.publish(
                    Event::new(EventKind::TaskCanceled)
                        .with_worker(ctx.worker)
                        .with_sequence(sequence),
                );
                Ok(None)
            }
            Err(source) => {
                ctx.bus.publish(
                    Event::new(EventKind::TaskFailed)
                        .with_worker(ctx.worker)
                        .with_sequence(sequence)
                        .with_reason(source.to_string()),
                );
                Err(RuntimeError::TaskFailed {
                    worker: ctx.worker,
                    sequence,
                    payload: format!("{payload:?}"),
                    source,
                })
            }
        }
    }

    fn report_progress(&self, sequence: u64) {
        let Some(every) = self.ctx.progress_every else {
            return;
        };
        if sequence > 0 && sequence % every == 0 {
            self.ctx.bus.publish(
                Event::new(EventKind::Progress)
                    .with_worker(self.ctx.worker)
                    .with_sequence(sequence),
            );
        }
    }
}

/// Converts a caught panic payload into a fatal task error.
fn panic_to_error(panic_err: Box<dyn std::any::Any + Send>) -> TaskError {
    let any = &*panic_err;
    let info = if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    };
    TaskError::fatal(format!("task panicked: {info}"))
}
