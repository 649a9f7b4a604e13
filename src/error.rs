//! Error types used by the fanvisor engine and task functions.
//!
//! This module defines two main error enums:
//!
//! - [`TaskError`]: errors raised by one invocation of a task function.
//! - [`RuntimeError`]: errors raised by the engine itself (lifecycle misuse,
//!   worker failures, and task failures escalated to the caller).
//!
//! Both types provide `as_label` for logs/metrics. Whether a [`TaskError`] is
//! retried is decided by [`RetryPolicy`](crate::RetryPolicy), not by the error.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by a task function invocation.
///
/// Task functions report failures through these variants so that the
/// [`RetryPolicy`](crate::RetryPolicy) can classify them:
/// - `Network` is always transient;
/// - `Status` is transient only for the configured status codes (rate limiting);
/// - `Fail` is classified by the policy's fallback;
/// - `Fatal`, `Timeout` and `Canceled` are never retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Connection-level failure (refused, reset, DNS, transport timeout).
    #[error("network error: {reason}")]
    Network {
        /// The underlying error message.
        reason: String,
    },

    /// The remote side answered with a non-success status code.
    #[error("status {code}: {reason}")]
    Status {
        /// Response status code.
        code: u16,
        /// Response body or description.
        reason: String,
    },

    /// Any other failure reported by the task function.
    #[error("execution failed: {reason}")]
    Fail {
        /// The underlying error message.
        reason: String,
    },

    /// Non-recoverable error (never retried).
    #[error("fatal error (no retry): {reason}")]
    Fatal {
        /// The underlying error message.
        reason: String,
    },

    /// The retry budget ran out while an attempt was still in progress.
    #[error("timed out after {budget:?}")]
    Timeout {
        /// The wall-clock budget that was exceeded.
        budget: Duration,
    },

    /// The invocation was cancelled because a sibling failed.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Network`].
    pub fn network(reason: impl Into<String>) -> Self {
        TaskError::Network {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`TaskError::Status`].
    pub fn status(code: u16, reason: impl Into<String>) -> Self {
        TaskError::Status {
            code,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(reason: impl Into<String>) -> Self {
        TaskError::Fail {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`TaskError::Fatal`].
    pub fn fatal(reason: impl Into<String>) -> Self {
        TaskError::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fanvisor::TaskError;
    ///
    /// let err = TaskError::status(429, "slow down");
    /// assert_eq!(err.as_label(), "task_status");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Network { .. } => "task_network",
            TaskError::Status { .. } => "task_status",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns the status code for [`TaskError::Status`].
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TaskError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// # Errors produced by the fanvisor engine.
///
/// A failed task is escalated as [`RuntimeError::TaskFailed`], tagged with the
/// worker, the item's sequence number and a rendering of its payload.
/// Errors are `Clone` so that one stored worker failure can be reported by both
/// [`Supervisor::stop`](crate::Supervisor::stop) and
/// [`Supervisor::results`](crate::Supervisor::results).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// `enqueue` was called before `start` or after `stop`.
    #[error("supervisor is not running")]
    NotRunning,

    /// `start` was called twice.
    #[error("supervisor already started")]
    AlreadyStarted,

    /// Configuration cannot be honoured.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },

    /// A task failed without recovery; its worker aborted all sibling work.
    #[error("worker {worker}: task #{sequence} failed (payload: {payload}): {source}")]
    TaskFailed {
        /// Worker (lane) index.
        worker: usize,
        /// Sequence number of the failed item.
        sequence: u64,
        /// `Debug` rendering of the item's payload.
        payload: String,
        /// The last error returned by the task function.
        #[source]
        source: TaskError,
    },

    /// The session provider could not open a session for a worker.
    #[error("worker {worker}: session setup failed: {source}")]
    Session {
        /// Worker (lane) index.
        worker: usize,
        /// Error returned by the provider.
        #[source]
        source: TaskError,
    },

    /// The worker thread panicked outside of any task.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// Worker (lane) index.
        worker: usize,
    },

    /// The worker's event loop could not be built.
    #[error("worker {worker}: event loop setup failed: {reason}")]
    Runtime {
        /// Worker (lane) index.
        worker: usize,
        /// Underlying I/O error message.
        reason: String,
    },

    /// A worker thread could not be spawned.
    #[error("failed to spawn thread: {reason}")]
    Spawn {
        /// Underlying I/O error message.
        reason: String,
    },

    /// The lane's worker has already terminated; its own error is reported by `stop`/`results`.
    #[error("lane {lane} is closed")]
    LaneClosed {
        /// Lane index.
        lane: usize,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fanvisor::RuntimeError;
    ///
    /// assert_eq!(RuntimeError::NotRunning.as_label(), "runtime_not_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::NotRunning => "runtime_not_running",
            RuntimeError::AlreadyStarted => "runtime_already_started",
            RuntimeError::InvalidConfig { .. } => "runtime_invalid_config",
            RuntimeError::TaskFailed { .. } => "runtime_task_failed",
            RuntimeError::Session { .. } => "runtime_session_failed",
            RuntimeError::WorkerPanicked { .. } => "runtime_worker_panicked",
            RuntimeError::Runtime { .. } => "runtime_event_loop_failed",
            RuntimeError::Spawn { .. } => "runtime_spawn_failed",
            RuntimeError::LaneClosed { .. } => "runtime_lane_closed",
        }
    }

    /// Returns the underlying task error, if this failure came from a task.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            RuntimeError::TaskFailed { source, .. } | RuntimeError::Session { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_failed_message_carries_diagnostics() {
        let err = RuntimeError::TaskFailed {
            worker: 2,
            sequence: 17,
            payload: "\"C\"".into(),
            source: TaskError::status(400, "bad request"),
        };
        let msg = err.to_string();
        assert!(msg.contains("worker 2"));
        assert!(msg.contains("#17"));
        assert!(msg.contains("\"C\""));
        assert!(msg.contains("status 400"));
        assert_eq!(err.task_error().and_then(TaskError::status_code), Some(400));
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(TaskError::network("reset").as_label(), "task_network");
        assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
        assert_eq!(
            RuntimeError::LaneClosed { lane: 0 }.as_label(),
            "runtime_lane_closed"
        );
    }
}
