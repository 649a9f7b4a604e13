//! # Retry policy for task invocations.
//!
//! [`RetryPolicy`] answers two questions:
//! - **is this error transient?** ([`RetryPolicy::should_retry`])
//! - **how long do we keep trying?** (`max_attempts`, `budget`, `backoff`)
//!
//! ## Classification
//! ```text
//! TaskError::Network            → retry
//! TaskError::Status { code }    → retry iff code ∈ retry_statuses (default [429])
//! TaskError::Fail               → FallbackRetry::RetryAll → retry
//!                                 FallbackRetry::RetryNone → give up (default)
//! TaskError::Fatal / Timeout /
//! Canceled                      → give up
//! ```
//!
//! ## Exhaustion
//! Retrying stops at whichever limit trips first: the attempt count or the
//! wall-clock budget. The last error is returned unchanged, also when the
//! budget expires during a later attempt. Only a first attempt that is still
//! running at the deadline yields [`TaskError::Timeout`].

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant};

use crate::error::TaskError;
use crate::policies::backoff::BackoffPolicy;

/// How errors outside the network/status classes are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackRetry {
    /// Retry every [`TaskError::Fail`].
    RetryAll,
    /// Treat [`TaskError::Fail`] as final (default).
    #[default]
    RetryNone,
}

/// Details passed to the retry observer before each backoff sleep.
#[derive(Debug)]
pub struct RetryNotice<'a> {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    /// Pause before the next attempt.
    pub delay: Duration,
    /// The transient error.
    pub error: &'a TaskError,
}

/// Bounded retry with classification, backoff and a wall-clock budget.
///
/// ## Sentinel values
/// - `max_attempts = 0` → unlimited attempts
/// - `budget = 0s` → no wall-clock limit
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first one (`0` = unlimited).
    pub max_attempts: u32,
    /// Wall-clock budget across all attempts and sleeps (`0s` = unlimited).
    pub budget: Duration,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
    /// Status codes considered transient (rate limiting).
    ///
    /// Client errors other than `429` are rejected by
    /// [`Config::validate`](crate::Config::validate); server codes (`5xx`) may
    /// be added.
    pub retry_statuses: Vec<u16>,
    /// Treatment of [`TaskError::Fail`].
    pub fallback: FallbackRetry,
}

impl Default for RetryPolicy {
    /// Unlimited attempts within a 120s budget, retrying network errors and
    /// `429`, default [`BackoffPolicy`], [`FallbackRetry::RetryNone`].
    fn default() -> Self {
        Self {
            max_attempts: 0,
            budget: Duration::from_secs(120),
            backoff: BackoffPolicy::default(),
            retry_statuses: vec![429],
            fallback: FallbackRetry::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Returns the attempt limit as an `Option` (`None` = unlimited).
    #[inline]
    pub fn attempt_limit(&self) -> Option<u32> {
        if self.max_attempts == 0 {
            None
        } else {
            Some(self.max_attempts)
        }
    }

    /// Returns the wall-clock budget as an `Option` (`None` = unlimited).
    #[inline]
    pub fn time_budget(&self) -> Option<Duration> {
        if self.budget == Duration::ZERO {
            None
        } else {
            Some(self.budget)
        }
    }

    /// Classifies `err` as transient (`true`) or final (`false`).
    pub fn should_retry(&self, err: &TaskError) -> bool {
        match err {
            TaskError::Network { .. } => true,
            TaskError::Status { code, .. } => self.retry_statuses.contains(code),
            TaskError::Fail { .. } => matches!(self.fallback, FallbackRetry::RetryAll),
            TaskError::Fatal { .. } | TaskError::Timeout { .. } | TaskError::Canceled => false,
        }
    }

    /// Runs `op` until it succeeds, fails finally, or the limits are exhausted.
    ///
    /// `observe` is called once per transient failure that will be retried; it
    /// cannot influence the outcome.
    pub async fn execute<T, F, Fut>(
        &self,
        mut op: F,
        observe: &dyn Fn(&RetryNotice<'_>),
    ) -> Result<T, TaskError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        let deadline = self.time_budget().map(|b| (Instant::now() + b, b));
        let mut attempt: u32 = 0;
        let mut last: Option<TaskError> = None;

        loop {
            attempt = attempt.saturating_add(1);

            let res = match deadline {
                Some((at, budget)) => match time::timeout_at(at, op()).await {
                    Ok(r) => r,
                    Err(_elapsed) => return Err(last.unwrap_or(TaskError::Timeout { budget })),
                },
                None => op().await,
            };

            let err = match res {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !self.should_retry(&err) {
                return Err(err);
            }
            if self.attempt_limit().is_some_and(|max| attempt >= max) {
                return Err(err);
            }

            let delay = self.backoff.delay(attempt - 1);
            if deadline.is_some_and(|(at, _)| Instant::now() + delay >= at) {
                return Err(err);
            }

            observe(&RetryNotice {
                attempt,
                delay,
                error: &err,
            });
            time::sleep(delay).await;
            last = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            budget: Duration::ZERO,
            backoff: BackoffPolicy::constant(Duration::from_millis(10)),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn classifies_errors() {
        let p = RetryPolicy::default();
        assert!(p.should_retry(&TaskError::network("reset")));
        assert!(p.should_retry(&TaskError::status(429, "slow down")));
        assert!(!p.should_retry(&TaskError::status(400, "bad request")));
        assert!(!p.should_retry(&TaskError::status(404, "missing")));
        assert!(!p.should_retry(&TaskError::status(503, "unavailable")));
        assert!(!p.should_retry(&TaskError::fail("boom")));
        assert!(!p.should_retry(&TaskError::fatal("nope")));
        assert!(!p.should_retry(&TaskError::Canceled));
    }

    #[test]
    fn fallback_retry_all_covers_other_errors_only() {
        let p = RetryPolicy {
            fallback: FallbackRetry::RetryAll,
            ..RetryPolicy::default()
        };
        assert!(p.should_retry(&TaskError::fail("boom")));
        assert!(!p.should_retry(&TaskError::status(403, "forbidden")));
        assert!(!p.should_retry(&TaskError::fatal("nope")));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_before_attempts_run_out() {
        let calls = Cell::new(0u32);
        let notices = Cell::new(0u32);
        let res = quick(3)
            .execute(
                || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move {
                        if n < 3 {
                            Err(TaskError::network("reset"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                &|_| notices.set(notices.get() + 1),
            )
            .await;
        assert_eq!(res, Ok(3));
        assert_eq!(notices.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_last_error() {
        let calls = Cell::new(0u32);
        let res: Result<(), _> = quick(4)
            .execute(
                || {
                    calls.set(calls.get() + 1);
                    async { Err(TaskError::status(429, "slow down")) }
                },
                &|_| {},
            )
            .await;
        assert_eq!(res, Err(TaskError::status(429, "slow down")));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn final_error_is_not_retried() {
        let calls = Cell::new(0u32);
        let res: Result<(), _> = quick(0)
            .execute(
                || {
                    calls.set(calls.get() + 1);
                    async { Err(TaskError::status(400, "bad request")) }
                },
                &|_| panic!("observer must not fire for final errors"),
            )
            .await;
        assert_eq!(res.unwrap_err().status_code(), Some(400));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_stops_endless_retries() {
        let policy = RetryPolicy {
            max_attempts: 0,
            budget: Duration::from_millis(95),
            backoff: BackoffPolicy::constant(Duration::from_millis(10)),
            ..RetryPolicy::default()
        };
        let calls = Cell::new(0u32);
        let res: Result<(), _> = policy
            .execute(
                || {
                    calls.set(calls.get() + 1);
                    async { Err(TaskError::network("refused")) }
                },
                &|_| {},
            )
            .await;
        assert_eq!(res, Err(TaskError::network("refused")));
        assert!(calls.get() >= 9 && calls.get() <= 10, "calls={}", calls.get());
    }

    #[tokio::test(start_paused = true)]
    async fn budget_abandons_a_hanging_attempt() {
        let policy = RetryPolicy {
            budget: Duration::from_millis(50),
            ..quick(0)
        };
        let res: Result<(), _> = policy
            .execute(|| futures::future::pending(), &|_| {})
            .await;
        assert_eq!(
            res,
            Err(TaskError::Timeout {
                budget: Duration::from_millis(50)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn budget_expiry_keeps_the_last_transient_error() {
        let policy = RetryPolicy {
            budget: Duration::from_millis(50),
            backoff: BackoffPolicy::constant(Duration::from_millis(1)),
            ..quick(0)
        };
        let calls = Cell::new(0u32);
        let res: Result<(), _> = policy
            .execute(
                || {
                    calls.set(calls.get() + 1);
                    async {
                        time::sleep(Duration::from_millis(30)).await;
                        Err(TaskError::network("connection refused"))
                    }
                },
                &|_| {},
            )
            .await;
        assert_eq!(res, Err(TaskError::network("connection refused")));
        assert_eq!(calls.get(), 2);
    }
}
