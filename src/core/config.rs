//! # Engine configuration.
//!
//! Provides [`Config`], the centralized settings for a [`Supervisor`](crate::Supervisor).
//!
//! ## Sentinel values
//! - `workers = 0` → one worker per available CPU
//! - `max_in_flight = 0` → `workers × 90`
//! - `progress_every = 0` → no progress events
//!
//! Prefer the helper accessors over reading the raw fields so that sentinel
//! checks stay in one place.

use std::num::NonZeroUsize;
use std::thread;

use crate::error::RuntimeError;
use crate::policies::RetryPolicy;

/// Default per-worker in-flight cap used when `max_in_flight = 0`.
pub const IN_FLIGHT_PER_WORKER: usize = 90;

/// Global configuration for the engine.
///
/// ## Field semantics
/// - `workers`: number of parallel workers (`0` = available parallelism)
/// - `max_in_flight`: global cap on running task invocations, divided evenly
///   across workers at start (`0` = `workers × 90`)
/// - `max_queue_size`: capacity of each worker's lane; `enqueue` blocks when full
/// - `progress_every`: publish a progress event for every item whose sequence
///   is a positive multiple of this value (`0` = disabled)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `retry`: retry policy applied to every task invocation
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of parallel workers.
    pub workers: usize,
    /// Global cap on concurrently running task invocations.
    pub max_in_flight: usize,
    /// Capacity of each lane.
    pub max_queue_size: usize,
    /// Progress reporting interval.
    pub progress_every: u64,
    /// Capacity of the event bus.
    pub bus_capacity: usize,
    /// Retry policy for task invocations.
    pub retry: RetryPolicy,
}

impl Config {
    /// Returns the effective number of workers (at least 1).
    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            n => n,
        }
    }

    /// Returns the effective global in-flight cap.
    pub fn total_in_flight(&self) -> usize {
        match self.max_in_flight {
            0 => self.worker_count().saturating_mul(IN_FLIGHT_PER_WORKER),
            n => n,
        }
    }

    /// Returns each worker's share of the global in-flight cap (at least 1).
    #[inline]
    pub fn per_worker_in_flight(&self) -> usize {
        (self.total_in_flight() / self.worker_count()).max(1)
    }

    /// Returns the lane capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity(&self) -> usize {
        self.max_queue_size.max(1)
    }

    /// Returns the progress interval as an `Option` (`None` = disabled).
    #[inline]
    pub fn progress_interval(&self) -> Option<u64> {
        if self.progress_every == 0 {
            None
        } else {
            Some(self.progress_every)
        }
    }

    /// Checks that the configuration can be honoured as written.
    ///
    /// A non-zero `max_in_flight` smaller than the worker count would leave
    /// some workers with a zero share. Client errors other than `429` are
    /// never transient and may not appear in `retry.retry_statuses`.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if let Some(code) = self
            .retry
            .retry_statuses
            .iter()
            .find(|&&c| (400..500).contains(&c) && c != 429)
        {
            return Err(RuntimeError::InvalidConfig {
                reason: format!("status {code} is a client error and cannot be retried"),
            });
        }
        let workers = self.worker_count();
        if self.max_in_flight != 0 && self.max_in_flight < workers {
            return Err(RuntimeError::InvalidConfig {
                reason: format!(
                    "max_in_flight={} is smaller than workers={workers}",
                    self.max_in_flight
                ),
            });
        }
        Ok(())
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `workers = 0` (available parallelism)
    /// - `max_in_flight = 0` (`workers × 90`)
    /// - `max_queue_size = 1000`
    /// - `progress_every = 100`
    /// - `bus_capacity = 1024`
    /// - `retry = RetryPolicy::default()`
    fn default() -> Self {
        Self {
            workers: 0,
            max_in_flight: 0,
            max_queue_size: 1000,
            progress_every: 100,
            bus_capacity: 1024,
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_parallelism() {
        let cfg = Config::default();
        let n = cfg.worker_count();
        assert!(n >= 1);
        assert_eq!(cfg.total_in_flight(), n * IN_FLIGHT_PER_WORKER);
        assert_eq!(cfg.per_worker_in_flight(), IN_FLIGHT_PER_WORKER);
        assert_eq!(cfg.queue_capacity(), 1000);
        assert_eq!(cfg.progress_interval(), Some(100));
    }

    #[test]
    fn global_cap_is_split_evenly() {
        let cfg = Config {
            workers: 4,
            max_in_flight: 10,
            ..Config::default()
        };
        assert_eq!(cfg.per_worker_in_flight(), 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn cap_below_worker_count_is_rejected() {
        let cfg = Config {
            workers: 4,
            max_in_flight: 3,
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(RuntimeError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn zero_sentinels() {
        let cfg = Config {
            workers: 2,
            max_queue_size: 0,
            progress_every: 0,
            ..Config::default()
        };
        assert_eq!(cfg.queue_capacity(), 1);
        assert_eq!(cfg.progress_interval(), None);
        assert_eq!(cfg.total_in_flight(), 180);
    }

    #[test]
    fn client_error_statuses_are_not_retryable() {
        let mut cfg = Config {
            workers: 1,
            ..Config::default()
        };
        cfg.retry.retry_statuses = vec![429, 503];
        assert!(cfg.validate().is_ok());

        cfg.retry.retry_statuses = vec![429, 404];
        assert!(matches!(
            cfg.validate(),
            Err(RuntimeError::InvalidConfig { reason }) if reason.contains("404")
        ));
    }
}
