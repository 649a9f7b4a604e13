//! # Supervisor: owns the lanes and workers, assigns items, merges results.
//!
//! The [`Supervisor`] is driven from ordinary synchronous code. It launches
//! one worker thread per lane, hands out sequence numbers in [`Supervisor::enqueue`],
//! and after [`Supervisor::stop`] merges every lane's completed map into one
//! result list ordered by sequence.
//!
//! ## Architecture
//! ```text
//! caller thread
//!   enqueue(payload) ── seq = next++ ── lane = seq mod N ── blocking_send
//!                                            │
//!          ┌─────────────────┬───────────────┴──────┐
//!          ▼                 ▼                      ▼
//!     [lane 0]          [lane 1]     ...       [lane N-1]     (bounded, FIFO)
//!          │                 │                      │
//!     worker 0          worker 1               worker N-1     (thread + LocalSet)
//!          │                 │                      │
//!          └──── BTreeMap<seq, value> | error ──────┘
//!                            ▼
//!                stop(): Close → join → merge
//!                            ▼
//!                results(): values ordered by seq, or the first lane error
//! ```
//!
//! ## Rules
//! - `enqueue` blocks while the target lane is full; it must not be called from
//!   inside an async runtime.
//! - `stop` is idempotent; only the first call can report a failure.
//! - A failed lane fails the whole run: `results` never returns a partial list.
//! - Dropping a running supervisor stops it.
//!
//! ## Example
//! ```rust
//! use std::rc::Rc;
//! use fanvisor::{Config, RuntimeError, Supervisor, TaskError};
//!
//! fn main() -> Result<(), RuntimeError> {
//!     let cfg = Config { workers: 2, ..Config::default() };
//!     let mut sup: Supervisor<u64, u64> =
//!         Supervisor::new(cfg, |n: u64, _: Rc<()>| async move { Ok::<_, TaskError>(n * n) });
//!
//!     sup.start()?;
//!     for n in 0..10 {
//!         sup.enqueue(n)?;
//!     }
//!     assert_eq!(sup.results()?, &[0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::thread;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use super::{
    builder::SupervisorBuilder,
    config::Config,
    listener::EventListener,
    worker::{LaneContext, LaneOutcome, Launch, WorkerState},
};
use crate::{
    error::RuntimeError,
    events::{Bus, Event, EventKind},
    subscribers::Subscribe,
    tasks::{LaneMessage, TaskFunction, WorkItem},
};

/// Lifecycle state of a [`Supervisor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SupervisorState {
    /// Constructed, not started.
    #[default]
    Idle,
    /// Workers launched; accepting items.
    Running,
    /// All workers joined; results (or the failure) are final.
    Stopped,
}

/// Fans payloads out to parallel workers and collects ordered results.
///
/// - `P`: payload type, moved into worker threads
/// - `T`: value produced per payload, moved back to the caller
pub struct Supervisor<P, T> {
    cfg: Config,
    launcher: Box<dyn Launch<P, T>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    bus: Bus,
    state: SupervisorState,

    next_sequence: u64,
    lanes: Vec<mpsc::Sender<LaneMessage<P>>>,
    threads: Vec<thread::JoinHandle<LaneOutcome<T>>>,
    worker_states: Vec<watch::Receiver<WorkerState>>,
    listener: Option<EventListener>,

    completed: Vec<T>,
    failure: Option<RuntimeError>,
}

impl<P, T> Supervisor<P, T>
where
    P: Clone + fmt::Debug + Send + 'static,
    T: Send + 'static,
{
    /// Creates a supervisor running `task` without sessions or subscribers.
    pub fn new<F>(cfg: Config, task: F) -> Self
    where
        F: TaskFunction<P, (), Output = T>,
    {
        SupervisorBuilder::new(cfg, task).build()
    }
}

impl<P, T> Supervisor<P, T> {
    pub(crate) fn new_internal(
        cfg: Config,
        launcher: Box<dyn Launch<P, T>>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        Self {
            cfg,
            launcher,
            subscribers,
            bus,
            state: SupervisorState::Idle,
            next_sequence: 0,
            lanes: Vec::new(),
            threads: Vec::new(),
            worker_states: Vec::new(),
            listener: None,
            completed: Vec::new(),
            failure: None,
        }
    }

    /// Launches the workers.
    ///
    /// Fails with [`RuntimeError::AlreadyStarted`] unless the supervisor is idle,
    /// with [`RuntimeError::InvalidConfig`] for an unusable config, and with
    /// [`RuntimeError::Spawn`] if a thread cannot be created (already launched
    /// workers are stopped first).
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.state != SupervisorState::Idle {
            return Err(RuntimeError::AlreadyStarted);
        }
        self.cfg.validate()?;

        if !self.subscribers.is_empty() {
            let subscribers = mem::take(&mut self.subscribers);
            self.listener = Some(EventListener::spawn(subscribers, &self.bus)?);
        }

        let workers = self.cfg.worker_count();
        let max_in_flight = self.cfg.per_worker_in_flight();
        self.state = SupervisorState::Running;

        for index in 0..workers {
            let (tx, rx) = mpsc::channel(self.cfg.queue_capacity());
            let (state_tx, state_rx) = watch::channel(WorkerState::Idle);
            let lane = LaneContext {
                index,
                lane: rx,
                state: state_tx,
                max_in_flight,
                progress_every: self.cfg.progress_interval(),
                retry: self.cfg.retry.clone(),
                bus: self.bus.clone(),
            };
            match self.launcher.launch(lane) {
                Ok(handle) => {
                    self.lanes.push(tx);
                    self.threads.push(handle);
                    self.worker_states.push(state_rx);
                }
                Err(err) => {
                    error!(worker = index, error = %err, "failed to launch worker");
                    self.shutdown();
                    self.failure = Some(err.clone());
                    return Err(err);
                }
            }
        }

        info!(workers, max_in_flight, queue = self.cfg.queue_capacity(), "supervisor started");
        self.bus.publish(Event::new(EventKind::SupervisorStarted).with_workers(workers));
        Ok(())
    }

    /// Assigns the next sequence number to `payload` and pushes it into lane
    /// `sequence mod N`, blocking while that lane is full.
    ///
    /// Returns the assigned sequence. Fails with [`RuntimeError::NotRunning`]
    /// outside `Running`, and with [`RuntimeError::LaneClosed`] when the lane's
    /// worker has already terminated (its own error is reported by `stop`).
    ///
    /// # Panics
    /// Panics if called from within an asynchronous execution context.
    pub fn enqueue(&mut self, payload: P) -> Result<u64, RuntimeError> {
        if self.state != SupervisorState::Running {
            return Err(RuntimeError::NotRunning);
        }
        let sequence = self.next_sequence;
        let lane = (sequence % self.lanes.len() as u64) as usize;
        self.lanes[lane]
            .blocking_send(LaneMessage::Item(WorkItem { sequence, payload }))
            .map_err(|_| RuntimeError::LaneClosed { lane })?;
        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Sends the terminal sentinel to every lane and waits for every worker.
    ///
    /// Returns the first lane failure, if any. Calling it again is a no-op;
    /// the failure stays available through [`Supervisor::results`].
    pub fn stop(&mut self) -> Result<(), RuntimeError> {
        match self.state {
            SupervisorState::Idle => {
                self.state = SupervisorState::Stopped;
                Ok(())
            }
            SupervisorState::Stopped => Ok(()),
            SupervisorState::Running => {
                self.shutdown();
                match &self.failure {
                    Some(err) => Err(err.clone()),
                    None => Ok(()),
                }
            }
        }
    }

    /// Stops the supervisor if needed and returns every value ordered by sequence.
    ///
    /// Surfaces the first lane failure instead of a partial list.
    pub fn results(&mut self) -> Result<&[T], RuntimeError> {
        self.stop()?;
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(&self.completed)
    }

    /// Like [`Supervisor::results`] but hands over ownership of the values.
    pub fn into_results(mut self) -> Result<Vec<T>, RuntimeError> {
        self.results()?;
        Ok(mem::take(&mut self.completed))
    }

    /// Starts (if idle), runs `produce`, and always stops before returning.
    ///
    /// A lane failure takes precedence over an error returned by `produce`,
    /// since an enqueue into a dead lane is only a symptom of it.
    pub fn scope<F>(mut self, produce: F) -> Result<Vec<T>, RuntimeError>
    where
        F: FnOnce(&mut Self) -> Result<(), RuntimeError>,
    {
        if self.state == SupervisorState::Idle {
            self.start()?;
        }
        let produced = produce(&mut self);
        let collected = self.into_results();
        match (produced, collected) {
            (_, Err(err)) | (Err(err), Ok(_)) => Err(err),
            (Ok(()), Ok(values)) => Ok(values),
        }
    }

    /// Returns the supervisor state.
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Returns a snapshot of each worker's state, indexed by lane.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.worker_states.iter().map(|rx| *rx.borrow()).collect()
    }

    /// Returns the number of items accepted so far.
    pub fn enqueued(&self) -> u64 {
        self.next_sequence
    }

    /// Returns a receiver for runtime events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    fn shutdown(&mut self) {
        for lane in self.lanes.drain(..) {
            // A worker that already failed has closed its lane.
            let _ = lane.blocking_send(LaneMessage::Close);
        }

        let mut merged = BTreeMap::new();
        for (index, handle) in self.threads.drain(..).enumerate() {
            let outcome = handle
                .join()
                .unwrap_or(Err(RuntimeError::WorkerPanicked { worker: index }));
            match outcome {
                Ok(lane) => merged.extend(lane),
                Err(err) => {
                    error!(worker = index, error = %err, "worker failed");
                    if self.failure.is_none() {
                        self.failure = Some(err);
                    }
                }
            }
        }

        if self.failure.is_none() {
            debug_assert_eq!(merged.len() as u64, self.next_sequence);
            self.completed = merged.into_values().collect();
        }
        self.state = SupervisorState::Stopped;

        let mut ev = Event::new(EventKind::SupervisorStopped).with_completed(self.next_sequence);
        match &self.failure {
            Some(err) => {
                warn!(
                    enqueued = self.next_sequence,
                    error = %err,
                    "supervisor stopped with failure"
                );
                ev = ev.with_reason(err.to_string());
            }
            None => debug!(results = self.completed.len(), "supervisor stopped"),
        }
        self.bus.publish(ev);

        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
    }
}

impl<P, T> Drop for Supervisor<P, T> {
    fn drop(&mut self) {
        if self.state == SupervisorState::Running {
            if let Err(err) = self.stop() {
                warn!(error = %err, "supervisor dropped while a worker had failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use std::rc::Rc;

    fn square(workers: usize) -> Supervisor<u64, u64> {
        let cfg = Config {
            workers,
            ..Config::default()
        };
        Supervisor::new(cfg, |n: u64, _: Rc<()>| async move {
            Ok::<_, TaskError>(n * n)
        })
    }

    #[test]
    fn enqueue_requires_running() {
        let mut sup = square(2);
        assert_eq!(sup.enqueue(1), Err(RuntimeError::NotRunning));
        sup.start().expect("start");
        assert_eq!(sup.start(), Err(RuntimeError::AlreadyStarted));
        sup.stop().expect("stop");
        assert_eq!(sup.enqueue(1), Err(RuntimeError::NotRunning));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut sup = square(2);
        sup.start().expect("start");
        sup.enqueue(3).expect("enqueue");
        assert_eq!(sup.stop(), Ok(()));
        assert_eq!(sup.stop(), Ok(()));
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert_eq!(sup.results().expect("results"), &[9]);
    }

    #[test]
    fn results_follow_sequence_order() {
        let mut sup = square(3);
        sup.start().expect("start");
        for n in 0..20 {
            assert_eq!(sup.enqueue(n), Ok(n));
        }
        assert_eq!(sup.enqueued(), 20);
        let expected: Vec<u64> = (0..20).map(|n| n * n).collect();
        assert_eq!(sup.results().expect("results"), expected.as_slice());
        assert!(
            sup.worker_states()
                .iter()
                .all(|s| *s == WorkerState::Stopped)
        );
    }

    #[test]
    fn idle_stop_yields_empty_results() {
        let mut sup = square(1);
        assert_eq!(sup.stop(), Ok(()));
        assert!(sup.results().expect("results").is_empty());
        assert_eq!(sup.start(), Err(RuntimeError::AlreadyStarted));
    }

    #[test]
    fn invalid_config_is_rejected_at_start() {
        let cfg = Config {
            workers: 4,
            max_in_flight: 2,
            ..Config::default()
        };
        let mut sup: Supervisor<u8, u8> =
            Supervisor::new(cfg, |n: u8, _: Rc<()>| async move { Ok::<_, TaskError>(n) });
        assert!(matches!(
            sup.start(),
            Err(RuntimeError::InvalidConfig { .. })
        ));
        assert_eq!(sup.state(), SupervisorState::Idle);
    }

    #[test]
    fn lifecycle_events_are_published() {
        let mut sup = square(2);
        let mut rx = sup.subscribe();
        sup.start().expect("start");
        sup.enqueue(1).expect("enqueue");
        sup.stop().expect("stop");

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::SupervisorStarted));
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::WorkerStopped).count(),
            2
        );
        assert_eq!(kinds.last(), Some(&EventKind::SupervisorStopped));
    }
}
