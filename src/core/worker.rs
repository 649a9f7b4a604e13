//! # Worker: one lane, one thread, one event loop.
//!
//! Each worker runs on a dedicated OS thread that owns a current-thread tokio
//! runtime and a [`LocalSet`]. Tasks are spawned with `spawn_local`, so only one
//! of them runs at a time and they suspend at every awaited network call.
//!
//! ## State machine
//! ```text
//! Idle ──start──► Running ──Close / fatal──► Draining ──in-flight empty──► Stopped
//!   └────────────── session open failed ────────────────────────────────────┘
//! ```
//!
//! ## Loop
//! ```text
//! loop {
//!   ├─► in-flight == cap ─► await one completion (no new items pulled)
//!   └─► select (biased) {
//!         completion   ─► store result | fatal ─► break
//!         lane.recv()  ─► Item  ─► spawn TaskRunner, yield
//!                         Close ─► break
//!       }
//! }
//! fatal? ─► cancel siblings, close lane
//! drain in-flight ─► close session ─► Stopped
//! ```
//!
//! ## Rules
//! - The in-flight registry holds every scheduled runner until it is reaped;
//!   each sequence is registered and removed exactly once.
//! - A fatal error discards this worker's completed results (all-or-nothing).
//! - Closing the lane on failure makes a blocked `enqueue` return instead of
//!   waiting for a consumer that will never come back.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet, LocalSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    core::runner::{RunnerContext, RunnerOutcome, TaskRunner},
    error::RuntimeError,
    events::{Bus, Event, EventKind},
    policies::RetryPolicy,
    tasks::{LaneMessage, SessionProvider, TaskFunction, TaskResult},
};

/// Lifecycle state of a worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, not yet running.
    #[default]
    Idle,
    /// Pulling and scheduling items.
    Running,
    /// No longer pulling; waiting for in-flight tasks.
    Draining,
    /// Finished (successfully or not).
    Stopped,
}

/// Completed results of one lane, or the error that aborted it.
pub(crate) type LaneOutcome<T> = Result<BTreeMap<u64, T>, RuntimeError>;

/// Per-worker wiring created by the supervisor.
pub(crate) struct LaneContext<P> {
    /// Worker (lane) index.
    pub index: usize,
    /// Receiving side of the lane.
    pub lane: mpsc::Receiver<LaneMessage<P>>,
    /// State published to the supervisor.
    pub state: watch::Sender<WorkerState>,
    /// Cap on concurrently scheduled runners.
    pub max_in_flight: usize,
    /// Progress interval (`None` = disabled).
    pub progress_every: Option<u64>,
    /// Retry policy for every invocation.
    pub retry: RetryPolicy,
    /// Event bus.
    pub bus: Bus,
}

/// Type-erased worker factory, so the supervisor only depends on `P` and `T`.
pub(crate) trait Launch<P, T>: Send {
    /// Spawns the worker thread for `lane`.
    fn launch(
        &self,
        lane: LaneContext<P>,
    ) -> Result<thread::JoinHandle<LaneOutcome<T>>, RuntimeError>;
}

/// Launches workers running `task` with sessions from `provider`.
pub(crate) struct Launcher<F, Sp> {
    pub task: Arc<F>,
    pub provider: Arc<Sp>,
}

impl<P, F, Sp> Launch<P, <F as TaskFunction<P, Sp::Session>>::Output> for Launcher<F, Sp>
where
    Sp: SessionProvider,
    F: TaskFunction<P, Sp::Session>,
    P: Clone + fmt::Debug + Send + 'static,
{
    fn launch(
        &self,
        lane: LaneContext<P>,
    ) -> Result<thread::JoinHandle<LaneOutcome<F::Output>>, RuntimeError> {
        let name = format!("fanvisor-worker-{}", lane.index);
        let worker = Worker {
            task: Arc::clone(&self.task),
            provider: Arc::clone(&self.provider),
            lane,
        };
        thread::Builder::new()
            .name(name)
            .spawn(move || worker.run_blocking())
            .map_err(|e| RuntimeError::Spawn {
                reason: e.to_string(),
            })
    }
}

/// Registry of scheduled runners.
struct InFlight<T> {
    tasks: JoinSet<(u64, RunnerOutcome<T>)>,
    sequences: BTreeSet<u64>,
    cap: usize,
}

impl<T: 'static> InFlight<T> {
    fn new(cap: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            sequences: BTreeSet::new(),
            cap: cap.max(1),
        }
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn is_full(&self) -> bool {
        self.tasks.len() >= self.cap
    }

    fn schedule<Fut>(&mut self, sequence: u64, run: Fut)
    where
        Fut: Future<Output = RunnerOutcome<T>> + 'static,
    {
        let fresh = self.sequences.insert(sequence);
        debug_assert!(fresh, "sequence {sequence} scheduled twice");
        self.tasks.spawn_local(async move { (sequence, run.await) });
    }

    /// Removes a reaped runner and stores its value; returns its error if it failed.
    fn settle(
        &mut self,
        joined: Result<(u64, RunnerOutcome<T>), JoinError>,
        worker: usize,
        results: &mut BTreeMap<u64, T>,
    ) -> Result<(), RuntimeError> {
        let (sequence, outcome) = joined.map_err(|_| RuntimeError::WorkerPanicked { worker })?;
        let known = self.sequences.remove(&sequence);
        debug_assert!(known, "sequence {sequence} settled twice");
        if let Some(TaskResult { sequence, value }) = outcome? {
            results.insert(sequence, value);
        }
        Ok(())
    }
}

/// Worker state publisher; reports [`WorkerState::Stopped`] when dropped,
/// including while unwinding from a panic.
struct StateHandle(watch::Sender<WorkerState>);

impl StateHandle {
    fn set(&self, state: WorkerState) {
        self.0.send_replace(state);
    }
}

impl Drop for StateHandle {
    fn drop(&mut self) {
        self.0.send_replace(WorkerState::Stopped);
    }
}

struct Worker<P, F, Sp> {
    task: Arc<F>,
    provider: Arc<Sp>,
    lane: LaneContext<P>,
}

impl<P, F, Sp> Worker<P, F, Sp>
where
    Sp: SessionProvider,
    F: TaskFunction<P, Sp::Session>,
    P: Clone + fmt::Debug + Send + 'static,
{
    fn run_blocking(self) -> LaneOutcome<F::Output> {
        let index = self.lane.index;
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                self.lane.state.send_replace(WorkerState::Stopped);
                return Err(RuntimeError::Runtime {
                    worker: index,
                    reason: e.to_string(),
                });
            }
        };
        let local = LocalSet::new();
        local.block_on(&rt, self.run())
    }

    async fn run(self) -> LaneOutcome<F::Output> {
        let Worker {
            task,
            provider,
            lane,
        } = self;
        let LaneContext {
            index,
            lane: mut rx,
            state,
            max_in_flight,
            progress_every,
            retry,
            bus,
        } = lane;
        let state = StateHandle(state);

        let session = match provider.open(index).await {
            Ok(session) => Rc::new(session),
            Err(source) => {
                rx.close();
                state.set(WorkerState::Stopped);
                let err = RuntimeError::Session {
                    worker: index,
                    source,
                };
                warn!(worker = index, error = %err, "session setup failed");
                bus.publish(
                    Event::new(EventKind::WorkerFailed)
                        .with_worker(index)
                        .with_reason(err.to_string()),
                );
                return Err(err);
            }
        };

        state.set(WorkerState::Running);
        bus.publish(Event::new(EventKind::WorkerStarted).with_worker(index));
        debug!(worker = index, max_in_flight, "worker running");

        let ctx = Rc::new(RunnerContext {
            worker: index,
            task,
            session: Rc::clone(&session),
            retry,
            bus: bus.clone(),
            progress_every,
        });
        let token = CancellationToken::new();
        let mut in_flight = InFlight::new(max_in_flight);
        let mut results = BTreeMap::new();
        let mut failure: Option<RuntimeError> = None;

        loop {
            if in_flight.is_full() {
                let Some(joined) = in_flight.tasks.join_next().await else {
                    continue;
                };
                if let Err(err) = in_flight.settle(joined, index, &mut results) {
                    failure = Some(err);
                    break;
                }
                continue;
            }

            tokio::select! {
                biased;
                Some(joined) = in_flight.tasks.join_next(), if !in_flight.is_empty() => {
                    if let Err(err) = in_flight.settle(joined, index, &mut results) {
                        failure = Some(err);
                        break;
                    }
                }
                msg = rx.recv() => match msg {
                    Some(LaneMessage::Item(item)) => {
                        let runner = TaskRunner::new(Rc::clone(&ctx), token.child_token());
                        in_flight.schedule(item.sequence, runner.run(item));
                        tokio::task::yield_now().await;
                    }
                    Some(LaneMessage::Close) | None => break,
                },
            }
        }

        if let Some(err) = &failure {
            warn!(
                worker = index,
                in_flight = in_flight.len(),
                error = %err,
                "cancelling in-flight tasks"
            );
            token.cancel();
            rx.close();
        }
        state.set(WorkerState::Draining);
        bus.publish(
            Event::new(EventKind::WorkerDraining)
                .with_worker(index)
                .with_completed(in_flight.len() as u64),
        );

        while let Some(joined) = in_flight.tasks.join_next().await {
            if let Err(err) = in_flight.settle(joined, index, &mut results) {
                if failure.is_none() {
                    warn!(worker = index, error = %err, "task failed while draining");
                    token.cancel();
                    rx.close();
                    failure = Some(err);
                }
            }
        }

        drop(ctx);
        match Rc::try_unwrap(session) {
            Ok(session) => provider.close(index, session).await,
            Err(_) => warn!(worker = index, "session still referenced at shutdown; not closed"),
        }
        state.set(WorkerState::Stopped);

        match failure {
            Some(err) => {
                let mut ev = Event::new(EventKind::WorkerFailed)
                    .with_worker(index)
                    .with_reason(err.to_string());
                if let RuntimeError::TaskFailed { sequence, .. } = &err {
                    ev = ev.with_sequence(*sequence);
                }
                bus.publish(ev);
                Err(err)
            }
            None => {
                debug!(worker = index, results = results.len(), "worker stopped");
                bus.publish(
                    Event::new(EventKind::WorkerStopped)
                        .with_worker(index)
                        .with_completed(results.len() as u64),
                );
                Ok(results)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::tasks::{NoSession, WorkItem};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counted {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    #[async_trait(?Send)]
    impl SessionProvider for Counted {
        type Session = usize;

        async fn open(&self, worker: usize) -> Result<usize, TaskError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(worker * 100)
        }

        async fn close(&self, _worker: usize, _session: usize) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Broken;

    #[async_trait(?Send)]
    impl SessionProvider for Broken {
        type Session = ();

        async fn open(&self, _worker: usize) -> Result<(), TaskError> {
            Err(TaskError::network("token endpoint unreachable"))
        }
    }

    struct Panicking;

    #[async_trait(?Send)]
    impl SessionProvider for Panicking {
        type Session = ();

        async fn open(&self, _worker: usize) -> Result<(), TaskError> {
            panic!("credentials file is corrupt");
        }
    }

    fn lane<P>(
        index: usize,
        cap: usize,
        max_in_flight: usize,
    ) -> (
        mpsc::Sender<LaneMessage<P>>,
        watch::Receiver<WorkerState>,
        LaneContext<P>,
    ) {
        let (tx, rx) = mpsc::channel(cap);
        let (state_tx, state_rx) = watch::channel(WorkerState::Idle);
        let ctx = LaneContext {
            index,
            lane: rx,
            state: state_tx,
            max_in_flight,
            progress_every: None,
            retry: RetryPolicy::never(),
            bus: Bus::new(64),
        };
        (tx, state_rx, ctx)
    }

    fn item<P>(sequence: u64, payload: P) -> LaneMessage<P> {
        LaneMessage::Item(WorkItem { sequence, payload })
    }

    #[test]
    fn session_is_opened_and_closed_once() {
        let provider = Arc::new(Counted {
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        });
        let launcher = Launcher {
            task: Arc::new(|n: u64, session: Rc<usize>| async move {
                Ok::<_, TaskError>(n + *session as u64)
            }),
            provider: Arc::clone(&provider),
        };
        let (tx, state, ctx) = lane(2, 4, 2);
        let handle = launcher.launch(ctx).expect("spawn");
        for seq in [2u64, 5, 8] {
            tx.blocking_send(item(seq, seq)).expect("send");
        }
        tx.blocking_send(LaneMessage::Close).expect("close");

        let results = handle.join().expect("join").expect("lane ok");
        assert_eq!(
            results.into_iter().collect::<Vec<_>>(),
            vec![(2, 202), (5, 205), (8, 208)]
        );
        assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
        assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
        assert_eq!(*state.borrow(), WorkerState::Stopped);
    }

    #[test]
    fn session_failure_stops_worker_and_closes_lane() {
        let launcher = Launcher {
            task: Arc::new(|n: u8, _: Rc<()>| async move { Ok::<_, TaskError>(n) }),
            provider: Arc::new(Broken),
        };
        let (tx, state, ctx) = lane(0, 1, 1);
        let handle = launcher.launch(ctx).expect("spawn");

        let err = handle.join().expect("join").expect_err("session must fail");
        assert!(matches!(err, RuntimeError::Session { worker: 0, .. }));
        assert!(tx.blocking_send(item(0, 1u8)).is_err());
        assert_eq!(*state.borrow(), WorkerState::Stopped);
    }

    #[test]
    fn never_exceeds_in_flight_cap() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let launcher = Launcher {
            task: Arc::new(move |n: u64, _: Rc<()>| {
                let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(n)
                }
            }),
            provider: Arc::new(NoSession),
        };
        let (tx, _state, ctx) = lane(0, 64, 3);
        let handle = launcher.launch(ctx).expect("spawn");
        for seq in 0..60u64 {
            tx.blocking_send(item(seq, seq)).expect("send");
        }
        tx.blocking_send(LaneMessage::Close).expect("close");

        let results = handle.join().expect("join").expect("lane ok");
        assert_eq!(results.len(), 60);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn fatal_error_discards_lane_results() {
        let launcher = Launcher {
            task: Arc::new(|n: u64, _: Rc<()>| async move {
                if n == 3 {
                    Err(TaskError::status(400, "bad request"))
                } else {
                    Ok(n)
                }
            }),
            provider: Arc::new(NoSession),
        };
        let (tx, state, ctx) = lane(1, 16, 1);
        let handle = launcher.launch(ctx).expect("spawn");
        for seq in 0..4u64 {
            tx.blocking_send(item(seq, seq)).expect("send");
        }
        // The lane may already be closed by the failure.
        let _ = tx.blocking_send(LaneMessage::Close);

        let err = handle.join().expect("join").expect_err("lane must fail");
        assert!(matches!(
            err,
            RuntimeError::TaskFailed {
                worker: 1,
                sequence: 3,
                ..
            }
        ));
        assert_eq!(*state.borrow(), WorkerState::Stopped);
    }

    #[test]
    fn panic_in_session_setup_still_reports_stopped() {
        let launcher = Launcher {
            task: Arc::new(|n: u8, _: Rc<()>| async move { Ok::<_, TaskError>(n) }),
            provider: Arc::new(Panicking),
        };
        let (_tx, state, ctx) = lane(0, 1, 1);
        let handle = launcher.launch(ctx).expect("spawn");

        assert!(handle.join().is_err());
        assert_eq!(*state.borrow(), WorkerState::Stopped);
    }
}
