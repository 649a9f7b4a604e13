//! Event delivery to subscribers across a whole run.

use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fanvisor::{
    BackoffPolicy, Config, Event, EventKind, RetryPolicy, Subscribe, Supervisor, SupervisorBuilder,
    TaskError,
};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        self.events.lock().unwrap().push(ev.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[test]
fn subscribers_see_the_whole_run() {
    let recorder = Arc::new(Recorder::default());
    let cfg = Config {
        workers: 2,
        progress_every: 10,
        ..Config::default()
    };
    let sup: Supervisor<u64, u64> =
        SupervisorBuilder::new(cfg, |n: u64, _: Rc<()>| async move { Ok::<_, TaskError>(n + 1) })
            .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
            .build();

    let out = sup
        .scope(|sup| {
            for n in 0..50 {
                sup.enqueue(n)?;
            }
            Ok(())
        })
        .expect("results");
    assert_eq!(out.len(), 50);

    // The listener is drained before `scope` returns.
    assert_eq!(recorder.count(EventKind::SupervisorStarted), 1);
    let started = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .find(|e| e.kind == EventKind::SupervisorStarted)
        .map(|e| (e.workers, e.completed));
    assert_eq!(started, Some((Some(2), None)));
    assert_eq!(recorder.count(EventKind::WorkerStarted), 2);
    assert_eq!(recorder.count(EventKind::WorkerDraining), 2);
    assert_eq!(recorder.count(EventKind::WorkerStopped), 2);
    assert_eq!(recorder.kinds().last(), Some(&EventKind::SupervisorStopped));

    let mut progress: Vec<u64> = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind == EventKind::Progress)
        .filter_map(|e| e.sequence)
        .collect();
    progress.sort_unstable();
    assert_eq!(progress, vec![10, 20, 30, 40]);
}

#[test]
fn retries_and_failures_are_reported() {
    let recorder = Arc::new(Recorder::default());
    let cfg = Config {
        workers: 1,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: BackoffPolicy::constant(Duration::from_millis(1)),
            ..RetryPolicy::default()
        },
        ..Config::default()
    };
    let task = |_: u8, _: Rc<()>| async { Err::<u8, _>(TaskError::status(429, "slow down")) };
    let sup: Supervisor<u8, u8> = SupervisorBuilder::new(cfg, task)
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .build();

    let err = sup
        .scope(|sup| {
            sup.enqueue(7)?;
            Ok(())
        })
        .expect_err("429 forever exhausts the attempts");
    assert_eq!(err.task_error().and_then(TaskError::status_code), Some(429));

    let events = recorder.events.lock().unwrap().clone();
    let retries: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::TaskRetrying)
        .collect();
    assert_eq!(retries.len(), 2);
    assert_eq!(retries[0].attempt, Some(1));
    assert_eq!(retries[1].attempt, Some(2));
    assert!(retries.iter().all(|e| e.delay_ms == Some(1)));

    assert_eq!(recorder.count(EventKind::TaskFailed), 1);
    assert_eq!(recorder.count(EventKind::WorkerFailed), 1);
    let stopped = events
        .iter()
        .find(|e| e.kind == EventKind::SupervisorStopped)
        .expect("stopped event");
    assert!(stopped.reason.as_deref().unwrap_or_default().contains("429"));
}
