//! # Event listener thread.
//!
//! Subscribers run on a dedicated `fanvisor-events` thread with its own
//! current-thread runtime, so the supervisor itself stays synchronous.
//!
//! ```text
//! Bus.subscribe() ──► listener loop ──► SubscriberSet::emit(event)
//!                          │
//!                  stop token cancelled
//!                          ▼
//!          drain what is already buffered ──► SubscriberSet::shutdown()
//! ```

use std::sync::Arc;
use std::thread;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    error::RuntimeError,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Handle to the running listener thread.
pub(crate) struct EventListener {
    stop: CancellationToken,
    thread: thread::JoinHandle<()>,
}

impl EventListener {
    /// Subscribes to `bus` and starts delivering to `subscribers`.
    ///
    /// The receiver is created before this returns, so no event published
    /// afterwards is missed.
    pub fn spawn(subscribers: Vec<Arc<dyn Subscribe>>, bus: &Bus) -> Result<Self, RuntimeError> {
        let mut rx = bus.subscribe();
        let bus = bus.clone();
        let stop = CancellationToken::new();
        let token = stop.clone();

        let thread = thread::Builder::new()
            .name("fanvisor-events".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        warn!(error = %e, "event listener runtime failed; events are dropped");
                        return;
                    }
                };
                rt.block_on(async move {
                    let set = SubscriberSet::new(subscribers, bus);
                    loop {
                        tokio::select! {
                            biased;
                            res = rx.recv() => match res {
                                Ok(ev) => set.emit(ev),
                                Err(RecvError::Lagged(skipped)) => {
                                    warn!(skipped, "event listener lagged");
                                }
                                Err(RecvError::Closed) => break,
                            },
                            _ = token.cancelled() => break,
                        }
                    }
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => set.emit(ev),
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        }
                    }
                    set.shutdown().await;
                });
            })
            .map_err(|e| RuntimeError::Spawn {
                reason: e.to_string(),
            })?;

        Ok(Self { stop, thread })
    }

    /// Delivers buffered events, waits for subscribers to finish, and joins the thread.
    pub fn stop(self) {
        self.stop.cancel();
        if self.thread.join().is_err() {
            warn!("event listener thread panicked");
        }
    }
}
