//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Worker threads,
//! task runners and the supervisor publish into it; the supervisor's event
//! thread is the single receiver and fans out to the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ```text
//! worker 0 ──┐
//! worker 1 ──┼──► Bus ──► event thread ──► SubscriberSet
//! worker N ──┤
//! Supervisor ┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: safe to call from any thread, inside or outside a runtime.
//! - **Bounded capacity**: slow receivers get `RecvError::Lagged(n)` and skip `n` items.
//! - **No persistence**: events are lost if there are no active receivers.
//! - The channel closes once every `Bus` clone is dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
