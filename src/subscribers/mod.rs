//! # Event subscribers.
//!
//! ```text
//! Worker / TaskRunner ── publish(Event) ──► Bus ──► event thread ──► SubscriberSet
//!                                                                       │
//!                                                        ┌──────────────┼──────────┐
//!                                                        ▼              ▼          ▼
//!                                                    LogWriter       Metrics     Custom
//! ```

mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
mod embedded;

pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
