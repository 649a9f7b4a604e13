//! Runtime core: lanes, workers and lifecycle.
//!
//! The public API from this module is [`Supervisor`], its [`SupervisorBuilder`]
//! and [`Config`]; everything else is wiring.
//!
//! Internal modules:
//! - [`runner`]: runs one item with retries, cancellation and event publishing;
//! - [`worker`]: per-lane event loop with the in-flight cap and fail-fast cancellation;
//! - [`supervisor`]: lane assignment, start/stop lifecycle, ordered merge;
//! - [`listener`]: hosts subscribers on their own thread.

mod builder;
mod config;
mod listener;
mod runner;
mod supervisor;
mod worker;

pub use builder::SupervisorBuilder;
pub use config::{Config, IN_FLIGHT_PER_WORKER};
pub use supervisor::{Supervisor, SupervisorState};
pub use worker::WorkerState;
