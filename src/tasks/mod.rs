//! # Task abstractions.
//!
//! - [`TaskFunction`] - the remote call applied to every payload
//! - [`SessionProvider`] / [`NoSession`] - per-worker session capability
//! - [`WorkItem`] / [`TaskResult`] - sequence-tagged input and output

mod item;
mod session;
mod task;

pub(crate) use item::LaneMessage;
pub use item::{TaskResult, WorkItem};
pub use session::{NoSession, SessionProvider};
pub use task::{TaskFunction, TaskFuture};
