//! # Task function abstraction.
//!
//! A [`TaskFunction`] turns one payload plus the worker's session into a
//! future producing one value. It is invoked on the worker's single-threaded
//! event loop, so the returned future does **not** need to be `Send`; only the
//! function itself crosses into the worker threads.
//!
//! Any `Fn(P, Rc<S>) -> impl Future<Output = Result<T, TaskError>>` closure is
//! a task function. The closure is called once per attempt, with a fresh clone
//! of the payload, so it must not rely on state consumed by an earlier attempt.
//!
//! # Example
//! ```
//! use std::rc::Rc;
//! use fanvisor::{TaskError, TaskFunction};
//!
//! let double = |n: u64, _session: Rc<()>| async move {
//!     if n == u64::MAX {
//!         return Err(TaskError::fatal("overflow"));
//!     }
//!     Ok::<_, TaskError>(n * 2)
//! };
//!
//! fn assert_task<F: TaskFunction<u64, ()>>(_: &F) {}
//! assert_task(&double);
//! ```

use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::error::TaskError;

/// Future returned by a [`TaskFunction`].
pub type TaskFuture<T> = LocalBoxFuture<'static, Result<T, TaskError>>;

/// # Asynchronous remote call applied to every enqueued payload.
pub trait TaskFunction<P, S>: Send + Sync + 'static {
    /// Value produced on success; moved back to the caller's thread.
    type Output: Send + 'static;

    /// Starts one attempt for `payload` using the worker's `session`.
    fn invoke(&self, payload: P, session: Rc<S>) -> TaskFuture<Self::Output>;
}

impl<P, S, T, F, Fut> TaskFunction<P, S> for F
where
    F: Fn(P, Rc<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, TaskError>> + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn invoke(&self, payload: P, session: Rc<S>) -> TaskFuture<T> {
        Box::pin((self)(payload, session))
    }
}
