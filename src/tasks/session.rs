//! # Per-worker sessions.
//!
//! A [`SessionProvider`] produces one session (an authenticated client, a
//! connection pool, ...) per worker. It is opened once when the worker starts,
//! shared by every task on that worker through an `Rc`, and closed once when
//! the worker stops. Sessions never cross worker boundaries, so they need not
//! be `Send`.
//!
//! Use [`NoSession`] when task functions do not need one.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use fanvisor::{SessionProvider, TaskError};
//!
//! struct Client { base: String }
//!
//! struct Clients { base: String }
//!
//! #[async_trait(?Send)]
//! impl SessionProvider for Clients {
//!     type Session = Client;
//!
//!     async fn open(&self, _worker: usize) -> Result<Client, TaskError> {
//!         // fetch a token, build the client...
//!         Ok(Client { base: self.base.clone() })
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::TaskError;

/// Factory for the per-worker session capability.
#[async_trait(?Send)]
pub trait SessionProvider: Send + Sync + 'static {
    /// Session type handed to task functions.
    type Session: 'static;

    /// Opens the session for `worker`. Called once per worker, on its event loop.
    ///
    /// An error aborts the worker before it runs any task.
    async fn open(&self, worker: usize) -> Result<Self::Session, TaskError>;

    /// Tears the session down. Called once per worker after its last task.
    async fn close(&self, _worker: usize, _session: Self::Session) {}
}

/// Provider for task functions that do not use a session.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSession;

#[async_trait(?Send)]
impl SessionProvider for NoSession {
    type Session = ();

    async fn open(&self, _worker: usize) -> Result<(), TaskError> {
        Ok(())
    }
}
