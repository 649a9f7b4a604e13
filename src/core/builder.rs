use std::fmt;
use std::sync::Arc;

use super::{config::Config, supervisor::Supervisor, worker::Launcher};
use crate::{
    subscribers::Subscribe,
    tasks::{NoSession, SessionProvider, TaskFunction},
};

/// Builder for a [`Supervisor`] with sessions and event subscribers.
///
/// ## Example
/// ```rust
/// use std::rc::Rc;
/// use async_trait::async_trait;
/// use fanvisor::{Config, SessionProvider, Supervisor, SupervisorBuilder, TaskError};
///
/// struct Prefix;
///
/// #[async_trait(?Send)]
/// impl SessionProvider for Prefix {
///     type Session = String;
///
///     async fn open(&self, worker: usize) -> Result<String, TaskError> {
///         Ok(format!("w{worker}"))
///     }
/// }
///
/// let cfg = Config { workers: 1, ..Config::default() };
/// let task = |n: u32, session: Rc<String>| async move {
///     Ok::<_, TaskError>(format!("{session}:{n}"))
/// };
/// let sup: Supervisor<u32, String> = SupervisorBuilder::new(cfg, task)
///     .with_sessions(Prefix)
///     .build();
///
/// let out = sup.scope(|sup| {
///     sup.enqueue(7)?;
///     Ok(())
/// });
/// assert_eq!(out, Ok(vec!["w0:7".to_string()]));
/// ```
pub struct SupervisorBuilder<F, Sp = NoSession> {
    cfg: Config,
    task: F,
    provider: Sp,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<F> SupervisorBuilder<F, NoSession> {
    /// Creates a builder for `task` with no sessions and no subscribers.
    pub fn new(cfg: Config, task: F) -> Self {
        Self {
            cfg,
            task,
            provider: NoSession,
            subscribers: Vec::new(),
        }
    }
}

impl<F, Sp> SupervisorBuilder<F, Sp> {
    /// Sets the provider that opens one session per worker.
    pub fn with_sessions<Sp2: SessionProvider>(self, provider: Sp2) -> SupervisorBuilder<F, Sp2> {
        SupervisorBuilder {
            cfg: self.cfg,
            task: self.task,
            provider,
            subscribers: self.subscribers,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (worker lifecycle, retries,
    /// failures, progress) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the supervisor. Nothing is launched until [`Supervisor::start`].
    pub fn build<P>(self) -> Supervisor<P, <F as TaskFunction<P, Sp::Session>>::Output>
    where
        Sp: SessionProvider,
        F: TaskFunction<P, Sp::Session>,
        P: Clone + fmt::Debug + Send + 'static,
    {
        let launcher = Launcher {
            task: Arc::new(self.task),
            provider: Arc::new(self.provider),
        };
        Supervisor::new_internal(self.cfg, Box::new(launcher), self.subscribers)
    }
}
