//! # Work items and lane messages.

/// One unit of work: a payload tagged with its submission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem<P> {
    /// Position in submission order, unique per supervisor.
    pub sequence: u64,
    /// Value passed to the task function.
    pub payload: P,
}

/// Value produced for one work item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskResult<T> {
    /// Sequence of the originating [`WorkItem`].
    pub sequence: u64,
    /// Value returned by the task function.
    pub value: T,
}

/// Message carried by a lane.
#[derive(Debug)]
pub(crate) enum LaneMessage<P> {
    /// Work to schedule.
    Item(WorkItem<P>),
    /// Terminal sentinel: finish in-flight work and stop.
    Close,
}
