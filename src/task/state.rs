/// Lifecycle state of a task node.
///
/// Transitions are monotonic:
/// `Created → Active → {Cancelling → Cancelled | Completed | Failed}`.
/// There is no way out of a terminal state, and a task that has entered
/// `Cancelling` can only terminate as `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Scheduled but not yet running (lazy start, or pre-spawn window).
    Created,
    /// The work function is running.
    Active,
    /// Cancellation requested; the work has not yet reached a checkpoint.
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }

    pub(crate) fn can_advance(self, next: TaskState) -> bool {
        match self {
            Self::Created => matches!(next, Self::Active | Self::Cancelling),
            Self::Active => matches!(next, Self::Cancelling | Self::Completed | Self::Failed),
            Self::Cancelling => matches!(next, Self::Cancelled),
            Self::Cancelled | Self::Completed | Self::Failed => false,
        }
    }
}
