use std::sync::Arc;
use thiserror::Error;

/// Terminal error of a single task.
///
/// Cancellation is deliberately its own variant and not a failure: a joiner
/// that only cares about failures can match on `Failed`/`Panicked` and treat
/// `Cancelled` as a clean exit.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    /// The work function returned an error.
    #[error("task failed: {0}")]
    Failed(Arc<anyhow::Error>),
    /// The work function panicked; the payload is kept as a message.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn from_work_error(err: anyhow::Error) -> Self {
        Self::Failed(Arc::new(err))
    }
}

/// Aggregated failure of a whole scope.
///
/// `primary` is the first error by occurrence time; every later error from the
/// same scope is retained in `suppressed` and never replaces the primary.
#[derive(Debug, Clone, Error)]
#[error("scope failed: {} ({} suppressed)", .primary, .suppressed.len())]
pub struct AggregateError {
    pub primary: TaskError,
    pub suppressed: Vec<TaskError>,
}
