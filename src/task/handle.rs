use std::sync::Arc;
use uuid::Uuid;

use crate::error::TaskError;
use crate::task::node::TaskNode;
use crate::task::state::TaskState;

/// External view of a launched task.
///
/// Cheap to clone; holding or dropping a handle has no effect on the task
/// itself (ownership stays with the scope).
#[derive(Clone)]
pub struct TaskHandle {
    node: Arc<TaskNode>,
}

impl TaskHandle {
    pub(crate) fn new(node: Arc<TaskNode>) -> Self {
        Self { node }
    }

    pub fn id(&self) -> Uuid {
        self.node.id
    }

    /// Snapshot of the task's lifecycle state.
    pub fn state(&self) -> TaskState {
        self.node.state()
    }

    /// Requests cancellation of this task and all of its descendants.
    /// Idempotent and non-blocking; pair with [`join`](Self::join) to wait
    /// for actual termination.
    pub fn cancel(&self) {
        self.node.cancel();
    }

    /// Suspends until the task is terminal.
    ///
    /// Returns `Ok(())` for both Completed and Cancelled: cancellation is a
    /// requested early exit, not an error, so join stays silent about it.
    /// Callers that need to tell the two apart inspect [`state`](Self::state)
    /// after joining. A Failed task re-raises its captured error.
    pub async fn join(&self) -> Result<(), TaskError> {
        self.node.wait_terminal().await;
        match self.node.state() {
            TaskState::Failed => Err(self
                .node
                .captured_error()
                .unwrap_or(TaskError::Cancelled)),
            _ => Ok(()),
        }
    }
}
