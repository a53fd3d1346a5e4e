use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::TaskError;
use crate::task::node::TaskNode;
use crate::task::state::TaskState;

/// When the work behind a [`ResultHandle`] begins executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Run as soon as the handle is created.
    Eager,
    /// Run only once `start` or `await_result` is called.
    Lazy,
}

/// Single-assignment slot the completion driver writes the produced value
/// into, immediately before the node turns terminal.
pub(crate) struct Slot<T> {
    value: Mutex<Option<T>>,
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    pub(crate) fn put(&self, value: T) {
        *self.value.lock().unwrap() = Some(value);
    }

    fn take(&self) -> Option<T> {
        self.value.lock().unwrap().take()
    }
}

/// Future-like proxy for a value a task has not produced yet.
///
/// Resolves exactly once, to the value or to the task's terminal error.
/// A lazily-started handle performs no work at all until [`start`] or
/// [`await_result`] is called. Note the documented pitfall this preserves:
/// awaiting several lazy handles one by one without starting them first
/// runs the tasks sequentially, since each `await_result` must start and
/// finish its own task before the next one begins.
///
/// [`start`]: Self::start
/// [`await_result`]: Self::await_result
pub struct ResultHandle<T> {
    node: Arc<TaskNode>,
    slot: Arc<Slot<T>>,
    pending_start: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl<T> ResultHandle<T> {
    pub(crate) fn started(node: Arc<TaskNode>, slot: Arc<Slot<T>>) -> Self {
        Self {
            node,
            slot,
            pending_start: Mutex::new(None),
        }
    }

    pub(crate) fn deferred(
        node: Arc<TaskNode>,
        slot: Arc<Slot<T>>,
        start: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self {
            node,
            slot,
            pending_start: Mutex::new(Some(start)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.node.id
    }

    pub fn state(&self) -> TaskState {
        self.node.state()
    }

    /// Begins executing a lazily-started task. No-op for eager handles and
    /// on repeated calls.
    pub fn start(&self) {
        let pending = self.pending_start.lock().unwrap().take();
        if let Some(start) = pending {
            start();
        }
    }

    /// Requests cancellation. A lazy task cancelled before `start` never
    /// runs its work; the handle resolves as Cancelled.
    pub fn cancel(&self) {
        self.pending_start.lock().unwrap().take();
        self.node.cancel();
    }

    /// Suspends until the task is terminal and returns its value or error.
    /// Starts the task first if it is lazy and was never started.
    pub async fn await_result(self) -> Result<T, TaskError> {
        self.start();
        self.node.wait_terminal().await;
        match self.node.state() {
            TaskState::Completed => Ok(self
                .slot
                .take()
                .expect("completed task resolves exactly once")),
            TaskState::Failed => Err(self
                .node
                .captured_error()
                .unwrap_or(TaskError::Cancelled)),
            _ => Err(TaskError::Cancelled),
        }
    }
}
