use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use uuid::Uuid;

use crate::error::TaskError;
use crate::handle::{ResultHandle, StartMode};
use crate::scope::Scope;
use crate::signal::CancellationSignal;
use crate::task::handle::TaskHandle;
use crate::task::node::TaskNode;

/// Handed to every work function. Carries the task's cancellation signal and
/// lets the work spawn nested children under its own node.
///
/// Cancellation is cooperative: the engine never preempts a running body.
/// Work that can run long should call [`checkpoint`](Self::checkpoint)
/// between logical steps, or use [`sleep`](Self::sleep) instead of a raw
/// timer, so a cancel request is observed promptly.
pub struct TaskContext {
    pub(crate) node: Arc<TaskNode>,
    pub(crate) scope: Scope,
}

impl TaskContext {
    pub(crate) fn new(node: Arc<TaskNode>, scope: Scope) -> Self {
        Self { node, scope }
    }

    pub fn id(&self) -> Uuid {
        self.node.id
    }

    /// The raw signal, for handing to work that manages its own polling.
    pub fn signal(&self) -> CancellationSignal {
        self.node.signal.clone()
    }

    /// True once cancellation has been requested for this task. Reports the
    /// raw signal even inside a non-cancellable section.
    pub fn is_cancelled(&self) -> bool {
        self.node.signal.is_set()
    }

    /// Cooperative poll point: returns `Err(TaskError::Cancelled)` once
    /// cancellation has been requested, unless a non-cancellable section is
    /// active.
    pub fn checkpoint(&self) -> Result<()> {
        if self.node.signal.is_set() && !self.node.is_masked() {
            return Err(TaskError::Cancelled.into());
        }
        Ok(())
    }

    /// Cancellation-aware delay: suspends for `duration`, returning early
    /// with `Err(TaskError::Cancelled)` if the signal fires first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        if self.node.is_masked() {
            tokio::time::sleep(duration).await;
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = self.node.signal.fired() => Err(TaskError::Cancelled.into()),
        }
    }

    /// Runs `block` with the cancellation signal masked: checkpoints and
    /// sleeps inside it do not observe a pending cancel. The enclosing task
    /// stays Cancelling until the block (and the rest of the body) finishes,
    /// which is what makes guaranteed-cleanup sections possible.
    pub async fn run_non_cancellable<F: Future>(&self, block: F) -> F::Output {
        let _guard = self.node.mask_guard();
        block.await
    }

    /// Spawns a nested fire-and-forget child under this task. The current
    /// task will not complete before the child terminates.
    pub fn launch<F, Fut>(&self, work: F) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.scope.launch_under(Some(&self.node), work)
    }

    /// Spawns a nested child bound to a result handle (eager start).
    pub fn spawn_async<T, F, Fut>(&self, work: F) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.scope
            .spawn_async_under(Some(&self.node), StartMode::Eager, work)
    }
}
