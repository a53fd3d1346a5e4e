pub mod builder;

use std::future::Future;
use std::sync::{Arc, Mutex};
use anyhow::Result;
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AggregateError, TaskError};
use crate::handle::{ResultHandle, Slot, StartMode};
use crate::policy::{FailureAction, SupervisorPolicy};
use crate::report;
use crate::signal::{CancellationSignal, wait_until};
use crate::task::context::TaskContext;
use crate::task::handle::TaskHandle;
use crate::task::node::{Outcome, TaskNode};
use crate::task::state::TaskState;

pub use builder::ScopeBuilder;

/// Aggregate lifecycle of a scope.
///
/// `Closed` is terminal and reached only once every descendant task is
/// terminal; a scope whose children all complete normally stays `Open` and
/// keeps accepting new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Open,
    /// Cancellation has been issued; waiting for children to terminate.
    Closing,
    Closed,
}

/// Owner of a set of root tasks.
///
/// Enforces structured completion: [`await_all`](Scope::await_all) waits for
/// the whole child set, and cancellation propagates downward only, through
/// children and their descendants, never from a child up to the scope. Child
/// *failure* may propagate to siblings, governed by the scope's
/// [`SupervisorPolicy`].
///
/// Cloning is cheap and shares the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    id: Uuid,
    name: Arc<str>,
    policy: Arc<dyn SupervisorPolicy>,
    signal: CancellationSignal,
    state: Mutex<ScopeState>,
    roots: DashMap<Uuid, Arc<TaskNode>>,
    failure: Mutex<FailureWindow>,
    child_done: Notify,
}

#[derive(Default)]
struct FailureWindow {
    primary: Option<TaskError>,
    suppressed: Vec<TaskError>,
}

impl Scope {
    /// Creates a scope with the given supervisor policy and a default name.
    pub fn new(policy: impl SupervisorPolicy) -> Self {
        Self::builder().policy(policy).build()
    }

    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<ScopeInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> ScopeState {
        *self.inner.state.lock().unwrap()
    }

    /// Spawns a fire-and-forget root task.
    ///
    /// If the scope is already Closing or Closed the task is created
    /// Cancelling and its body never runs.
    pub fn launch<F, Fut>(&self, work: F) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.launch_under(None, work)
    }

    pub(crate) fn launch_under<F, Fut>(
        &self,
        parent: Option<&Arc<TaskNode>>,
        work: F,
    ) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let node = self.inner.new_node(parent, false);
        let ctx = TaskContext::new(node.clone(), self.clone());
        spawn_body::<(), _>(node.clone(), work(ctx), None);
        TaskHandle::new(node)
    }

    /// Like [`launch`](Scope::launch), but binds the produced value to a
    /// [`ResultHandle`]. The task starts immediately.
    pub fn spawn_async<T, F, Fut>(&self, work: F) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.spawn_async_under(None, StartMode::Eager, work)
    }

    /// Deferred-start variant: no work happens until `start` or
    /// `await_result` is called on the handle.
    pub fn spawn_async_lazy<T, F, Fut>(&self, work: F) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.spawn_async_under(None, StartMode::Lazy, work)
    }

    pub(crate) fn spawn_async_under<T, F, Fut>(
        &self,
        parent: Option<&Arc<TaskNode>>,
        mode: StartMode,
        work: F,
    ) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let node = self.inner.new_node(parent, true);
        let ctx = TaskContext::new(node.clone(), self.clone());
        let slot = Arc::new(Slot::new());
        let start = {
            let node = node.clone();
            let slot = slot.clone();
            move || spawn_body(node, work(ctx), Some(slot))
        };
        match mode {
            StartMode::Eager => {
                start();
                ResultHandle::started(node, slot)
            }
            StartMode::Lazy => ResultHandle::deferred(node, slot, Box::new(start)),
        }
    }

    /// Requests cancellation of every child without waiting. Pair with
    /// [`await_all`](Scope::await_all) or use
    /// [`cancel_and_wait`](Scope::cancel_and_wait) for deterministic
    /// teardown.
    pub fn cancel(&self) {
        self.inner.begin_close();
    }

    /// Cancels all children, then suspends until the scope is Closed.
    /// Idempotent; this is the lifecycle-bound destruction point.
    pub async fn cancel_and_wait(&self) {
        loop {
            self.inner.begin_close();
            self.inner.wait_roots_terminal().await;
            self.inner.maybe_close();
            if self.state() == ScopeState::Closed {
                return;
            }
        }
    }

    /// Suspends until every child is terminal.
    ///
    /// Under a propagating policy, if any child failed this re-raises the
    /// first-occurring error with later errors attached as suppressed, but
    /// only after the *whole* child set has terminated, so non-cancellable
    /// cleanup sections always finish first. Unstarted lazy tasks are
    /// dormant and do not hold up `await_all`.
    pub async fn await_all(&self) -> Result<(), AggregateError> {
        self.inner.wait_roots_terminal().await;
        let window = self.inner.failure.lock().unwrap();
        match &window.primary {
            Some(primary) => Err(AggregateError {
                primary: primary.clone(),
                suppressed: window.suppressed.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl ScopeInner {
    pub(crate) fn new(name: Arc<str>, policy: Arc<dyn SupervisorPolicy>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            policy,
            signal: CancellationSignal::new(),
            state: Mutex::new(ScopeState::Open),
            roots: DashMap::new(),
            failure: Mutex::new(FailureWindow::default()),
            child_done: Notify::new(),
        }
    }

    fn new_node(self: &Arc<Self>, parent: Option<&Arc<TaskNode>>, has_handle: bool) -> Arc<TaskNode> {
        let node = Arc::new(TaskNode::new(
            self.policy.clone(),
            parent.map(Arc::downgrade),
            Arc::downgrade(self),
            has_handle,
        ));
        match parent {
            Some(parent) => parent.register_child(node.clone()),
            None => {
                self.roots.insert(node.id, node.clone());
            }
        }
        debug!(scope = %self.name, task_id = %node.id, nested = parent.is_some(), "task created");
        // Inherit a cancellation already in flight: such a task is born
        // Cancelling and its body will never be spawned.
        let cancelling = match parent {
            Some(parent) => parent.signal.is_set(),
            None => self.signal.is_set(),
        };
        if cancelling {
            node.cancel();
        }
        node
    }

    /// Invoked by a root task once it reaches a terminal state. Consults the
    /// supervisor policy for failures and keeps the aggregation window.
    pub(crate) fn on_child_terminal(self: &Arc<Self>, child: &Arc<TaskNode>) {
        match child.state() {
            TaskState::Failed => {
                if let Some(err) = child.captured_error() {
                    match self.policy.on_child_failed(child.id, &err) {
                        FailureAction::CancelSiblings => {
                            debug!(scope = %self.name, failed_child = %child.id, "child failed, closing scope");
                            self.record_failure(err);
                            self.begin_close();
                        }
                        FailureAction::Isolate => {
                            if !child.has_handle() {
                                report::report_uncaught(child.id, &err);
                            }
                        }
                    }
                }
            }
            TaskState::Cancelled => {
                // A work error observed after cancellation was already
                // requested: kept as a suppressed secondary, never the
                // surfaced error.
                if let Some(err) = child.captured_error() {
                    self.record_suppressed(child.id, err);
                }
            }
            _ => {}
        }
        self.roots.remove(&child.id);
        self.child_done.notify_waiters();
        self.maybe_close();
    }

    fn record_failure(&self, err: TaskError) {
        let mut window = self.failure.lock().unwrap();
        if window.primary.is_none() {
            window.primary = Some(err);
        } else {
            window.suppressed.push(err);
        }
    }

    /// Retains a secondary error. With no primary to attach it to (the scope
    /// was cancelled deliberately, not failed) `await_all` would never show
    /// it, so it goes to the uncaught sink instead.
    pub(crate) fn record_suppressed(&self, task: Uuid, err: TaskError) {
        let mut window = self.failure.lock().unwrap();
        if window.primary.is_some() {
            window.suppressed.push(err);
        } else {
            drop(window);
            report::report_uncaught(task, &err);
        }
    }

    /// Issues cancellation: Open → Closing, then fans out to every root.
    fn begin_close(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ScopeState::Open {
                *state = ScopeState::Closing;
                debug!(scope = %self.name, "scope closing");
            }
        }
        self.signal.trigger();
        // Snapshot first: a never-started root finalizes synchronously
        // inside cancel() and unregisters itself from this map.
        let roots: Vec<Arc<TaskNode>> = self.roots.iter().map(|r| r.value().clone()).collect();
        for root in roots {
            root.cancel();
        }
        self.maybe_close();
    }

    fn maybe_close(&self) {
        let mut state = self.state.lock().unwrap();
        // Terminal roots unregister after their bookkeeping; an empty
        // registry means every descendant is terminal and accounted for.
        if *state == ScopeState::Closing && self.roots.is_empty() {
            *state = ScopeState::Closed;
            drop(state);
            debug!(scope = %self.name, "scope closed");
            self.child_done.notify_waiters();
        }
    }

    /// Parks until every registered root has terminated *and* been
    /// accounted for (failure recording happens before a root
    /// unregisters). Roots still in `Created` are unstarted lazy tasks;
    /// they are dormant, not running work, and do not hold this up.
    async fn wait_roots_terminal(&self) {
        wait_until(&self.child_done, || {
            self.roots
                .iter()
                .all(|n| n.value().state() == TaskState::Created)
        })
        .await;
    }
}

/// Schedules a task body and its completion driver.
///
/// The body runs as its own tokio task so a panic is caught at the
/// `JoinHandle` boundary and recovered into the node's terminal state;
/// work errors never take the engine down. The driver waits for the node's
/// children before finalizing, which is what makes completion structured.
pub(crate) fn spawn_body<T, Fut>(node: Arc<TaskNode>, body: Fut, slot: Option<Arc<Slot<T>>>)
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    if !node.mark_active() {
        // Cancelled before it ever started: the body is dropped unpolled.
        return;
    }
    let body = tokio::spawn(body);
    tokio::spawn(async move {
        let joined = body.await;
        node.wait_children_terminal().await;
        let outcome = match joined {
            Ok(Ok(value)) => {
                if let Some(slot) = &slot {
                    slot.put(value);
                }
                Outcome::Completed
            }
            Ok(Err(err)) => match err.downcast::<TaskError>() {
                Ok(TaskError::Cancelled) => Outcome::Cancelled,
                Ok(other) => Outcome::Failed(other),
                Err(err) => Outcome::Failed(TaskError::from_work_error(err)),
            },
            Err(join_err) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                Outcome::Failed(TaskError::Panicked(message))
            }
            // The runtime aborted the body (shutdown); treat as cancelled.
            Err(_) => Outcome::Cancelled,
        };
        node.finalize(outcome);
    });
}
