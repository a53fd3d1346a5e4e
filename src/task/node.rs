use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::TaskError;
use crate::policy::{FailureAction, SupervisorPolicy};
use crate::report;
use crate::scope::ScopeInner;
use crate::signal::{CancellationSignal, wait_until};
use crate::task::state::TaskState;

/// How the body of a task ended. Mapped onto a terminal [`TaskState`] by
/// [`TaskNode::finalize`], which also folds in cancellation and pending
/// child failures.
pub(crate) enum Outcome {
    Completed,
    Cancelled,
    Failed(TaskError),
}

/// A unit of concurrent work in the tree.
///
/// Mutable state (lifecycle state, captured error) is only written by the
/// completion driver and the cancel path; everything else reads snapshots.
pub(crate) struct TaskNode {
    pub(crate) id: Uuid,
    pub(crate) signal: CancellationSignal,
    state: Mutex<TaskState>,
    children: DashMap<Uuid, Arc<TaskNode>>,
    parent: Option<Weak<TaskNode>>,
    scope: Weak<ScopeInner>,
    policy: Arc<dyn SupervisorPolicy>,
    /// Error carried by this task, kept even when the terminal state ends up
    /// as Cancelled so late failures survive as suppressed diagnostics.
    error: Mutex<Option<TaskError>>,
    /// First failure among children awaiting this node's own termination.
    pending_failure: Mutex<Option<TaskError>>,
    /// Depth of enclosing non-cancellable sections.
    mask: AtomicUsize,
    has_handle: bool,
    terminal: Notify,
    child_done: Notify,
}

impl TaskNode {
    pub(crate) fn new(
        policy: Arc<dyn SupervisorPolicy>,
        parent: Option<Weak<TaskNode>>,
        scope: Weak<ScopeInner>,
        has_handle: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            signal: CancellationSignal::new(),
            state: Mutex::new(TaskState::Created),
            children: DashMap::new(),
            parent,
            scope,
            policy,
            error: Mutex::new(None),
            pending_failure: Mutex::new(None),
            mask: AtomicUsize::new(0),
            has_handle,
            terminal: Notify::new(),
            child_done: Notify::new(),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn captured_error(&self) -> Option<TaskError> {
        self.error.lock().unwrap().clone()
    }

    pub(crate) fn register_child(&self, child: Arc<TaskNode>) {
        self.children.insert(child.id, child);
    }

    /// Created → Active. Returns false when the task was cancelled before it
    /// ever started; the body must not be spawned in that case.
    pub(crate) fn mark_active(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        if *st == TaskState::Created {
            *st = TaskState::Active;
            drop(st);
            debug!(task_id = %self.id, "task active");
            true
        } else {
            false
        }
    }

    /// Requests cancellation: idempotent, non-blocking, recursive over
    /// children. Termination is observed separately via `wait_terminal`.
    pub(crate) fn cancel(self: &Arc<Self>) {
        let never_started = {
            let mut st = self.state.lock().unwrap();
            match *st {
                TaskState::Created => {
                    *st = TaskState::Cancelling;
                    true
                }
                TaskState::Active => {
                    *st = TaskState::Cancelling;
                    false
                }
                // Already cancelling or terminal: signal and fan-out have
                // run once, a second request changes nothing.
                _ => return,
            }
        };
        debug!(task_id = %self.id, "task cancelling");
        self.signal.trigger();
        // Snapshot first: a never-started child finalizes synchronously
        // inside cancel() and unregisters itself from this map.
        let children: Vec<Arc<TaskNode>> = self.children.iter().map(|c| c.value().clone()).collect();
        for child in children {
            child.cancel();
        }
        if never_started {
            // No body was ever spawned, so there is no completion driver to
            // finalize this node.
            self.finalize(Outcome::Cancelled);
        }
    }

    /// Settles the node into its terminal state and reports upward.
    pub(crate) fn finalize(self: &Arc<Self>, outcome: Outcome) {
        let (prev, next, leftover) = {
            let mut st = self.state.lock().unwrap();
            if st.is_terminal() {
                return;
            }
            let prev = *st;
            let (body_state, mut carried) = match outcome {
                Outcome::Completed => (TaskState::Completed, None),
                Outcome::Cancelled => (TaskState::Cancelled, None),
                Outcome::Failed(err) => (TaskState::Failed, Some(err)),
            };
            let pending = self.pending_failure.lock().unwrap().take();
            let mut leftover = None;
            let next = if prev == TaskState::Cancelling {
                // The only exit from Cancelling. Any error observed on the
                // way out is kept for diagnostics but does not change state;
                // a child failure that was waiting on this node is handed
                // to the scope as a secondary instead.
                leftover = pending;
                TaskState::Cancelled
            } else if body_state != TaskState::Failed && pending.is_some() {
                // A clean or cancelled body inherits the first failure of
                // its children.
                carried = pending;
                TaskState::Failed
            } else {
                // The body's own failure wins; a concurrent child failure
                // stays visible as a secondary.
                leftover = pending;
                body_state
            };
            // Cancelled-by-signal bodies pass through Cancelling even when
            // the cancel request never went through `cancel()` itself.
            if prev == TaskState::Active && next == TaskState::Cancelled {
                *st = TaskState::Cancelling;
                debug_assert!(TaskState::Cancelling.can_advance(next));
            } else {
                debug_assert!(prev.can_advance(next));
            }
            *st = next;
            if let Some(err) = carried {
                *self.error.lock().unwrap() = Some(err);
            }
            (prev, next, leftover)
        };
        if let Some(err) = leftover {
            self.forward_secondary(self.id, err);
        }

        match next {
            TaskState::Failed => {
                if let Some(err) = self.captured_error() {
                    error!(task_id = %self.id, error = %err, "task failed");
                }
            }
            _ => debug!(task_id = %self.id, from = ?prev, to = ?next, "task terminal"),
        }

        // Unstarted lazy children must not outlive this task.
        let dormant: Vec<Arc<TaskNode>> = self.children.iter().map(|c| c.value().clone()).collect();
        for child in dormant {
            child.cancel();
        }

        // Report upward before waking joiners so the failure is recorded in
        // the parent/scope by the time a join or await_all observes the
        // terminal state.
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.on_child_terminal(self);
        } else if let Some(scope) = self.scope.upgrade() {
            scope.on_child_terminal(self);
        } else if let Some(err) = self.captured_error() {
            // The owning scope is gone; the error still must not vanish.
            report::report_uncaught(self.id, &err);
        }
        self.terminal.notify_waiters();
    }

    /// Invoked by a direct child once it reaches a terminal state.
    ///
    /// Failure propagation is decided here for nested tasks: under a
    /// propagating policy the first child failure cancels the siblings and
    /// is carried by this node once it terminates itself.
    fn on_child_terminal(self: &Arc<Self>, child: &Arc<TaskNode>) {
        match child.state() {
            TaskState::Failed => {
                if let Some(err) = child.captured_error() {
                    match self.policy.on_child_failed(child.id, &err) {
                        FailureAction::CancelSiblings => {
                            {
                                let mut pending = self.pending_failure.lock().unwrap();
                                if pending.is_none() {
                                    *pending = Some(err);
                                }
                            }
                            debug!(task_id = %self.id, failed_child = %child.id, "child failed, cancelling siblings");
                            self.signal.trigger();
                            let siblings: Vec<Arc<TaskNode>> = self
                                .children
                                .iter()
                                .filter(|c| *c.key() != child.id)
                                .map(|c| c.value().clone())
                                .collect();
                            for sibling in siblings {
                                sibling.cancel();
                            }
                        }
                        FailureAction::Isolate => {
                            if !child.has_handle {
                                report::report_uncaught(child.id, &err);
                            }
                        }
                    }
                }
            }
            TaskState::Cancelled => {
                // A work error that landed after the child was already
                // cancelling does not re-fail the tree, but it must stay
                // visible somewhere.
                if let Some(err) = child.captured_error() {
                    self.forward_secondary(child.id, err);
                }
            }
            _ => {}
        }
        self.children.remove(&child.id);
        self.child_done.notify_waiters();
    }

    /// Hands a non-primary error to the owning scope's aggregation window,
    /// or to the uncaught sink when the scope is gone.
    fn forward_secondary(&self, task: Uuid, err: TaskError) {
        match self.scope.upgrade() {
            Some(scope) => scope.record_suppressed(task, err),
            None => report::report_uncaught(task, &err),
        }
    }

    pub(crate) async fn wait_terminal(&self) {
        wait_until(&self.terminal, || self.state().is_terminal()).await;
    }

    /// A node may only terminate once its whole child set has; the
    /// completion driver parks here after the body returns.
    ///
    /// Terminal children unregister themselves only after their failure has
    /// been recorded on this node, so a still-registered child in a terminal
    /// state means its bookkeeping is not finished yet. Children still in
    /// `Created` are unstarted lazy tasks; they run no work and are
    /// cancelled when this node finalizes.
    pub(crate) async fn wait_children_terminal(&self) {
        wait_until(&self.child_done, || {
            self.children.iter().all(|c| c.value().state() == TaskState::Created)
        })
        .await;
    }

    pub(crate) fn is_masked(&self) -> bool {
        self.mask.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn mask_guard(&self) -> MaskGuard<'_> {
        self.mask.fetch_add(1, Ordering::SeqCst);
        MaskGuard { node: self }
    }

    pub(crate) fn has_handle(&self) -> bool {
        self.has_handle
    }
}

/// Keeps the cancellation mask raised for the lifetime of a
/// non-cancellable section.
pub(crate) struct MaskGuard<'a> {
    node: &'a TaskNode,
}

impl Drop for MaskGuard<'_> {
    fn drop(&mut self) {
        self.node.mask.fetch_sub(1, Ordering::SeqCst);
    }
}
