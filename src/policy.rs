use std::fmt::Debug;
use uuid::Uuid;
use crate::error::TaskError;

/// What a scope should do after one of its children failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Cancel all sibling tasks; the failure is carried up to the parent.
    CancelSiblings,
    /// Record the failure on the failed child alone.
    Isolate,
}

/// Strategy consulted every time a child task transitions to Failed.
///
/// The two built-in policies are [`Propagating`] and [`Isolating`]; custom
/// implementations (retry budgets, error-class filters, ...) only need this
/// one decision function.
pub trait SupervisorPolicy: Send + Sync + Debug + 'static {
    fn on_child_failed(&self, child: Uuid, error: &TaskError) -> FailureAction;
}

/// Fail-fast: the first failure cancels every sibling and is re-raised by
/// `Scope::await_all` once the whole child set has terminated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Propagating;

impl SupervisorPolicy for Propagating {
    fn on_child_failed(&self, _child: Uuid, _error: &TaskError) -> FailureAction {
        FailureAction::CancelSiblings
    }
}

/// Supervisor behavior: a failed child stays failed on its own, siblings and
/// the owning scope are untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Isolating;

impl SupervisorPolicy for Isolating {
    fn on_child_failed(&self, _child: Uuid, _error: &TaskError) -> FailureAction {
        FailureAction::Isolate
    }
}
