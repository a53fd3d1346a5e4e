//! Binding between a host lifecycle owner and scope teardown.
//!
//! The host-side coupling is a single capability: "destroy now" maps to
//! `cancel_and_wait` on every scope the owner holds. There is deliberately
//! no ambient default scope; every scope is created by and held on an
//! explicit owner.

use std::sync::Mutex;
use async_trait::async_trait;

use crate::policy::SupervisorPolicy;
use crate::scope::Scope;

/// Capability a host component implements so its teardown event reaches the
/// scopes it owns.
#[async_trait]
pub trait OnDestroy: Send + Sync {
    async fn on_destroy(&self);
}

/// Holds scopes on behalf of a host component (a screen, a controller, a
/// service) and tears them down deterministically on destroy.
pub struct LifecycleOwner {
    scopes: Mutex<Vec<Scope>>,
}

impl LifecycleOwner {
    pub fn new() -> Self {
        Self {
            scopes: Mutex::new(Vec::new()),
        }
    }

    /// Creates a scope with the given policy, registered for teardown.
    pub fn scope(&self, policy: impl SupervisorPolicy) -> Scope {
        let scope = Scope::new(policy);
        self.register(scope.clone());
        scope
    }

    /// Registers an externally created scope for teardown.
    pub fn register(&self, scope: Scope) {
        self.scopes.lock().unwrap().push(scope);
    }

    /// Cancels every registered scope and waits until each one is Closed.
    pub async fn destroy(&self) {
        let scopes: Vec<Scope> = self.scopes.lock().unwrap().drain(..).collect();
        for scope in scopes {
            scope.cancel_and_wait().await;
        }
    }
}

impl Default for LifecycleOwner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OnDestroy for LifecycleOwner {
    async fn on_destroy(&self) {
        self.destroy().await;
    }
}
