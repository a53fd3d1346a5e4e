use std::sync::Arc;

use crate::policy::{Propagating, SupervisorPolicy};
use super::{Scope, ScopeInner};

/// Configures and builds a [`Scope`].
///
/// The name only shows up in log events; the policy defaults to
/// [`Propagating`].
pub struct ScopeBuilder {
    name: Option<String>,
    policy: Arc<dyn SupervisorPolicy>,
}

impl ScopeBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            policy: Arc::new(Propagating),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn policy(mut self, policy: impl SupervisorPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn build(self) -> Scope {
        let name: Arc<str> = self.name.unwrap_or_else(|| "scope".to_string()).into();
        Scope::from_inner(Arc::new(ScopeInner::new(name, self.policy)))
    }
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
