//! Process-wide sink for errors that reach the top of a scope hierarchy with
//! nobody left to observe them. Never silently dropped: without an installed
//! hook they are logged through `tracing`.

use std::sync::{Arc, RwLock};
use uuid::Uuid;
use crate::error::TaskError;

type Hook = dyn Fn(Uuid, &TaskError) + Send + Sync;

static HOOK: RwLock<Option<Arc<Hook>>> = RwLock::new(None);

/// Installs the process-wide uncaught-error hook, replacing any previous one.
pub fn set_uncaught_error_hook<F>(hook: F)
where
    F: Fn(Uuid, &TaskError) + Send + Sync + 'static,
{
    *HOOK.write().unwrap() = Some(Arc::new(hook));
}

pub(crate) fn report_uncaught(task: Uuid, error: &TaskError) {
    let hook = HOOK.read().unwrap().clone();
    match hook {
        Some(hook) => hook(task, error),
        None => tracing::error!(task_id = %task, error = %error, "uncaught task error"),
    }
}
