use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Cooperative cancellation flag.
///
/// Monotonic: once triggered it never resets. Running work is expected to
/// poll it between logical steps (via `TaskContext::checkpoint` or
/// `TaskContext::sleep`); nothing is ever preempted mid-step.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    set: AtomicBool,
    notify: Notify,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                set: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Sets the flag. Idempotent; waiters are woken exactly once.
    pub fn trigger(&self) {
        if !self.inner.set.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::SeqCst)
    }

    /// Resolves once the signal has been triggered (immediately if it
    /// already was).
    pub async fn fired(&self) {
        wait_until(&self.inner.notify, || self.is_set()).await;
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Parks the caller on `notify` until `ready` holds.
///
/// The condition is re-checked after registering the waiter so a wake-up
/// racing with the check is never lost.
pub(crate) async fn wait_until(notify: &Notify, ready: impl Fn() -> bool) {
    loop {
        if ready() {
            return;
        }
        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if ready() {
            return;
        }
        notified.await;
    }
}
