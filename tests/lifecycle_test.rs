use std::sync::Arc;
use std::time::Duration;

use taskscope::{Isolating, LifecycleOwner, OnDestroy, Propagating, ScopeState, TaskState};

#[tokio::test]
async fn test_destroy_tears_down_registered_scopes() {
    let owner = LifecycleOwner::new();
    let ui_scope = owner.scope(Propagating);
    let io_scope = owner.scope(Isolating);

    let task = ui_scope.launch(|ctx| async move {
        ctx.sleep(Duration::from_secs(60)).await?;
        Ok(())
    });
    io_scope.launch(|ctx| async move {
        ctx.sleep(Duration::from_secs(60)).await?;
        Ok(())
    });

    owner.destroy().await;

    assert_eq!(ui_scope.state(), ScopeState::Closed);
    assert_eq!(io_scope.state(), ScopeState::Closed);
    assert_eq!(task.state(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_on_destroy_capability() {
    let owner = Arc::new(LifecycleOwner::new());
    let scope = owner.scope(Propagating);
    scope.launch(|ctx| async move {
        ctx.sleep(Duration::from_secs(60)).await?;
        Ok(())
    });

    // The host only sees the capability, not the owner type.
    let capability: Arc<dyn OnDestroy> = owner.clone();
    capability.on_destroy().await;

    assert_eq!(scope.state(), ScopeState::Closed);
}

#[tokio::test]
async fn test_destroyed_owner_scope_rejects_new_work() {
    let owner = LifecycleOwner::new();
    let scope = owner.scope(Propagating);
    owner.destroy().await;

    let handle = scope.launch(|_ctx| async move { Ok(()) });
    handle.join().await.unwrap();
    assert_eq!(handle.state(), TaskState::Cancelled);
}
