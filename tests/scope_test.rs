use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use taskscope::{Propagating, Scope, ScopeState, TaskState};

#[tokio::test]
async fn test_launch_runs_to_completion() {
    let scope = Scope::new(Propagating);
    let counter = Arc::new(AtomicUsize::new(0));

    let handle = scope.launch({
        let counter = counter.clone();
        move |_ctx| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    handle.join().await.expect("task should complete");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_await_all_waits_for_every_child() {
    let scope = Scope::new(Propagating);
    let counter = Arc::new(AtomicUsize::new(0));

    for i in 0..5u64 {
        scope.launch({
            let counter = counter.clone();
            move |ctx| async move {
                ctx.sleep(Duration::from_millis(10 * (i + 1))).await?;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    scope.await_all().await.expect("all children complete");
    assert_eq!(counter.load(Ordering::SeqCst), 5);
    // A scope whose children complete normally stays open for more work.
    assert_eq!(scope.state(), ScopeState::Open);
}

#[tokio::test]
async fn test_nested_child_completes_before_parent() {
    let scope = Scope::new(Propagating);
    let child_done = Arc::new(AtomicBool::new(false));

    let parent = scope.launch({
        let child_done = child_done.clone();
        move |ctx| async move {
            // The child outlasts the parent body; structured completion
            // still makes the parent wait for it.
            ctx.launch({
                let child_done = child_done.clone();
                move |ctx| async move {
                    ctx.sleep(Duration::from_millis(80)).await?;
                    child_done.store(true, Ordering::SeqCst);
                    Ok(())
                }
            });
            Ok(())
        }
    });

    parent.join().await.expect("parent should complete");
    assert!(child_done.load(Ordering::SeqCst));
    assert_eq!(parent.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_launch_into_cancelled_scope_never_runs_body() {
    let scope = Scope::new(Propagating);
    scope.cancel();

    let ran = Arc::new(AtomicBool::new(false));
    let handle = scope.launch({
        let ran = ran.clone();
        move |_ctx| async move {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        }
    });

    // Join is silent on cancellation; the state tells the story.
    handle.join().await.expect("cancelled join returns cleanly");
    assert_eq!(handle.state(), TaskState::Cancelled);
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancel_and_wait_closes_scope() {
    let scope = Scope::builder().name("teardown").build();
    assert_eq!(scope.state(), ScopeState::Open);

    scope.launch(|ctx| async move {
        ctx.sleep(Duration::from_secs(60)).await?;
        Ok(())
    });

    scope.cancel_and_wait().await;
    assert_eq!(scope.state(), ScopeState::Closed);

    // Idempotent.
    scope.cancel_and_wait().await;
    assert_eq!(scope.state(), ScopeState::Closed);
}

#[tokio::test]
async fn test_join_silent_on_cancelled_task() {
    let scope = Scope::new(Propagating);
    let handle = scope.launch(|ctx| async move {
        ctx.sleep(Duration::from_secs(60)).await?;
        Ok(())
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();
    let joined = handle.join().await;

    assert!(joined.is_ok(), "cancellation is not an error to a joiner");
    assert_eq!(handle.state(), TaskState::Cancelled);
}
