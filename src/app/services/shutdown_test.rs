use tokio::sync::oneshot;

use super::*;

#[tokio::test]
async fn test_wait_idle_without_tasks() {
    let pending = PendingTasks::new();
    ShutdownCoordinator::new(pending)
        .with_timeout(Duration::from_millis(100))
        .wait_for_completion()
        .await
        .expect("nothing pending");
}

#[tokio::test]
async fn test_waits_for_tracked_task() {
    let pending = PendingTasks::new();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    pending.track(tokio::spawn(async move {
        let _ = release_rx.await;
    }));
    assert_eq!(pending.count(), 1);

    let waiter = tokio::spawn(
        ShutdownCoordinator::new(Arc::clone(&pending))
            .with_timeout(Duration::from_secs(5))
            .wait_for_completion(),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    release_tx.send(()).expect("task is waiting");
    waiter
        .await
        .expect("waiter panicked")
        .expect("drained in time");
    assert_eq!(pending.count(), 0);
}

#[tokio::test]
async fn test_timeout_reports_pending_count() {
    let pending = PendingTasks::new();
    let (_hold_tx, hold_rx) = oneshot::channel::<()>();
    pending.track(tokio::spawn(async move {
        let _ = hold_rx.await;
    }));

    let err = ShutdownCoordinator::new(Arc::clone(&pending))
        .with_timeout(Duration::from_millis(30))
        .wait_for_completion()
        .await
        .expect_err("task never finishes");
    assert_eq!(
        err.to_string(),
        "shutdown timeout reached with 1 tasks pending"
    );
}

#[tokio::test]
async fn test_panicking_task_still_counts_down() {
    let pending = PendingTasks::new();
    pending.track(tokio::spawn(async { panic!("boom") }));
    ShutdownCoordinator::new(Arc::clone(&pending))
        .with_timeout(Duration::from_secs(5))
        .wait_for_completion()
        .await
        .expect("panicked task is not pending");
}
