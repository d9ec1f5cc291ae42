use playscout_async::{sync, task, time};

#[tokio::test]
async fn spawn_runs_future_to_completion() {
    let handle = task::spawn(async { 42 });
    assert_eq!(handle.await.unwrap(), 42);
}

#[tokio::test]
async fn timeout_reports_elapsed() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(100)).await;
    })
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn semaphore_try_acquire_reports_saturation() {
    let sem = sync::Semaphore::new(1);
    let _permit = sem.acquire().await.unwrap();
    assert!(sem.try_acquire().is_err());
}
