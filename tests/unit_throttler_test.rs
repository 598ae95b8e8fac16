// tests/unit_throttler_test.rs

use pixelgate::core::Deadline;
use pixelgate::core::throttle::Throttler;
use std::time::Duration;

#[tokio::test]
async fn test_permits_up_to_capacity() {
    let throttler = Throttler::new(2);
    let deadline = Deadline::after(Duration::from_millis(50));

    let first = throttler.acquire(deadline).await;
    let second = throttler.acquire(deadline).await;
    assert!(first.is_some());
    assert!(second.is_some());
    assert_eq!(throttler.available(), 0);

    // Capacity exhausted: the third acquisition waits out its deadline.
    let third = throttler.acquire(Deadline::after(Duration::from_millis(20))).await;
    assert!(third.is_none());
}

#[tokio::test]
async fn test_dropping_permit_releases_slot() {
    let throttler = Throttler::new(1);
    let permit = throttler
        .acquire(Deadline::after(Duration::from_millis(50)))
        .await
        .expect("capacity available");

    drop(permit);
    assert_eq!(throttler.available(), 1);

    assert!(
        throttler
            .acquire(Deadline::after(Duration::from_millis(50)))
            .await
            .is_some()
    );
}

#[tokio::test]
async fn test_blocked_acquire_wakes_when_permit_returns() {
    let throttler = std::sync::Arc::new(Throttler::new(1));
    let permit = throttler
        .acquire(Deadline::after(Duration::from_millis(50)))
        .await
        .expect("capacity available");

    let contender = {
        let throttler = std::sync::Arc::clone(&throttler);
        tokio::spawn(async move {
            throttler
                .acquire(Deadline::after(Duration::from_millis(500)))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(permit);

    let acquired = contender.await.unwrap();
    assert!(acquired.is_some());
}
