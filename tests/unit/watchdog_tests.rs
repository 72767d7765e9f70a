//! Unit tests for the deadline watchdog.
//!
//! Validates firing after the deadline, disarm before expiry, the
//! unarmed sentinel, idempotent disarm, and drop-disarm.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use migration_watchdog::orchestrator::watchdog::Watchdog;

fn counting_watchdog(
    millis: Option<u64>,
) -> (Arc<AtomicUsize>, migration_watchdog::orchestrator::watchdog::DeadlineHandle<usize>) {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let handle = Watchdog::new("test", millis.map(Duration::from_millis)).arm(move || async move {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    });
    (fired, handle)
}

#[tokio::test]
async fn fires_once_after_deadline() {
    let (fired, handle) = counting_watchdog(Some(50));
    assert!(handle.is_armed());
    assert!(handle.expires_at().is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(handle.has_fired());
    assert!(!handle.disarm(), "disarm after fire is a no-op");
    assert_eq!(handle.settle().await, Some(1));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disarm_before_expiry_prevents_callback() {
    let (fired, handle) = counting_watchdog(Some(100));

    assert!(handle.disarm());
    assert!(!handle.is_armed());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!handle.has_fired());
    assert_eq!(handle.settle().await, None);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn double_disarm_is_harmless() {
    let (fired, handle) = counting_watchdog(Some(100));

    assert!(handle.disarm());
    assert!(!handle.disarm());
    assert_eq!(handle.settle().await, None);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn no_duration_is_inert_sentinel() {
    let (fired, handle) = counting_watchdog(None);

    assert!(!handle.is_armed());
    assert!(handle.expires_at().is_none());
    assert!(!handle.disarm());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.settle().await, None);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dropping_handle_disarms() {
    let (fired, handle) = counting_watchdog(Some(80));
    drop(handle);

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn settle_waits_for_running_callback() {
    let done = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&done);
    let handle = Watchdog::new("slow-callback", Some(Duration::from_millis(20))).arm(move || async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        flag.store(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(handle.has_fired());
    assert_eq!(done.load(Ordering::SeqCst), 0, "callback still running");

    assert_eq!(handle.settle().await, Some(()));
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn racing_disarm_never_double_fires() {
    for _ in 0..50 {
        let (fired, handle) = counting_watchdog(Some(1));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let disarmed = handle.disarm();
        let settled = handle.settle().await;
        let count = fired.load(Ordering::SeqCst);

        assert_eq!(disarmed, settled.is_none(), "exactly one side wins");
        if disarmed {
            assert_eq!(count, 0);
        } else {
            assert_eq!(settled, Some(1));
            assert_eq!(count, 1);
        }
    }
}
