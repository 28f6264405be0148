//! Concurrency discipline tests for the fan-out primitive

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use reconx::fanout::{fan_out, fan_out_silent};

#[tokio::test]
async fn test_in_flight_checks_never_exceed_limit() {
    let limit = 8;
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    let current_ref = current.clone();
    let peak_ref = peak.clone();
    let results = fan_out_silent((0..200u32).collect(), limit, &cancel, move |n| {
        let current = current_ref.clone();
        let peak = peak_ref.clone();
        async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            Some(n)
        }
    })
    .await;

    assert_eq!(results.len(), 200);
    assert!(peak.load(Ordering::SeqCst) <= limit);
    // With 200 candidates and 5ms checks the window actually fills up.
    assert!(peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_limit_of_one_serializes_checks() {
    let current = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    let current_ref = current.clone();
    let overlap_ref = overlap.clone();
    fan_out_silent((0..50u32).collect(), 1, &cancel, move |n| {
        let current = current_ref.clone();
        let overlap = overlap_ref.clone();
        async move {
            if current.fetch_add(1, Ordering::SeqCst) > 0 {
                overlap.fetch_add(1, Ordering::SeqCst);
            }
            tokio::task::yield_now().await;
            current.fetch_sub(1, Ordering::SeqCst);
            Some(n)
        }
    })
    .await;

    assert_eq!(overlap.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancellation_stops_admission_quickly() {
    let admitted = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let admitted_ref = admitted.clone();
    let results = fan_out_silent((0..1000u32).collect(), 5, &cancel, move |n| {
        admitted_ref.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Some(n)
        }
    })
    .await;

    // Far fewer than 1000 admissions, and everything admitted still produced
    // a partial result.
    let admitted = admitted.load(Ordering::SeqCst);
    assert!(admitted < 1000);
    assert_eq!(results.len(), admitted);
}

#[tokio::test]
async fn test_progress_reaches_total_without_cancellation() {
    let cancel = CancellationToken::new();
    let mut last = (0, 0);

    fan_out(
        (0..40u32).collect(),
        6,
        &cancel,
        |n| async move { if n % 3 == 0 { Some(n) } else { None } },
        |done, total| last = (done, total),
    )
    .await;

    assert_eq!(last, (40, 40));
}
