//! Bounded-concurrency fan-out over a candidate set
//!
//! Every built-in probe runs its candidate checks (ports, subdomain labels,
//! URL paths, source probes) through this primitive; the probes differ only
//! in what `check` does, not in the concurrency discipline.

use futures::stream::{self, StreamExt};
use futures::{future, Future};
use tokio_util::sync::CancellationToken;

/// Runs `check` once per candidate with at most `limit` checks in flight.
///
/// A `None` from `check` is a per-candidate miss (closed port, unresolvable
/// name): excluded from the result set, not reported, not retried. The token
/// is consulted before each new admission; checks already in flight run to
/// completion, bounded by their own I/O timeout, so the whole call returns
/// within roughly one timeout of a cancellation request. Results collected
/// after cancellation are valid partial output, not an error.
///
/// `on_progress(done, total)` fires after each completed check regardless of
/// hit or miss, letting the calling phase advance its progress sub-range
/// smoothly. Result order follows completion order, not candidate order.
pub async fn fan_out<C, R, F, Fut, P>(
    candidates: Vec<C>,
    limit: usize,
    cancel: &CancellationToken,
    check: F,
    mut on_progress: P,
) -> Vec<R>
where
    F: Fn(C) -> Fut,
    Fut: Future<Output = Option<R>>,
    P: FnMut(usize, usize),
{
    let limit = limit.max(1);
    let total = candidates.len();
    let mut results = Vec::new();

    let mut in_flight = stream::iter(candidates)
        .take_while(|_| future::ready(!cancel.is_cancelled()))
        .map(check)
        .buffer_unordered(limit);

    let mut done = 0usize;
    while let Some(outcome) = in_flight.next().await {
        done += 1;
        on_progress(done, total);
        if let Some(result) = outcome {
            results.push(result);
        }
    }

    results
}

/// `fan_out` without progress reporting
pub async fn fan_out_silent<C, R, F, Fut>(
    candidates: Vec<C>,
    limit: usize,
    cancel: &CancellationToken,
    check: F,
) -> Vec<R>
where
    F: Fn(C) -> Fut,
    Fut: Future<Output = Option<R>>,
{
    fan_out(candidates, limit, cancel, check, |_, _| {}).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_candidate_checked_exactly_once() {
        let cancel = CancellationToken::new();
        let seen = AtomicUsize::new(0);

        let results = fan_out_silent((0..500u32).collect(), 10, &cancel, |n| {
            seen.fetch_add(1, Ordering::SeqCst);
            async move { Some(n) }
        })
        .await;

        assert_eq!(seen.load(Ordering::SeqCst), 500);
        let mut sorted = results.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 500);
    }

    #[tokio::test]
    async fn test_misses_excluded_silently() {
        let cancel = CancellationToken::new();
        let results = fan_out_silent((1..=100u32).collect(), 8, &cancel, |n| async move {
            if n % 2 == 0 {
                Some(n)
            } else {
                None
            }
        })
        .await;

        assert_eq!(results.len(), 50);
        assert!(results.iter().all(|n| n % 2 == 0));
    }

    #[tokio::test]
    async fn test_no_admission_after_cancel() {
        let cancel = CancellationToken::new();
        let admitted = AtomicUsize::new(0);

        cancel.cancel();
        let results = fan_out_silent((0..1000u32).collect(), 5, &cancel, |n| {
            admitted.fetch_add(1, Ordering::SeqCst);
            async move { Some(n) }
        })
        .await;

        assert_eq!(admitted.load(Ordering::SeqCst), 0);
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_progress_callback_counts_every_completion() {
        let cancel = CancellationToken::new();
        let mut ticks = Vec::new();

        fan_out(
            (0..25u32).collect(),
            4,
            &cancel,
            |n| async move { if n < 5 { Some(n) } else { None } },
            |done, total| ticks.push((done, total)),
        )
        .await;

        assert_eq!(ticks.len(), 25);
        assert_eq!(*ticks.last().unwrap(), (25, 25));
        // Monotonic completion count.
        assert!(ticks.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[tokio::test]
    async fn test_in_flight_checks_finish_after_cancel() {
        let cancel = CancellationToken::new();
        let cancel_for_check = cancel.clone();

        let results = fan_out_silent(vec![1u32, 2, 3], 3, &cancel, move |n| {
            let cancel = cancel_for_check.clone();
            async move {
                // All three are admitted together; the first one cancels the
                // rest mid-flight, but everything in flight still completes.
                if n == 1 {
                    cancel.cancel();
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                Some(n)
            }
        })
        .await;

        assert_eq!(results.len(), 3);
    }
}
