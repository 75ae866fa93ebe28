//! Integration tests for the caching discovery decorator
mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use tokio::task::JoinSet;

use common::{device, FakeDiscoverer};
use tailscalesd::device::Device;
use tailscalesd::discovery::{Discoverer, RateLimiter};
use tailscalesd::error::{Result, TailscaleSdError};

const POLL_LIMIT: Duration = Duration::from_secs(300);
const REFRESH_TIME: Duration = Duration::from_millis(100);

fn spawn_callers(limiter: &RateLimiter, count: usize) -> JoinSet<Result<Vec<Device>>> {
    let mut callers = JoinSet::new();
    for _ in 0..count {
        let limiter = limiter.clone();
        callers.spawn(async move { limiter.devices().await });
    }
    callers
}

#[tokio::test(start_paused = true)]
async fn test_many_calls_within_poll_limit_hit_upstream_once() {
    let fake = Arc::new(FakeDiscoverer::new());
    fake.push_ok(vec![device("n1", "alpha", "100.64.0.1")]);
    let limiter = RateLimiter::new(fake.clone(), POLL_LIMIT);

    let first = limiter.devices().await.unwrap();
    for _ in 0..10 {
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(limiter.devices().await.unwrap(), first);
    }
    let mut callers = spawn_callers(&limiter, 16);
    while let Some(result) = callers.join_next().await {
        assert_eq!(result.unwrap().unwrap(), first);
    }

    assert_eq!(fake.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_refresh() {
    let fake = Arc::new(FakeDiscoverer::new().with_delay(REFRESH_TIME));
    fake.push_ok(vec![
        device("n1", "alpha", "100.64.0.1"),
        device("n2", "beta", "100.64.0.2"),
    ]);
    let limiter = RateLimiter::new(fake.clone(), POLL_LIMIT);

    let mut callers = spawn_callers(&limiter, 32);
    let mut results = Vec::new();
    while let Some(result) = callers.join_next().await {
        results.push(result.unwrap().unwrap());
    }

    assert_eq!(fake.calls(), 1);
    assert_eq!(results.len(), 32);
    assert!(results.iter().all(|devices| devices == &results[0]));
    assert_eq!(results[0].len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_failure() {
    let fake = Arc::new(FakeDiscoverer::new().with_delay(REFRESH_TIME));
    fake.push_err(TailscaleSdError::UpstreamRequestFailed(
        StatusCode::INTERNAL_SERVER_ERROR,
    ));
    let limiter = RateLimiter::new(fake.clone(), POLL_LIMIT);

    let mut callers = spawn_callers(&limiter, 8);
    while let Some(result) = callers.join_next().await {
        let err = result.unwrap().unwrap_err();
        assert!(matches!(err, TailscaleSdError::RefreshFailed(_)));
        assert!(matches!(
            err.root_cause(),
            TailscaleSdError::UpstreamRequestFailed(StatusCode::INTERNAL_SERVER_ERROR)
        ));
    }

    assert_eq!(fake.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_snapshot_and_retries() {
    let fake = Arc::new(FakeDiscoverer::new());
    let before = vec![device("n1", "alpha", "100.64.0.1")];
    let after = vec![device("n2", "beta", "100.64.0.2")];
    fake.push_ok(before.clone());
    fake.push_err(TailscaleSdError::Transport("connection reset".to_string()));
    fake.push_ok(after.clone());
    let limiter = RateLimiter::new(fake.clone(), POLL_LIMIT);

    assert_eq!(limiter.devices().await.unwrap(), before);
    tokio::time::advance(POLL_LIMIT).await;

    // Expired: the failure is surfaced, not masked by the old snapshot
    let err = limiter.devices().await.unwrap_err();
    assert!(matches!(err.root_cause(), TailscaleSdError::Transport(_)));
    assert_eq!(fake.calls(), 2);

    // The failure did not count as a poll, so the next call retries right away
    assert_eq!(limiter.devices().await.unwrap(), after);
    assert_eq!(fake.calls(), 3);

    // and the successful retry is cached again
    assert_eq!(limiter.devices().await.unwrap(), after);
    assert_eq!(fake.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failure_before_first_success_is_retried() {
    let fake = Arc::new(FakeDiscoverer::new());
    fake.push_err(TailscaleSdError::UpstreamRequestFailed(
        StatusCode::UNAUTHORIZED,
    ));
    fake.push_ok(vec![device("n1", "alpha", "100.64.0.1")]);
    let limiter = RateLimiter::new(fake.clone(), POLL_LIMIT);

    assert!(limiter.devices().await.is_err());
    assert_eq!(limiter.devices().await.unwrap().len(), 1);
    assert_eq!(fake.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_caller_does_not_abort_refresh() {
    let fake = Arc::new(FakeDiscoverer::new().with_delay(REFRESH_TIME));
    let devices = vec![device("n1", "alpha", "100.64.0.1")];
    fake.push_ok(devices.clone());
    let limiter = RateLimiter::new(fake.clone(), POLL_LIMIT);

    let impatient = tokio::time::timeout(Duration::from_millis(10), limiter.devices()).await;
    assert!(impatient.is_err());

    // Joins the refresh the impatient caller started
    assert_eq!(limiter.devices().await.unwrap(), devices);
    assert_eq!(fake.calls(), 1);
}

/// Panics on its first poll, answers normally afterwards
#[derive(Default)]
struct CrashOnceDiscoverer {
    crashed: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl Discoverer for CrashOnceDiscoverer {
    async fn devices(&self) -> Result<Vec<Device>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.crashed.swap(true, Ordering::SeqCst) {
            panic!("discoverer crashed mid-refresh");
        }
        Ok(vec![device("n1", "alpha", "100.64.0.1")])
    }
}

#[tokio::test]
async fn test_refresh_task_dying_is_reported_and_recovered() {
    let crashing = Arc::new(CrashOnceDiscoverer::default());
    let limiter = RateLimiter::new(crashing.clone(), POLL_LIMIT);

    let err = tokio::time::timeout(Duration::from_secs(5), limiter.devices())
        .await
        .expect("caller must not hang on a dead refresh")
        .unwrap_err();
    assert!(matches!(err, TailscaleSdError::Concurrency(_)));

    // The dead refresh no longer blocks anyone: the next call polls again
    let devices = tokio::time::timeout(Duration::from_secs(5), limiter.devices())
        .await
        .expect("caller must not hang after a dead refresh")
        .unwrap();
    assert_eq!(devices[0].id, "n1");
    assert_eq!(crashing.calls.load(Ordering::SeqCst), 2);

    // and that result is cached
    limiter.devices().await.unwrap();
    assert_eq!(crashing.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_zero_poll_limit_still_collapses_concurrent_calls() {
    let fake = Arc::new(FakeDiscoverer::new().with_delay(REFRESH_TIME));
    let limiter = RateLimiter::new(fake.clone(), Duration::ZERO);

    let mut callers = spawn_callers(&limiter, 8);
    while let Some(result) = callers.join_next().await {
        assert!(result.unwrap().is_ok());
    }
    assert_eq!(fake.calls(), 1);

    // nothing is cached between sequential calls
    limiter.devices().await.unwrap();
    limiter.devices().await.unwrap();
    assert_eq!(fake.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_callers_after_refresh_see_new_snapshot() {
    let fake = Arc::new(FakeDiscoverer::new().with_delay(REFRESH_TIME));
    let old = vec![device("n1", "alpha", "100.64.0.1")];
    let new = vec![
        device("n1", "alpha", "100.64.0.1"),
        device("n2", "beta", "100.64.0.2"),
    ];
    fake.push_ok(old.clone());
    fake.push_ok(new.clone());
    let limiter = RateLimiter::new(fake.clone(), POLL_LIMIT);

    assert_eq!(limiter.devices().await.unwrap(), old);
    tokio::time::advance(POLL_LIMIT).await;

    let mut callers = spawn_callers(&limiter, 4);
    while let Some(result) = callers.join_next().await {
        // Every caller gets the complete new list, never the old one or a mix
        assert_eq!(result.unwrap().unwrap(), new);
    }
    assert_eq!(limiter.devices().await.unwrap(), new);
    assert_eq!(fake.calls(), 2);
}
