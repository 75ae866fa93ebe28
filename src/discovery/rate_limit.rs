//! Caching decorator that bounds how often a discoverer is polled
//!
//! Between polls callers are served the last successful result. Once the
//! poll limit has elapsed, the first caller starts a refresh in a background
//! task and every caller arriving before it finishes waits on that same
//! refresh. A caller giving up (its future is dropped) does not cancel the
//! refresh for the others.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, event, info, Level};

use crate::concurrency_error;
use crate::device::Device;
use crate::discovery::{Discoverer, SharedDiscoverer};
use crate::error::{Result, TailscaleSdError};

type RefreshOutcome = std::result::Result<Arc<Vec<Device>>, Arc<TailscaleSdError>>;
type RefreshReceiver = watch::Receiver<Option<RefreshOutcome>>;

#[derive(Clone, Debug)]
struct Snapshot {
    devices: Arc<Vec<Device>>,
    fetched_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    in_flight: Option<RefreshReceiver>,
}

impl CacheState {
    fn fresh_devices(&self, poll_limit: Duration) -> Option<Arc<Vec<Device>>> {
        self.snapshot
            .as_ref()
            .filter(|snapshot| snapshot.fetched_at.elapsed() < poll_limit)
            .map(|snapshot| Arc::clone(&snapshot.devices))
    }
}

/// Wraps a [`Discoverer`], polling it at most once per `poll_limit`.
///
/// Clones share the same cache.
#[derive(Clone)]
pub struct RateLimiter {
    inner: SharedDiscoverer,
    poll_limit: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("poll_limit", &self.poll_limit)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// A zero `poll_limit` disables caching; concurrent calls still share one poll.
    pub fn new<D: Discoverer + 'static>(inner: D, poll_limit: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            poll_limit,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn poll_limit(&self) -> Duration {
        self.poll_limit
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|e| concurrency_error!("Failed to acquire discovery cache lock: {}", e))
    }

    /// Start polling the wrapped discoverer. Must be called with the state lock held.
    fn spawn_refresh(&self) -> RefreshReceiver {
        let (tx, rx) = watch::channel(None);
        let inner = Arc::clone(&self.inner);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = inner.devices().await.map(Arc::new).map_err(Arc::new);
            match &outcome {
                Ok(devices) => info!(
                    "Refreshed {} devices in {:?}",
                    devices.len(),
                    started.elapsed()
                ),
                Err(err) => event!(
                    Level::WARN,
                    message = "Device refresh failed",
                    err = %err
                ),
            }
            match state.lock() {
                Ok(mut state) => {
                    if let Ok(devices) = &outcome {
                        state.snapshot = Some(Snapshot {
                            devices: Arc::clone(devices),
                            fetched_at: Instant::now(),
                        });
                    }
                    state.in_flight = None;
                }
                Err(err) => event!(
                    Level::ERROR,
                    message = "Failed to store refreshed devices",
                    err = %err
                ),
            }
            tx.send_replace(Some(outcome));
        });
        rx
    }

    /// Forget a refresh whose task went away without reporting
    fn abandon_refresh(&self, refresh: &RefreshReceiver) {
        if let Ok(mut state) = self.state.lock() {
            if state
                .in_flight
                .as_ref()
                .is_some_and(|current| current.same_channel(refresh))
            {
                state.in_flight = None;
            }
        }
    }
}

#[async_trait]
impl Discoverer for RateLimiter {
    async fn devices(&self) -> Result<Vec<Device>> {
        let mut refresh = {
            let mut state = self.lock_state()?;
            if let Some(devices) = state.fresh_devices(self.poll_limit) {
                debug!("Serving {} cached devices", devices.len());
                return Ok(devices.as_ref().clone());
            }
            match state.in_flight.clone() {
                Some(refresh) => refresh,
                None => {
                    let refresh = self.spawn_refresh();
                    state.in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        let waited = refresh
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone());
        let outcome = match waited {
            Ok(outcome) => outcome,
            Err(_) => {
                self.abandon_refresh(&refresh);
                return Err(concurrency_error!("Device refresh ended without a result"));
            }
        };
        match outcome {
            Some(Ok(devices)) => Ok(devices.as_ref().clone()),
            Some(Err(err)) => Err(TailscaleSdError::RefreshFailed(err)),
            None => Err(concurrency_error!("Device refresh ended without a result")),
        }
    }
}
