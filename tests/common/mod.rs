//! Shared helpers for integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use tailscalesd::device::Device;
use tailscalesd::discovery::Discoverer;
use tailscalesd::error::{Result, TailscaleSdError};

/// Discoverer returning queued responses, counting every call
#[derive(Default)]
pub struct FakeDiscoverer {
    calls: AtomicUsize,
    delay: Duration,
    responses: Mutex<VecDeque<Result<Vec<Device>>>>,
}

impl FakeDiscoverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call take this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_ok(&self, devices: Vec<Device>) {
        self.responses.lock().unwrap().push_back(Ok(devices));
    }

    pub fn push_err(&self, err: TailscaleSdError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Discoverer for FakeDiscoverer {
    async fn devices(&self) -> Result<Vec<Device>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn device(id: &str, name: &str, address: &str) -> Device {
    let mut device = Device {
        id: id.to_string(),
        name: name.to_string(),
        hostname: name.to_string(),
        addresses: vec![address.to_string()],
        ..Default::default()
    };
    device.stamp("api.example.com", "t1");
    device
}
