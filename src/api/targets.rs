//! Prometheus HTTP service discovery output
//!
//! See <https://prometheus.io/docs/prometheus/latest/http_sd/> for the format.
use std::collections::BTreeMap;

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::{debug, event, instrument, Level};

use crate::device::Device;
use crate::discovery::SharedDiscoverer;
use crate::error::TailscaleSdError;

/// Label names attached to every target group
pub mod labels {
    pub const API: &str = "__meta_tailscale_api";
    pub const TAILNET: &str = "__meta_tailscale_tailnet";
    pub const DEVICE_ID: &str = "__meta_tailscale_device_id";
    pub const DEVICE_NAME: &str = "__meta_tailscale_device_name";
    pub const DEVICE_HOSTNAME: &str = "__meta_tailscale_device_hostname";
    pub const DEVICE_OS: &str = "__meta_tailscale_device_os";
    pub const DEVICE_AUTHORIZED: &str = "__meta_tailscale_device_authorized";
    pub const DEVICE_CLIENT_VERSION: &str = "__meta_tailscale_device_client_version";
    pub const DEVICE_TAG: &str = "__meta_tailscale_device_tag";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl TargetGroup {
    /// Describe a device as a scrape target, or `None` when it has nothing to
    /// address it by.
    pub fn from_device(device: &Device) -> Option<Self> {
        let target = device.target()?;
        let mut group_labels = BTreeMap::from([
            (labels::API.to_string(), device.api.clone()),
            (labels::TAILNET.to_string(), device.tailnet.clone()),
            (labels::DEVICE_ID.to_string(), device.id.clone()),
            (labels::DEVICE_NAME.to_string(), device.name.clone()),
            (labels::DEVICE_HOSTNAME.to_string(), device.hostname.clone()),
            (labels::DEVICE_OS.to_string(), device.os.clone()),
            (
                labels::DEVICE_AUTHORIZED.to_string(),
                device.authorized.to_string(),
            ),
            (
                labels::DEVICE_CLIENT_VERSION.to_string(),
                device.client_version.clone(),
            ),
        ]);
        if !device.tags.is_empty() {
            // Prometheus convention for list-valued meta labels
            group_labels.insert(
                labels::DEVICE_TAG.to_string(),
                format!(",{},", device.tags.join(",")),
            );
        }
        Some(Self {
            targets: vec![target.to_string()],
            labels: group_labels,
        })
    }
}

/// One target group per addressable device, in discovery order
pub fn target_groups(devices: &[Device]) -> Vec<TargetGroup> {
    devices
        .iter()
        .filter_map(|device| {
            let group = TargetGroup::from_device(device);
            if group.is_none() {
                debug!("Skipping device {:?} with no address or name", device.id);
            }
            group
        })
        .collect()
}

#[instrument(skip(discoverer), level = "debug")]
pub async fn targets(
    State(discoverer): State<SharedDiscoverer>,
) -> Result<axum::Json<Vec<TargetGroup>>, TailscaleSdError> {
    let devices = discoverer.devices().await.map_err(|err| {
        event!(
            Level::ERROR,
            message = "Failed discovering devices",
            err = %err
        );
        err
    })?;
    Ok(axum::Json(target_groups(&devices)))
}
