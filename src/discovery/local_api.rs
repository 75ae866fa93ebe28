//! Device discovery through the API tailscaled exposes on a Unix socket
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Uri};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::UnixStream;
use tracing::{debug, instrument};

use crate::device::Device;
use crate::discovery::Discoverer;
use crate::error::{Result, TailscaleSdError};

/// Value stamped as the originating API on locally discovered devices
pub const LOCAL_API_HOST: &str = "localhost";

const STATUS_PATH: &str = "/localapi/v0/status";
// tailscaled checks the Host header on local API requests
const LOCAL_API_HOST_HEADER: &str = "local-tailscaled.sock";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PeerStatus {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(default)]
    host_name: String,
    #[serde(rename = "DNSName", default)]
    dns_name: String,
    #[serde(rename = "OS", default)]
    os: String,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Option<Vec<String>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    online: bool,
    #[serde(default)]
    last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CurrentTailnet {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LocalStatus {
    #[serde(rename = "Self", default)]
    self_status: Option<PeerStatus>,
    #[serde(default)]
    peer: Option<BTreeMap<String, PeerStatus>>,
    #[serde(default)]
    current_tailnet: Option<CurrentTailnet>,
    #[serde(rename = "MagicDNSSuffix", default)]
    magic_dns_suffix: String,
}

impl LocalStatus {
    fn tailnet(&self) -> &str {
        self.current_tailnet
            .as_ref()
            .map(|tailnet| tailnet.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(self.magic_dns_suffix.as_str())
    }

    /// The local node first, then its peers ordered by node key
    fn into_devices(self) -> Vec<Device> {
        let tailnet = self.tailnet().to_string();
        self.self_status
            .into_iter()
            .chain(self.peer.unwrap_or_default().into_values())
            .map(|peer| {
                let mut device = peer.into_device();
                device.stamp(LOCAL_API_HOST, &tailnet);
                device
            })
            .collect()
    }
}

impl PeerStatus {
    fn into_device(self) -> Device {
        Device {
            id: self.id,
            name: self.dns_name.trim_end_matches('.').to_string(),
            hostname: self.host_name,
            addresses: self.tailscale_ips.unwrap_or_default(),
            os: self.os,
            // only authorized nodes are visible to tailscaled
            authorized: true,
            tags: self.tags.unwrap_or_default(),
            online: Some(self.online),
            // tailscaled reports the zero time for nodes it has never seen
            last_seen: self.last_seen.filter(|seen| seen.timestamp() > 0),
            ..Default::default()
        }
    }
}

/// Reads the node's view of the tailnet from tailscaled's local API.
#[derive(Clone, Debug)]
pub struct LocalApiDiscoverer {
    socket: PathBuf,
}

impl LocalApiDiscoverer {
    pub fn new(socket: impl AsRef<Path>) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
        }
    }

    async fn fetch_status(&self) -> Result<LocalStatus> {
        let stream = UnixStream::connect(&self.socket).await.map_err(|err| {
            TailscaleSdError::Transport(format!(
                "Failed connecting to {}: {}",
                self.socket.display(),
                err
            ))
        })?;
        let (mut sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!("Local API connection closed with error: {}", err);
            }
        });

        let mut request = Request::new(Empty::<Bytes>::new());
        *request.uri_mut() = Uri::from_static(STATUS_PATH);
        request
            .headers_mut()
            .insert(HOST, HeaderValue::from_static(LOCAL_API_HOST_HEADER));

        let response = sender.send_request(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TailscaleSdError::UpstreamRequestFailed(status));
        }
        let body = response.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl Discoverer for LocalApiDiscoverer {
    #[instrument(skip(self), fields(socket = %self.socket.display()), level = "debug")]
    async fn devices(&self) -> Result<Vec<Device>> {
        let status = tokio::time::timeout(REQUEST_TIMEOUT, self.fetch_status())
            .await
            .map_err(|_| TailscaleSdError::Transport("Local API request timed out".to_string()))??;
        let devices = status.into_devices();
        debug!("Local API returned {} devices", devices.len());
        Ok(devices)
    }
}
