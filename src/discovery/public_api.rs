//! Device discovery through the public Tailscale API
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config_error;
use crate::device::{null_as_default, Device};
use crate::discovery::Discoverer;
use crate::error::{Result, TailscaleSdError};
use crate::settings::PUBLIC_API_HOST;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct DeviceApiResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    devices: Vec<Device>,
}

/// Polls `GET /api/v2/tailnet/{tailnet}/devices` on the public API.
#[derive(Clone)]
pub struct PublicApiDiscoverer {
    client: reqwest::Client,
    api_base: Url,
    api_host: String,
    tailnet: String,
    token: String,
}

impl std::fmt::Debug for PublicApiDiscoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicApiDiscoverer")
            .field("api_base", &self.api_base.as_str())
            .field("tailnet", &self.tailnet)
            .finish_non_exhaustive()
    }
}

fn default_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|err| config_error!("Failed to build HTTP client: {}", err))
}

impl PublicApiDiscoverer {
    pub fn new(tailnet: &str, token: &str) -> Result<Self> {
        Ok(Self {
            client: default_http_client()?,
            api_base: Url::parse(&format!("https://{}/", PUBLIC_API_HOST))
                .map_err(|err| config_error!("Invalid API host: {}", err))?,
            api_host: PUBLIC_API_HOST.to_string(),
            tailnet: tailnet.to_string(),
            token: token.to_string(),
        })
    }

    /// Talk to a different API host over HTTPS
    pub fn with_api_host(self, host: &str) -> Result<Self> {
        self.with_base_url(&format!("https://{}/", host))
    }

    /// Talk to the API at an arbitrary base URL. Devices are stamped with the
    /// URL's host (and port, when one is given).
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let api_base = Url::parse(base_url)
            .map_err(|err| config_error!("Invalid API URL {:?}: {}", base_url, err))?;
        let host = api_base
            .host_str()
            .ok_or_else(|| config_error!("API URL {:?} has no host", base_url))?;
        self.api_host = match api_base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        self.api_base = api_base;
        Ok(self)
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    fn devices_url(&self) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| config_error!("API URL {} cannot be a base", self.api_base))?
            .pop_if_empty()
            .extend(["api", "v2", "tailnet", self.tailnet.as_str(), "devices"]);
        Ok(url)
    }
}

#[async_trait]
impl Discoverer for PublicApiDiscoverer {
    #[instrument(skip(self), fields(api = %self.api_host, tailnet = %self.tailnet), level = "debug")]
    async fn devices(&self) -> Result<Vec<Device>> {
        let resp = self
            .client
            .get(self.devices_url()?)
            .basic_auth(&self.token, None::<&str>)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TailscaleSdError::UpstreamRequestFailed(status));
        }
        let body = resp.bytes().await?;
        let mut decoded: DeviceApiResponse = serde_json::from_slice(&body)?;
        for device in decoded.devices.iter_mut() {
            device.stamp(&self.api_host, &self.tailnet);
        }
        debug!("Public API returned {} devices", decoded.devices.len());
        Ok(decoded.devices)
    }
}
