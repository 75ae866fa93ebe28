use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

pub mod local_api;
pub mod public_api;
pub mod rate_limit;

use crate::device::Device;
use crate::error::Result;
use crate::settings::{self, Backend};
pub use local_api::LocalApiDiscoverer;
pub use public_api::PublicApiDiscoverer;
pub use rate_limit::RateLimiter;

/// Something that can list the devices currently on a tailnet.
///
/// Dropping the returned future cancels the lookup. Implementations stamp
/// every device with the API host and tailnet it came from, report non-2xx
/// upstream answers as [`crate::error::TailscaleSdError::UpstreamRequestFailed`]
/// and never retry or cache on their own.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn devices(&self) -> Result<Vec<Device>>;
}

pub type SharedDiscoverer = Arc<dyn Discoverer>;

#[async_trait]
impl<T: Discoverer + ?Sized> Discoverer for Arc<T> {
    async fn devices(&self) -> Result<Vec<Device>> {
        (**self).devices().await
    }
}

/// The backends a running instance can poll
#[derive(Clone, Debug)]
pub enum TailnetDiscoverer {
    Public(Arc<PublicApiDiscoverer>),
    Local(Arc<LocalApiDiscoverer>),
}

impl TailnetDiscoverer {
    pub fn new(settings: &settings::Settings) -> Result<Self> {
        settings.validate()?;
        match &settings.backend {
            Backend::PublicApi {
                api_host,
                tailnet,
                token,
            } => {
                info!("Discovering devices through the public API at {}", api_host);
                let discoverer =
                    PublicApiDiscoverer::new(tailnet, token)?.with_api_host(api_host)?;
                Ok(Self::Public(Arc::new(discoverer)))
            }
            Backend::LocalApi { socket } => {
                info!(
                    "Discovering devices through the local API on {}",
                    socket.display()
                );
                Ok(Self::Local(Arc::new(LocalApiDiscoverer::new(socket))))
            }
        }
    }
}

#[async_trait]
impl Discoverer for TailnetDiscoverer {
    async fn devices(&self) -> Result<Vec<Device>> {
        match self {
            Self::Public(discoverer) => discoverer.devices().await,
            Self::Local(discoverer) => discoverer.devices().await,
        }
    }
}
