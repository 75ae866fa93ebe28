//! tailscalesd application settings
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config_error;
use crate::error::Result;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9242";
pub const DEFAULT_POLL_LIMIT: &str = "5m";
pub const DEFAULT_LOCAL_API_SOCKET: &str = "/var/run/tailscale/tailscaled.sock";

/// Host serving the public Tailscale API
pub const PUBLIC_API_HOST: &str = "api.tailscale.com";

/// Where device information comes from. Chosen once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Backend {
    /// The public Tailscale API, authenticated with an API token
    PublicApi {
        api_host: String,
        tailnet: String,
        token: String,
    },
    /// The local tailscaled API exposed on a Unix domain socket
    LocalApi { socket: PathBuf },
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the token
        match self {
            Backend::PublicApi {
                api_host, tailnet, ..
            } => write!(f, "public API at {} for tailnet {:?}", api_host, tailnet),
            Backend::LocalApi { socket } => write!(f, "local API at {}", socket.display()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Address the service discovery endpoint listens on
    pub listen_address: SocketAddr,

    // Minimum interval between upstream polls
    pub poll_limit: Duration,

    pub backend: Backend,

    // Emit logs as JSON lines
    pub log_json: bool,
}

impl Settings {
    /// Check invariants that clap cannot express on its own
    pub fn validate(&self) -> Result<()> {
        match &self.backend {
            Backend::PublicApi {
                api_host,
                tailnet,
                token,
            } => {
                if token.trim().is_empty() || tailnet.trim().is_empty() {
                    return Err(config_error!(
                        "Both --token and --tailnet are required when using the public API"
                    ));
                }
                if api_host.trim().is_empty() {
                    return Err(config_error!("--api-host must not be empty"));
                }
            }
            Backend::LocalApi { socket } => {
                if socket.as_os_str().is_empty() {
                    return Err(config_error!(
                        "--localapi-socket must not be empty when using the local API"
                    ));
                }
            }
        }
        Ok(())
    }
}
