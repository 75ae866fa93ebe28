//! CLI for this application
//!
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::settings::{self, Backend};

#[derive(Clone, Debug, clap::Parser)]
#[command(name = settings::APP_NAME, version = settings::APP_VERSION, about)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = settings::DEFAULT_LISTEN_ADDRESS,
        env("LISTEN"),
        help = "Address on which to serve Tailscale SD"
    )]
    pub address: SocketAddr,

    #[clap(
        long,
        default_value = "",
        hide_env_values = true,
        env("TAILSCALE_API_TOKEN"),
        help = "Tailscale API Token"
    )]
    pub token: String,

    #[clap(long, default_value = "", env("TAILNET"), help = "Tailnet name")]
    pub tailnet: String,

    // Accepts humantime durations such as "30s", "5m" or "1h 30m"
    #[clap(
        long,
        default_value = settings::DEFAULT_POLL_LIMIT,
        env("TAILSCALE_API_POLL_LIMIT"),
        value_parser = humantime::parse_duration,
        help = "Max frequency with which to poll the Tailscale API. Cached results are served between intervals"
    )]
    pub poll: Duration,

    #[clap(
        long,
        default_value = settings::PUBLIC_API_HOST,
        env("TAILSCALE_API_HOST"),
        help = "Host serving the public Tailscale API"
    )]
    pub api_host: String,

    #[clap(
        long,
        env("TAILSCALE_USE_LOCAL_API"),
        action = clap::ArgAction::Set,
        value_parser = parse_bool_flag,
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Use the Tailscale local API exported by the local node's tailscaled"
    )]
    pub localapi: bool,

    #[clap(
        long,
        alias = "localapi_socket",
        default_value = settings::DEFAULT_LOCAL_API_SOCKET,
        env("TAILSCALE_LOCAL_API_SOCKET"),
        help = "Unix domain socket to use for communication with the local tailscaled API"
    )]
    pub localapi_socket: PathBuf,

    #[clap(
        long,
        env("TAILSCALESD_LOG_JSON"),
        action = clap::ArgAction::Set,
        value_parser = parse_bool_flag,
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Emit logs as JSON lines"
    )]
    pub log_json: bool,
}

/// Environment-friendly boolean: "true", "yes" and "1" (any case) are true, anything else false.
fn parse_bool_flag(value: &str) -> Result<bool, String> {
    let value = value.trim().to_lowercase();
    Ok(value == "true" || value == "yes" || value == "1")
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        let backend = if self.localapi {
            Backend::LocalApi {
                socket: self.localapi_socket,
            }
        } else {
            Backend::PublicApi {
                api_host: self.api_host,
                tailnet: self.tailnet,
                token: self.token,
            }
        };
        settings::Settings {
            listen_address: self.address,
            poll_limit: self.poll,
            backend,
            log_json: self.log_json,
        }
    }
}
