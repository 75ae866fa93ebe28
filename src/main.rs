use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tailscalesd::api;
use tailscalesd::cli;
use tailscalesd::discovery::{RateLimiter, TailnetDiscoverer};
use tailscalesd::settings;

fn init_tracing(settings: &settings::Settings) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "tailscalesd=info,tower_http=info".into()),
    );
    if settings.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();
    init_tracing(&settings);

    // Backend is picked once; everything downstream only sees a Discoverer
    let discoverer = TailnetDiscoverer::new(&settings)?;
    let limited = RateLimiter::new(discoverer, settings.poll_limit);
    let app = api::api(Arc::new(limited));

    info!(
        "Serving Tailscale service discovery on {} from the {}, polling at most every {}",
        settings.listen_address,
        settings.backend,
        humantime::format_duration(settings.poll_limit)
    );
    let listener = tokio::net::TcpListener::bind(settings.listen_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Done");
    Ok(())
}
