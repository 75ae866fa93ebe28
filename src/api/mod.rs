mod base;
pub mod targets;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse, routing, Json,
    Router,
};
use serde_json::json;
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod paths;

pub use base::AboutResponse;
pub use targets::TargetGroup;

use crate::discovery::SharedDiscoverer;

/// Longest a scrape may wait on device discovery before it is answered with 504
pub const SCRAPE_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the service discovery API in front of a discoverer
pub fn api(discoverer: SharedDiscoverer) -> Router {
    Router::new()
        .route(paths::TARGETS, routing::get(targets::targets))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(SCRAPE_TIMEOUT),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(discoverer)
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    let (status, message, error_type) = if error.is::<tower::timeout::error::Elapsed>() {
        warn!("Scrape gave up waiting on device discovery after {:?}", SCRAPE_TIMEOUT);
        (
            StatusCode::GATEWAY_TIMEOUT,
            "Device discovery did not finish in time".to_string(),
            "discovery_timeout",
        )
    } else if error.is::<tower::load_shed::error::Overloaded>() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Too many concurrent scrapes, try again later".to_string(),
            "overloaded",
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unhandled internal error: {}", error),
            "internal_error",
        )
    };

    // Same body shape as TailscaleSdError responses
    let body = json!({
        "error": {
            "code": status.as_u16(),
            "message": message,
            "type": error_type,
        }
    });
    (status, Json(body))
}
