use std::fmt;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Main error type for Tailscale service discovery
#[derive(Debug)]
pub enum TailscaleSdError {
    /// Configuration or CLI argument errors
    Config(String),

    /// The upstream API answered with a non-success status
    UpstreamRequestFailed(StatusCode),

    /// Network, connection or timeout failure reaching the upstream API
    Transport(String),

    /// Upstream response body could not be decoded
    Decode(serde_json::Error),

    /// A shared refresh that one or more callers were waiting on failed.
    /// Every caller of that refresh receives the same underlying error.
    RefreshFailed(Arc<TailscaleSdError>),

    /// Internal lock poisoning or refresh task errors
    Concurrency(String),

    /// System I/O errors
    Io(std::io::Error),
}

impl fmt::Display for TailscaleSdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TailscaleSdError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TailscaleSdError::UpstreamRequestFailed(status) => {
                write!(f, "Failed request: {}", status)
            }
            TailscaleSdError::Transport(msg) => write!(f, "Transport error: {}", msg),
            TailscaleSdError::Decode(err) => write!(f, "Decode error: {}", err),
            TailscaleSdError::RefreshFailed(err) => write!(f, "Refresh failed: {}", err),
            TailscaleSdError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
            TailscaleSdError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for TailscaleSdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TailscaleSdError::Decode(err) => Some(err),
            TailscaleSdError::RefreshFailed(err) => Some(err.as_ref()),
            TailscaleSdError::Io(err) => Some(err),
            _ => None,
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, TailscaleSdError>;

impl IntoResponse for TailscaleSdError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        // Only the summarized message goes out: upstream URLs may carry credentials.
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.user_message(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl TailscaleSdError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            TailscaleSdError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TailscaleSdError::UpstreamRequestFailed(_) => StatusCode::BAD_GATEWAY,
            TailscaleSdError::Transport(_) => StatusCode::BAD_GATEWAY,
            TailscaleSdError::Decode(_) => StatusCode::BAD_GATEWAY,
            TailscaleSdError::RefreshFailed(inner) => inner.status_code(),
            TailscaleSdError::Concurrency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TailscaleSdError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            TailscaleSdError::Config(_) => "Service is misconfigured.".to_string(),
            TailscaleSdError::UpstreamRequestFailed(status) => {
                format!("Device discovery failed: upstream responded {}", status)
            }
            TailscaleSdError::Transport(_) => {
                "Device discovery failed: upstream unreachable.".to_string()
            }
            TailscaleSdError::Decode(_) => {
                "Device discovery failed: unexpected upstream response.".to_string()
            }
            TailscaleSdError::RefreshFailed(inner) => inner.user_message(),
            TailscaleSdError::Concurrency(_) | TailscaleSdError::Io(_) => {
                "Internal server error. Please try again later.".to_string()
            }
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            TailscaleSdError::Config(_) => "configuration_error",
            TailscaleSdError::UpstreamRequestFailed(_) => "upstream_request_failed",
            TailscaleSdError::Transport(_) => "transport_error",
            TailscaleSdError::Decode(_) => "decode_error",
            TailscaleSdError::RefreshFailed(inner) => inner.error_type(),
            TailscaleSdError::Concurrency(_) => "concurrency_error",
            TailscaleSdError::Io(_) => "io_error",
        }
    }

    /// Unwrap shared refresh failures down to the error that caused them
    pub fn root_cause(&self) -> &TailscaleSdError {
        match self {
            TailscaleSdError::RefreshFailed(inner) => inner.root_cause(),
            other => other,
        }
    }
}

// Conversions from common error types
impl From<std::io::Error> for TailscaleSdError {
    fn from(err: std::io::Error) -> Self {
        TailscaleSdError::Io(err)
    }
}

impl From<serde_json::Error> for TailscaleSdError {
    fn from(err: serde_json::Error) -> Self {
        TailscaleSdError::Decode(err)
    }
}

impl From<reqwest::Error> for TailscaleSdError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the URL in its Display output; the userinfo part must not leak
        TailscaleSdError::Transport(err.without_url().to_string())
    }
}

impl From<hyper::Error> for TailscaleSdError {
    fn from(err: hyper::Error) -> Self {
        TailscaleSdError::Transport(err.to_string())
    }
}

impl From<StatusCode> for TailscaleSdError {
    fn from(status: StatusCode) -> Self {
        TailscaleSdError::UpstreamRequestFailed(status)
    }
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::TailscaleSdError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TailscaleSdError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! concurrency_error {
    ($msg:expr) => {
        $crate::error::TailscaleSdError::Concurrency($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TailscaleSdError::Concurrency(format!($fmt, $($arg)*))
    };
}
