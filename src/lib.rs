//! Prometheus HTTP service discovery for the devices on a Tailscale tailnet.
//!
//! A [`discovery::Discoverer`] lists devices, either through the public
//! Tailscale API or the local tailscaled API. [`discovery::RateLimiter`] sits
//! in front of it so upstream is polled at most once per interval, and
//! [`api::api`] serves the result as Prometheus target groups.
pub mod api;
pub mod cli;
pub mod device;
pub mod discovery;
pub mod error;
pub mod settings;
