//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
}

/// Prometheus HTTP service discovery endpoint
pub const TARGETS: &str = "/";
