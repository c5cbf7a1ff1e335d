//! Top-level error type for station operations
//!
//! Credential and configuration failures are fatal: the agent cannot proceed
//! without a token or valid settings. Transport failures after startup are
//! reported through events and logging instead.

use thiserror::Error;

/// Main error type for station agent operations
#[derive(Debug, Error)]
pub enum StationError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Credential error: {0}")]
    Auth(#[from] crate::auth::AuthError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::mqtt::MqttError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] crate::agent::LifecycleError),
}

/// Result type for station operations
pub type StationResult<T> = Result<T, StationError>;
