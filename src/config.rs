//! Station configuration
//!
//! All connection parameters live in a TOML file loaded once at startup and
//! passed into constructors; there is no process-wide mutable state.

use crate::protocol::topics::validate_device_id;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level station configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationConfig {
    pub device: DeviceSection,
    pub mqtt: MqttSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// Device identity within the cloud project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    /// Cloud project id, also the token audience
    pub project: String,
    /// Cloud region of the device registry
    pub region: String,
    /// Device registry id
    pub registry: String,
}

/// MQTT bridge endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Bridge URL with protocol and port, e.g. `mqtts://mqtt.googleapis.com:8883`
    pub broker_url: String,
}

/// Credential signing parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSection {
    /// Path to the PEM-encoded private key, read once at startup
    pub private_key_path: PathBuf,
    /// Signing algorithm: "RS256" (default) or "ES256"
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Token validity window in seconds (default: 1200 = 20 minutes)
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

/// Telemetry cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySection {
    /// Seconds between telemetry publishes (default: 5)
    #[serde(default = "default_publish_interval_secs")]
    pub publish_interval_secs: u64,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            publish_interval_secs: default_publish_interval_secs(),
        }
    }
}

fn default_algorithm() -> String {
    "RS256".to_string()
}

fn default_token_ttl_secs() -> u64 {
    crate::auth::DEFAULT_TOKEN_TTL_SECS
}

fn default_publish_interval_secs() -> u64 {
    5
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(#[from] crate::protocol::topics::InvalidDeviceId),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StationConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: StationConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values beyond what deserialization checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.id)?;

        if self.device.project.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.project must not be empty".to_string(),
            ));
        }
        if self.auth.token_ttl_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "auth.token_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.telemetry.publish_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "telemetry.publish_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
id = "station"
project = "awesome-sylph-271611"
region = "us-central1"
registry = "assignment1"

[mqtt]
broker_url = "mqtts://mqtt.googleapis.com:8883"

[auth]
private_key_path = "./rsa_private.pem"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
