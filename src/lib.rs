//! envstation - Environmental sensor station agent
//!
//! Simulates a single environmental sensor station talking to a Cloud IoT
//! style MQTT bridge:
//! - Short-lived JWT device credentials signed from a PEM private key
//! - TLS MQTT session with ConnAck-confirmed connection
//! - Config and commands subscriptions, classified inbound logging
//! - Synthetic telemetry published on a fixed interval
//!
//! # Quick Start
//!
//! ```rust
//! use envstation::protocol::DeviceTopics;
//! use envstation::telemetry::TelemetryGenerator;
//!
//! let topics = DeviceTopics::new("station");
//! assert_eq!(topics.events_topic(), "/devices/station/events");
//!
//! let generator = TelemetryGenerator::new("station");
//! let reading = generator.next_reading();
//! assert!((-50..50).contains(&reading.temperature));
//! ```

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod telemetry;
pub mod testing;
pub mod transport;

pub use agent::StationAgent;
pub use auth::{IdentityClaims, TokenSigner};
pub use config::StationConfig;
pub use error::{StationError, StationResult};
pub use protocol::{DeviceTopics, InboundMessage, MessageClass};
pub use telemetry::{TelemetryGenerator, TelemetryReading};
pub use transport::mqtt::MqttClient;
pub use transport::{DeliveryGuarantee, Transport};
