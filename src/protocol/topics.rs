//! Topic and client-id construction for the Cloud IoT MQTT bridge
//!
//! The bridge requires these exact formats. The device publishes telemetry to
//! its `events` topic and receives configuration and commands on per-device
//! subscription topics.

/// Classification of an inbound topic, decided by the device-topic scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Exact match on the device config topic
    Config,
    /// Anything under the device commands subtree
    Command,
    /// Any other topic
    Other,
}

/// Topic set for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    device_id: String,
}

impl DeviceTopics {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    /// Config subscription topic: `/devices/{deviceId}/config`.
    /// The bridge recommends at-least-once delivery for config updates.
    pub fn config_topic(&self) -> String {
        format!("/devices/{}/config", self.device_id)
    }

    /// Commands subscription filter: `/devices/{deviceId}/commands/#`.
    /// The `#` wildcard matches every commands subfolder; at-most-once
    /// delivery is recommended.
    pub fn commands_filter(&self) -> String {
        format!("/devices/{}/commands/#", self.device_id)
    }

    /// Commands topic prefix used for inbound classification.
    pub fn commands_prefix(&self) -> String {
        format!("/devices/{}/commands", self.device_id)
    }

    /// Telemetry publish topic: `/devices/{deviceId}/events`.
    /// A topic ending in `state` would publish device state instead.
    pub fn events_topic(&self) -> String {
        format!("/devices/{}/events", self.device_id)
    }

    /// Classify an inbound topic against this device's topic scheme.
    pub fn classify(&self, topic: &str) -> MessageClass {
        classify_topic(topic, &self.device_id)
    }
}

/// Classify an inbound topic for the given device id.
pub fn classify_topic(topic: &str, device_id: &str) -> MessageClass {
    if topic == format!("/devices/{device_id}/config") {
        MessageClass::Config
    } else if topic.starts_with(&format!("/devices/{device_id}/commands")) {
        MessageClass::Command
    } else {
        MessageClass::Other
    }
}

/// Build the hierarchical MQTT client identifier the bridge requires:
/// `projects/{project}/locations/{region}/registries/{registry}/devices/{device}`.
pub fn bridge_client_id(project: &str, region: &str, registry: &str, device: &str) -> String {
    format!("projects/{project}/locations/{region}/registries/{registry}/devices/{device}")
}

/// Validate a device id against the `[a-zA-Z0-9._-]+` character set the
/// bridge accepts in topic segments.
pub fn validate_device_id(device_id: &str) -> Result<(), InvalidDeviceId> {
    if device_id.is_empty() {
        return Err(InvalidDeviceId::Empty);
    }
    for ch in device_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(InvalidDeviceId::InvalidChar(ch));
        }
    }
    Ok(())
}

/// Device id validation errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InvalidDeviceId {
    #[error("Device ID cannot be empty")]
    Empty,
    #[error("Device ID contains invalid character: '{0}'")]
    InvalidChar(char),
}
