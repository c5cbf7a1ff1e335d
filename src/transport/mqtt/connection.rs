//! Pure connection state and option handling for the MQTT client
//!
//! Contains the connection state machine, the connection descriptor built
//! once at startup, and the translation into rumqttc options.

use crate::transport::DeliveryGuarantee;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state for the MQTT session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Connect attempt in flight, ConnAck not yet received
    Connecting,
    /// ConnAck received, session ready for publish/subscribe
    Connected,
    /// Link dropped or connect failed, with reason. The session does not
    /// reconnect on its own.
    Disconnected(String),
}

/// Everything needed to open the authenticated connection. Built once at
/// startup and immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    /// `mqtts://host:port` (or `mqtt://` for unsecured test brokers)
    pub broker_url: String,
    /// Bridge client identifier:
    /// `projects/{p}/locations/{r}/registries/{reg}/devices/{d}`
    pub client_id: String,
    /// The bridge ignores the username but requires it non-empty
    pub username: String,
    /// Signed identity token; the session becomes unauthenticated once the
    /// token expires
    pub password: String,
    /// MQTT keep-alive
    pub keep_alive: Duration,
}

impl ConnectionDescriptor {
    pub fn new(broker_url: impl Into<String>, client_id: impl Into<String>, token: String) -> Self {
        Self {
            broker_url: broker_url.into(),
            client_id: client_id.into(),
            username: "unused".to_string(),
            password: token,
            keep_alive: Duration::from_secs(60),
        }
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Map a delivery guarantee onto an MQTT QoS level.
pub fn qos_for(guarantee: DeliveryGuarantee) -> QoS {
    match guarantee {
        DeliveryGuarantee::AtMostOnce => QoS::AtMostOnce,
        DeliveryGuarantee::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Build rumqttc options from a connection descriptor.
///
/// `mqtts://` URLs get TLS with the platform trust roots, which is what the
/// bridge requires; port defaults follow the scheme.
pub fn configure_mqtt_options(descriptor: &ConnectionDescriptor) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&descriptor.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(descriptor.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(descriptor.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(&descriptor.client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    mqtt_options.set_credentials(&descriptor.username, &descriptor.password);
    mqtt_options.set_keep_alive(descriptor.keep_alive);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::new(
            "mqtts://mqtt.example.com:8883",
            "projects/p/locations/r/registries/reg/devices/d",
            "signed-token".to_string(),
        )
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = test_descriptor();
        assert_eq!(descriptor.username, "unused");
        assert_eq!(descriptor.keep_alive, Duration::from_secs(60));
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&test_descriptor());
        assert!(options.is_ok());
    }

    #[test]
    fn test_default_ports_follow_scheme() {
        let mut descriptor = test_descriptor();
        descriptor.broker_url = "mqtts://broker.example.com".to_string();
        let options = configure_mqtt_options(&descriptor).unwrap();
        assert_eq!(options.broker_address().1, 8883);

        descriptor.broker_url = "mqtt://localhost".to_string();
        let options = configure_mqtt_options(&descriptor).unwrap();
        assert_eq!(options.broker_address().1, 1883);
    }

    #[test]
    fn test_invalid_broker_url() {
        let mut descriptor = test_descriptor();
        descriptor.broker_url = "not-a-url".to_string();
        let result = configure_mqtt_options(&descriptor);
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos_for(DeliveryGuarantee::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(qos_for(DeliveryGuarantee::AtLeastOnce), QoS::AtLeastOnce);
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Disconnected("link dropped".to_string())
        );
    }
}
