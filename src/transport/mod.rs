//! Transport layer for broker communication
//!
//! This module provides a transport abstraction and the MQTT implementation
//! used to talk to the Cloud IoT bridge.

use crate::protocol::InboundMessage;

pub mod mqtt;

/// Delivery guarantee for published and subscribed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryGuarantee {
    /// Fire and forget (QoS 0)
    AtMostOnce,
    /// Retransmitted by the transport until acknowledged (QoS 1)
    AtLeastOnce,
}

/// Transport trait for the station's broker session
///
/// Abstracts over the MQTT client to enable dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish the authenticated connection to the broker
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Disconnect from the broker and stop background tasks
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Register interest in a topic or topic filter
    async fn subscribe(
        &mut self,
        topic: &str,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), Self::Error>;

    /// Publish a payload to a topic
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), Self::Error>;

    /// Set the sender used to forward inbound messages to the agent loop
    fn set_message_sender(&self, sender: tokio::sync::mpsc::Sender<InboundMessage>);

    /// Check if the transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get the current connection state, if a connection was ever attempted
    fn connection_state(&self) -> Option<mqtt::ConnectionState>;
}
