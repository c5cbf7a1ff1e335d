//! MQTT transport implementation over rumqttc

mod client;
mod connection;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, ConnectionDescriptor, ConnectionState, MqttError};
