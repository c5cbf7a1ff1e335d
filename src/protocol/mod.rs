//! Wire-level conventions of the Cloud IoT MQTT bridge
//!
//! Topic names and the client identifier format must be reproduced bit-exact
//! for the bridge to route messages to and from the device.

pub mod messages;
pub mod topics;

pub use messages::{decode_inbound_payload, InboundMessage};
pub use topics::{classify_topic, DeviceTopics, MessageClass};
