//! Inbound message handling
//!
//! Messages arriving from the bridge carry a base64-encoded text payload.
//! They are classified by topic, decoded and logged; no action is taken on
//! the decoded content.

use super::topics::MessageClass;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// A message delivered by the broker on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl MessageClass {
    /// Log label for a message of this class.
    pub fn label(&self) -> &'static str {
        match self {
            MessageClass::Config => "Config message received",
            MessageClass::Command => "Command message received",
            MessageClass::Other => "Message received",
        }
    }
}

/// Decode an inbound payload as base64 text. Payloads that are not valid
/// base64 (or decode to non-UTF-8 bytes) fall back to a lossy UTF-8 view of
/// the raw bytes so the message is still loggable.
pub fn decode_inbound_payload(payload: &[u8]) -> String {
    match BASE64.decode(payload) {
        Ok(decoded) => match String::from_utf8(decoded) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        },
        Err(_) => String::from_utf8_lossy(payload).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(MessageClass::Config.label(), "Config message received");
        assert_eq!(MessageClass::Command.label(), "Command message received");
        assert_eq!(MessageClass::Other.label(), "Message received");
    }

    #[test]
    fn test_decode_base64_text() {
        // "interval=10" base64-encoded
        assert_eq!(decode_inbound_payload(b"aW50ZXJ2YWw9MTA="), "interval=10");
    }

    #[test]
    fn test_decode_falls_back_to_raw_text() {
        assert_eq!(decode_inbound_payload(b"not base64!!"), "not base64!!");
    }

    #[test]
    fn test_decode_empty_payload() {
        assert_eq!(decode_inbound_payload(b""), "");
    }
}
