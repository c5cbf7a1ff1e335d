//! Mock implementations for testing
//!
//! Provides a mock Transport so the agent loop can be exercised without a
//! broker.

use crate::protocol::InboundMessage;
use crate::transport::mqtt::ConnectionState;
use crate::transport::{DeliveryGuarantee, Transport};
use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};

pub type PublishedMessage = (String, Vec<u8>, DeliveryGuarantee);
pub type Subscription = (String, DeliveryGuarantee);

/// Mock transport recording every call for later inspection.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub subscriptions: Arc<Mutex<Vec<Subscription>>>,
    pub published: Arc<Mutex<Vec<PublishedMessage>>>,
    pub should_fail: bool,
    pub hang_on_publish: bool,
    pub connected: Arc<Mutex<bool>>,
    pub message_sender: Arc<StdMutex<Option<mpsc::Sender<InboundMessage>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose connect and publish calls fail.
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// A transport whose publish calls never complete.
    pub fn with_hanging_publish() -> Self {
        Self {
            hang_on_publish: true,
            ..Default::default()
        }
    }

    pub async fn get_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().await.clone()
    }

    pub async fn get_published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    /// Inject an inbound message as if the broker delivered it.
    pub async fn deliver(&self, message: InboundMessage) {
        let sender = self
            .message_sender
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(None);
        if let Some(sender) = sender {
            let _ = sender.send(message).await;
        }
    }
}

/// Mock transport error
#[derive(Debug, thiserror::Error)]
#[error("Mock transport failure: {0}")]
pub struct MockTransportError(pub String);

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MockTransportError("connect refused".to_string()));
        }
        *self.connected.lock().await = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        *self.connected.lock().await = false;
        Ok(())
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MockTransportError("subscribe refused".to_string()));
        }
        self.subscriptions
            .lock()
            .await
            .push((topic.to_string(), guarantee));
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MockTransportError("publish refused".to_string()));
        }
        if self.hang_on_publish {
            std::future::pending::<()>().await;
        }
        self.published
            .lock()
            .await
            .push((topic.to_string(), payload, guarantee));
        Ok(())
    }

    fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        if let Ok(mut guard) = self.message_sender.lock() {
            *guard = Some(sender);
        }
    }

    fn is_connected(&self) -> bool {
        // Synchronous view; tests that need exact state use `connected` directly
        self.connected.try_lock().map(|c| *c).unwrap_or(false)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        if self.is_connected() {
            Some(ConnectionState::Connected)
        } else {
            None
        }
    }
}
