//! Impure I/O operations for the MQTT session
//!
//! Owns the rumqttc client and its event loop task. The event loop forwards
//! inbound publishes to the agent loop and tracks the session state; errors
//! are logged and end the session. There is no automatic reconnection and no
//! token refresh: once the link drops the session stays Disconnected.

use super::connection::{configure_mqtt_options, qos_for, ConnectionDescriptor, ConnectionState, MqttError};
use crate::protocol::InboundMessage;
use crate::transport::{DeliveryGuarantee, Transport};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{AsyncClient, Event, EventLoop};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long to wait for the broker's ConnAck before giving up.
const CONNACK_TIMEOUT: Duration = Duration::from_secs(30);

/// MQTT session for one device. At most one live session per process.
pub struct MqttClient {
    descriptor: ConnectionDescriptor,
    client: Arc<Mutex<AsyncClient>>,
    // EventLoop is not Sync; it lives behind a Mutex until connect() moves it
    // into the event loop task.
    event_loop: Option<Mutex<EventLoop>>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    subscribed_topics: Vec<String>,
    message_sender: Arc<StdMutex<Option<mpsc::Sender<InboundMessage>>>>,
}

impl MqttClient {
    /// Build the session from a connection descriptor. No I/O happens until
    /// `connect` is called.
    pub fn new(descriptor: ConnectionDescriptor) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(&descriptor)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        Ok(MqttClient {
            descriptor,
            client: Arc::new(Mutex::new(client)),
            event_loop: Some(Mutex::new(event_loop)),
            event_loop_handle: None,
            state_rx: None,
            shutdown_tx: None,
            subscribed_topics: Vec::new(),
            message_sender: Arc::new(StdMutex::new(None)),
        })
    }

    /// Wait until the state channel reports Connected, or fail on
    /// disconnection or timeout.
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
                match &*state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::Connecting => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Handle one broker event inside the event loop task.
    async fn handle_event(
        event: Event,
        state_tx: &watch::Sender<ConnectionState>,
        message_sender: &Arc<StdMutex<Option<mpsc::Sender<InboundMessage>>>>,
    ) -> bool {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                info!("Connected to MQTT bridge");
                let _ = state_tx.send(ConnectionState::Connected);
                true
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let topic = String::from_utf8_lossy(&publish.topic).to_string();
                debug!(target: "mqtt_transport", "Received message on topic: {}", topic);

                let sender = message_sender
                    .lock()
                    .map(|guard| guard.clone())
                    .unwrap_or(None);
                if let Some(sender) = sender {
                    let message = InboundMessage {
                        topic,
                        payload: publish.payload.to_vec(),
                    };
                    if let Err(e) = sender.send(message).await {
                        warn!("Inbound message dropped, handler gone: {}", e);
                    }
                } else {
                    debug!("No message handler registered, dropping message on {}", topic);
                }
                true
            }
            Event::Incoming(Packet::Disconnect(_)) => {
                warn!("Disconnected by broker");
                let _ = state_tx.send(ConnectionState::Disconnected(
                    "Disconnected by broker".to_string(),
                ));
                false
            }
            Event::Incoming(packet) => {
                debug!(target: "mqtt_transport", "MQTT event: {:?}", packet);
                true
            }
            Event::Outgoing(_) => true,
        }
    }

    /// Connect to the bridge. Returns only once the broker's ConnAck has been
    /// received; a refused or timed-out connection is an error and the
    /// session stays Disconnected.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let mut event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| {
                MqttError::ConnectionFailedStr("Event loop already started".to_string())
            })?
            .into_inner();

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let client_id = self.descriptor.client_id.clone();
        let message_sender = self.message_sender.clone();

        let handle = tokio::spawn(async move {
            info!("Starting MQTT event loop for client: {}", client_id);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Shutdown signal received, stopping MQTT event loop");
                            break;
                        }
                    }
                    event_result = event_loop.poll() => {
                        match event_result {
                            Ok(event) => {
                                if !Self::handle_event(event, &state_tx, &message_sender).await {
                                    break;
                                }
                            }
                            Err(e) => {
                                // No retry here: the link stays down until the
                                // process is restarted with a fresh token.
                                error!("MQTT event loop error: {}", e);
                                let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                                break;
                            }
                        }
                    }
                }
            }
            info!("MQTT event loop stopped for client: {}", client_id);
        });

        self.event_loop_handle = Some(handle);

        Self::wait_for_connection_confirmation(state_rx, CONNACK_TIMEOUT).await
    }

    /// Disconnect and join the event loop task.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        let client = self.client.lock().await;
        client
            .disconnect()
            .await
            .map_err(|e| MqttError::ConnectionFailed(Box::new(e)))?;
        drop(client);

        if let Some(handle) = self.event_loop_handle.take() {
            let abort_handle = handle.abort_handle();
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => info!("Event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Event loop task ended with error: {}", e);
                }
                Err(_) => {
                    warn!("Event loop task didn't shut down gracefully, aborting");
                    abort_handle.abort();
                }
                _ => {}
            }
        }

        info!("MQTT client disconnected");
        Ok(())
    }

    /// Current session state, None before the first connect attempt.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Client not connected: connect() never called".to_string())
        })?;

        let current_state = state_rx.borrow().clone();
        if current_state != ConnectionState::Connected {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }
        Ok(())
    }

    /// Subscribe to a topic or filter with the given delivery guarantee.
    pub async fn subscribe(
        &mut self,
        topic: &str,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), MqttError> {
        self.check_connection_state()?;

        info!("Subscribing to topic: {}", topic);
        let client = self.client.lock().await;
        client
            .subscribe(topic, qos_for(guarantee))
            .await
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;

        if !self.subscribed_topics.contains(&topic.to_string()) {
            self.subscribed_topics.push(topic.to_string());
        }
        Ok(())
    }

    /// Publish a payload. For at-least-once, retransmission until
    /// acknowledged is delegated to rumqttc.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), MqttError> {
        self.check_connection_state()?;

        let client = self.client.lock().await;
        client
            .publish(topic, qos_for(guarantee), false, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!("Published message to {}", topic);
        Ok(())
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), Self::Error> {
        MqttClient::subscribe(self, topic, guarantee).await
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), Self::Error> {
        MqttClient::publish(self, topic, payload, guarantee).await
    }

    fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        // Synchronous: the sender must be in place before the first subscribe
        // completes, or a retained config pushed by the broker is lost.
        if let Ok(mut guard) = self.message_sender.lock() {
            *guard = Some(sender);
        }
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
        // Async disconnect is not possible here; callers should disconnect()
        // explicitly for a graceful shutdown.
    }
}
