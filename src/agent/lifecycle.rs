//! Station agent lifecycle
//!
//! Composes the credential signer, telemetry generator and transport session:
//! connect once, subscribe to config and commands, then publish one telemetry
//! reading per interval until shutdown. Inbound messages are classified,
//! decoded and logged; no action is taken on their content.

use crate::config::StationConfig;
use crate::protocol::{decode_inbound_payload, DeviceTopics, InboundMessage};
use crate::telemetry::TelemetryGenerator;
use crate::transport::{DeliveryGuarantee, Transport};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Buffer for inbound messages between the transport and the handler task.
const INBOUND_CHANNEL_CAPACITY: usize = 32;

/// Agent lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to connect to broker: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Failed to subscribe to {topic}: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Agent already started")]
    AlreadyStarted,
    #[error("Error during shutdown: {0}")]
    Shutdown(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The station agent: owns the transport session and the two background
/// tasks (telemetry cadence, inbound handler).
pub struct StationAgent<T>
where
    T: Transport + 'static,
{
    topics: DeviceTopics,
    generator: TelemetryGenerator,
    publish_interval: Duration,
    transport: Arc<Mutex<T>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    telemetry_handle: Option<JoinHandle<()>>,
    inbound_handle: Option<JoinHandle<()>>,
}

impl<T> StationAgent<T>
where
    T: Transport + 'static,
{
    /// Create the agent with an injected transport.
    pub fn new(config: &StationConfig, transport: T) -> Self {
        Self {
            topics: DeviceTopics::new(config.device.id.clone()),
            generator: TelemetryGenerator::new(config.device.id.clone()),
            publish_interval: Duration::from_secs(config.telemetry.publish_interval_secs),
            transport: Arc::new(Mutex::new(transport)),
            shutdown_tx: None,
            telemetry_handle: None,
            inbound_handle: None,
        }
    }

    /// Connect, subscribe, and start the publish cadence.
    ///
    /// On connect failure nothing is subscribed and nothing is published; the
    /// error propagates to the caller.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        if self.shutdown_tx.is_some() {
            return Err(LifecycleError::AlreadyStarted);
        }

        {
            let mut transport = self.transport.lock().await;
            transport
                .connect()
                .await
                .map_err(|e| LifecycleError::Connect(Box::new(e)))?;
            info!("Connected to broker");

            // The broker can push a retained config the instant a subscribe
            // completes; the inbound sender must already be registered.
            let (message_tx, message_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
            transport.set_message_sender(message_tx);

            let config_topic = self.topics.config_topic();
            transport
                .subscribe(&config_topic, DeliveryGuarantee::AtLeastOnce)
                .await
                .map_err(|e| LifecycleError::Subscribe {
                    topic: config_topic.clone(),
                    source: Box::new(e),
                })?;

            let commands_filter = self.topics.commands_filter();
            transport
                .subscribe(&commands_filter, DeliveryGuarantee::AtMostOnce)
                .await
                .map_err(|e| LifecycleError::Subscribe {
                    topic: commands_filter.clone(),
                    source: Box::new(e),
                })?;

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            self.shutdown_tx = Some(shutdown_tx);

            self.inbound_handle = Some(Self::spawn_inbound_handler(
                self.topics.clone(),
                message_rx,
                shutdown_rx.clone(),
            ));
            self.telemetry_handle = Some(Self::spawn_telemetry_task(
                self.transport.clone(),
                self.topics.events_topic(),
                self.generator.clone(),
                self.publish_interval,
                shutdown_rx,
            ));
        }

        info!("Station agent started for device: {}", self.generator.device_id());
        Ok(())
    }

    /// Publish one reading per interval. Each cycle is scheduled relative to
    /// the previous cycle's completion; publish failures are logged and the
    /// cadence continues.
    fn spawn_telemetry_task(
        transport: Arc<Mutex<T>>,
        events_topic: String,
        generator: TelemetryGenerator,
        period: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Telemetry task stopping");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let reading = generator.next_reading();
                        let payload = match serde_json::to_vec(&reading) {
                            Ok(payload) => payload,
                            Err(e) => {
                                error!("Failed to serialize telemetry reading: {}", e);
                                continue;
                            }
                        };

                        info!(
                            topic = %events_topic,
                            "Publishing message: {}",
                            String::from_utf8_lossy(&payload)
                        );

                        let transport = transport.lock().await;
                        if let Err(e) = transport
                            .publish(&events_topic, payload, DeliveryGuarantee::AtLeastOnce)
                            .await
                        {
                            error!("Failed to publish telemetry: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Classify, decode and log inbound messages in arrival order.
    fn spawn_inbound_handler(
        topics: DeviceTopics,
        mut message_rx: mpsc::Receiver<InboundMessage>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Inbound handler stopping");
                            break;
                        }
                    }
                    message = message_rx.recv() => {
                        match message {
                            Some(message) => {
                                info!("{}", format_inbound(&topics, &message));
                            }
                            None => {
                                warn!("Inbound channel closed, handler stopping");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    /// Signal the background tasks, join them, and disconnect the transport.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        for handle in [self.telemetry_handle.take(), self.inbound_handle.take()]
            .into_iter()
            .flatten()
        {
            let abort_handle = handle.abort_handle();
            if tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .is_err()
            {
                warn!("Background task didn't stop in time, aborting");
                abort_handle.abort();
            }
        }

        let mut transport = self.transport.lock().await;
        transport
            .disconnect()
            .await
            .map_err(|e| LifecycleError::Shutdown(Box::new(e)))?;

        info!("Station agent shut down");
        Ok(())
    }

    /// Whether the underlying session is currently connected.
    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_connected()
    }

    /// Shared handle to the transport, used by tests to inspect state.
    pub fn transport(&self) -> Arc<Mutex<T>> {
        self.transport.clone()
    }
}

/// Build the log line for an inbound message: classification label plus the
/// base64-decoded payload text.
pub fn format_inbound(topics: &DeviceTopics, message: &InboundMessage) -> String {
    let class = topics.classify(&message.topic);
    let text = decode_inbound_payload(&message.payload);
    format!("{}: {}", class.label(), text)
}
