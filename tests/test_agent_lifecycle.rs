//! Agent loop integration tests against a mock transport

use envstation::agent::StationAgent;
use envstation::config::StationConfig;
use envstation::protocol::InboundMessage;
use envstation::telemetry::TelemetryReading;
use envstation::testing::MockTransport;
use envstation::transport::DeliveryGuarantee;
use std::time::Duration;

fn test_config() -> StationConfig {
    let toml_content = r#"
[device]
id = "station"
project = "awesome-sylph-271611"
region = "us-central1"
registry = "assignment1"

[mqtt]
broker_url = "mqtts://mqtt.googleapis.com:8883"

[auth]
private_key_path = "./rsa_private.pem"
"#;
    toml::from_str(toml_content).unwrap()
}

#[tokio::test]
async fn test_start_subscribes_config_then_commands() {
    let mock = MockTransport::new();
    let subscriptions = mock.subscriptions.clone();

    let mut agent = StationAgent::new(&test_config(), mock);
    agent.start().await.expect("start should succeed");

    let subs = subscriptions.lock().await.clone();
    assert_eq!(
        subs,
        vec![
            (
                "/devices/station/config".to_string(),
                DeliveryGuarantee::AtLeastOnce
            ),
            (
                "/devices/station/commands/#".to_string(),
                DeliveryGuarantee::AtMostOnce
            ),
        ]
    );

    agent.shutdown().await.expect("shutdown should succeed");
}

#[tokio::test]
async fn test_connect_failure_means_no_subscribe_no_publish() {
    let mock = MockTransport::with_failure();
    let subscriptions = mock.subscriptions.clone();
    let published = mock.published.clone();

    let mut agent = StationAgent::new(&test_config(), mock);
    let result = agent.start().await;
    assert!(result.is_err(), "start must fail when connect fails");

    // Give any wrongly-spawned task a chance to run
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(subscriptions.lock().await.is_empty());
    assert!(published.lock().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_cadence() {
    let mock = MockTransport::new();
    let published = mock.published.clone();

    let mut agent = StationAgent::new(&test_config(), mock);
    agent.start().await.unwrap();

    // Nothing is published before the first interval elapses
    tokio::time::advance(Duration::from_secs(4)).await;
    tokio::task::yield_now().await;
    assert!(published.lock().await.is_empty());

    // One reading per 5-second interval, indefinitely
    for expected in 1..=5usize {
        tokio::time::advance(Duration::from_secs(5)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(published.lock().await.len(), expected);
    }

    for (topic, payload, guarantee) in published.lock().await.iter() {
        assert_eq!(topic, "/devices/station/events");
        assert_eq!(*guarantee, DeliveryGuarantee::AtLeastOnce);

        let reading: TelemetryReading = serde_json::from_slice(payload).unwrap();
        assert_eq!(reading.device_id, "station");
        assert!((-50..50).contains(&reading.temperature));
        assert!((0..100).contains(&reading.humidity));
        assert!((0..360).contains(&reading.wind_direction));
        assert!((0..100).contains(&reading.wind_intensity));
        assert!((0..50).contains(&reading.rain_height));
    }

    agent.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_publishes_after_shutdown() {
    let mock = MockTransport::new();
    let published = mock.published.clone();
    let connected = mock.connected.clone();

    let mut agent = StationAgent::new(&test_config(), mock);
    agent.start().await.unwrap();

    tokio::time::advance(Duration::from_secs(5)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let count_before = published.lock().await.len();
    assert_eq!(count_before, 1);

    agent.shutdown().await.unwrap();
    assert!(!*connected.lock().await);

    tokio::time::advance(Duration::from_secs(30)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(published.lock().await.len(), count_before);
}

#[tokio::test]
async fn test_inbound_delivery_does_not_disturb_agent() {
    let mock = MockTransport::new();
    let sender_slot = mock.message_sender.clone();

    let mut agent = StationAgent::new(&test_config(), mock);
    agent.start().await.unwrap();

    let sender = sender_slot.lock().unwrap().clone().unwrap();
    for topic in [
        "/devices/station/config",
        "/devices/station/commands/reboot",
        "/somewhere/else",
    ] {
        sender
            .send(InboundMessage {
                topic: topic.to_string(),
                payload: b"aGVsbG8=".to_vec(),
            })
            .await
            .expect("handler should be consuming messages");
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    agent.shutdown().await.expect("shutdown should succeed");
}

#[tokio::test]
async fn test_message_sender_registered_when_start_returns() {
    let mock = MockTransport::new();
    let sender_slot = mock.message_sender.clone();

    let mut agent = StationAgent::new(&test_config(), mock);
    agent.start().await.unwrap();

    // A retained config can arrive the instant a subscribe completes; the
    // sender must be in place before start() returns, with no task scheduling
    // in between.
    let sender = sender_slot
        .lock()
        .unwrap()
        .clone()
        .expect("message sender must be registered before start() returns");

    sender
        .send(InboundMessage {
            topic: "/devices/station/config".to_string(),
            payload: b"aW50ZXJ2YWw9MTA=".to_vec(),
        })
        .await
        .expect("handler should be consuming messages");

    agent.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_stuck_publish() {
    let mock = MockTransport::with_hanging_publish();
    let mut agent = StationAgent::new(&test_config(), mock);
    agent.start().await.unwrap();

    // Drive the telemetry task into its never-completing publish
    tokio::time::advance(Duration::from_secs(5)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    // The join times out, the task is aborted, and shutdown still completes
    agent
        .shutdown()
        .await
        .expect("shutdown must not hang on a stuck task");
}

#[tokio::test]
async fn test_start_twice_is_an_error() {
    let mock = MockTransport::new();
    let mut agent = StationAgent::new(&test_config(), mock);
    agent.start().await.unwrap();

    let result = agent.start().await;
    assert!(result.is_err(), "second start must be rejected");

    agent.shutdown().await.unwrap();
}
