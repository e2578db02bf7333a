//! Integration tests for direct PUB/SUB between controller and endpoints.
//!
//! The controller binds both sockets; endpoints connect. These tests cover
//! both directions plus topic filtering.

use std::time::Duration;

use tokio::time::timeout;

use smartway_bus::transport::Transport;
use smartway_bus::{EventPublisher, EventSubscriber, Message, ZmqPublisher, ZmqSubscriber};

const TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(200);

#[tokio::test]
async fn bound_subscriber_receives_from_connected_publishers() {
    let endpoint = Transport::tcp("127.0.0.1", 15810);

    let sub = ZmqSubscriber::bind(&endpoint).await.unwrap();
    sub.subscribe("3105/confirmacao").await.unwrap();

    let lane_a = ZmqPublisher::connect(&endpoint).await.unwrap();
    let lane_b = ZmqPublisher::connect(&endpoint).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    lane_a
        .publish(Message::raw("3105/confirmacao", "A"))
        .await
        .unwrap();
    lane_b
        .publish(Message::raw("3105/confirmacao", r#"{"B": 12}"#))
        .await
        .unwrap();

    let mut payloads = Vec::new();
    for _ in 0..2 {
        let msg = timeout(TIMEOUT, sub.recv())
            .await
            .expect("timed out")
            .unwrap();
        assert_eq!(msg.topic, "3105/confirmacao");
        payloads.push(msg.payload_str().unwrap().to_string());
    }

    payloads.sort();
    assert_eq!(payloads, vec!["A".to_string(), r#"{"B": 12}"#.to_string()]);
}

#[tokio::test]
async fn subscriber_filters_by_topic_prefix() {
    let endpoint = Transport::tcp("127.0.0.1", 15811);

    let publisher = ZmqPublisher::bind(&endpoint).await.unwrap();
    let sub = ZmqSubscriber::connect(&endpoint).await.unwrap();
    sub.subscribe("3105/comando").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    publisher
        .publish(Message::raw("9999/comando", r#"{"A":"L"}"#))
        .await
        .unwrap();
    publisher
        .publish(Message::json("3105/comando", &serde_json::json!({"A": {"V": 8}})).unwrap())
        .await
        .unwrap();

    let msg = timeout(TIMEOUT, sub.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(msg.topic, "3105/comando");
    let value: serde_json::Value = msg.decode().unwrap();
    assert_eq!(value["A"]["V"], 8);

    // Nothing else should arrive: the other topic was filtered out.
    assert!(timeout(Duration::from_millis(300), sub.recv()).await.is_err());
}
