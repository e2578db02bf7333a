use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::BusError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};
use crate::transport::Transport;

/// ZeroMQ PUB socket.
///
/// Messages are sent as two-frame ZMQ messages:
/// 1. Topic string (used by SUB sockets for prefix filtering)
/// 2. Raw payload bytes
///
/// The controller binds its publisher so that lane endpoints can connect
/// and disconnect freely.
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
}

impl ZmqPublisher {
    /// Create a publisher that connects to a remote SUB endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting PUB socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Create a publisher that binds to the given endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding PUB socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventPublisher for ZmqPublisher {
    /// Publish a message as a two-frame ZMQ message: [topic, payload].
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        let mut zmq_msg = ZmqMessage::from(message.topic.as_str());
        zmq_msg.push_back(message.payload.into());

        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;

        debug!(topic = %message.topic, "published message");
        Ok(())
    }
}

/// ZeroMQ SUB socket.
///
/// Receives two-frame ZMQ messages `[topic, payload]`. A single-frame
/// message is treated as a bare payload with an empty topic, which is what
/// minimal endpoints that skip the topic frame produce.
pub struct ZmqSubscriber {
    socket: Mutex<SubSocket>,
}

impl ZmqSubscriber {
    /// Create a subscriber that connects to a remote PUB endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = SubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting SUB socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Create a subscriber that binds, so many publishers can connect to it.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = SubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding SUB socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventSubscriber for ZmqSubscriber {
    /// Subscribe to messages with topics matching the given prefix.
    ///
    /// An empty string subscribes to all topics.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        let mut socket = self.socket.lock().await;
        socket.subscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "subscribed to topic prefix");
        Ok(())
    }

    async fn recv(&self) -> Result<Message, BusError> {
        let mut socket = self.socket.lock().await;
        let zmq_msg = socket.recv().await?;
        let frames: Vec<_> = zmq_msg.iter().collect();

        let message = match frames.as_slice() {
            [] => return Err(BusError::Transport("empty ZMQ message".into())),
            [only] => Message::raw(String::new(), only.to_vec()),
            [topic, payload, ..] => {
                Message::raw(String::from_utf8_lossy(topic).into_owned(), payload.to_vec())
            }
        };
        debug!(topic = %message.topic, bytes = message.payload.len(), "received message");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zmq_message_two_frame_construction() {
        let topic = "3105/comando";
        let payload = br#"{"A":"L"}"#;

        let mut msg = ZmqMessage::from(topic);
        msg.push_back(payload.to_vec().into());

        let frames: Vec<_> = msg.iter().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), topic.as_bytes());
        assert_eq!(frames[1].as_ref(), payload);
    }

    #[tokio::test]
    async fn direct_pub_sub_roundtrip() {
        let transport = Transport::tcp("127.0.0.1", 15800);

        let publisher = ZmqPublisher::bind(&transport).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let subscriber = ZmqSubscriber::connect(&transport).await.unwrap();
        subscriber.subscribe("3105/").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let msg = Message::json("3105/comando", &serde_json::json!({"A": {"V": 12}})).unwrap();
        publisher.publish(msg).await.unwrap();

        let received = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            subscriber.recv(),
        )
        .await
        .expect("timed out waiting for message")
        .unwrap();

        assert_eq!(received.topic, "3105/comando");
        let value: serde_json::Value = received.decode().unwrap();
        assert_eq!(value["A"]["V"], 12);
    }
}
