//! ZeroMQ pub/sub plumbing between the controller and the lane endpoints.
//!
//! The controller publishes signal commands on one topic and listens for
//! acknowledgments on another. Payloads travel unwrapped so that small
//! endpoint firmware can produce and parse them directly.

pub mod error;
pub mod message;
pub mod pubsub;
pub mod traits;
pub mod transport;

pub use error::BusError;
pub use message::Message;
pub use pubsub::{ZmqPublisher, ZmqSubscriber};
pub use traits::{EventPublisher, EventSubscriber};
pub use transport::Transport;
