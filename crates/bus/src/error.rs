use thiserror::Error;

/// Errors that can occur in the pub/sub layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("channel closed")]
    Closed,
}
