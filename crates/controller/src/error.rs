use thiserror::Error;

use smartway_bus::BusError;
use smartway_core::{RecordId, SmartwayError};

/// Errors from the training-record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("training record {0} not found")]
    NotFound(RecordId),

    #[error("corrupt training row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// Errors from the vehicle-count source.
#[derive(Error, Debug)]
pub enum DemandError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid count for lane {lane}: {value}")]
    InvalidCount { lane: String, value: i64 },
}

/// Errors from the learned lane model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("model is not trained")]
    NotTrained,

    #[error("not enough training rows: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("malformed model input or output: {0}")]
    Malformed(String),

    #[error("training task failed: {0}")]
    Training(String),
}

/// Why an inbound feedback payload was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedbackError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("unrecognized feedback payload: {0}")]
    Unrecognized(String),

    #[error("feedback for unknown lane: {0}")]
    UnknownLane(String),
}

/// Fatal startup errors. Nothing in the running control loop produces one.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] SmartwayError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("invalid endpoint (expected tcp://host:port): {0}")]
    Endpoint(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
