//! Pluggable learned model behind the learned strategy.
//!
//! The controller only needs class probabilities per lane, a duration
//! prediction, and a way to retrain from completed records. Any model that
//! fits [`LaneModel`] can be dropped in; [`CentroidModel`] is the default.

pub mod centroid;

use serde::Serialize;

use crate::engine::features::TrainingRow;
use crate::error::ModelError;

pub use centroid::CentroidModel;

/// Outcome of a successful training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub rows: usize,
    /// Share of training rows whose lane the classifier reproduces.
    pub lane_accuracy: f64,
    /// Mean absolute error of the duration regressor on the training rows.
    pub duration_mae: f64,
}

/// A trainable lane classifier plus duration regressor.
///
/// Implementations use interior mutability so a shared handle can be
/// retrained on a blocking thread while the control loop keeps a reference.
pub trait LaneModel: Send + Sync {
    fn is_trained(&self) -> bool;

    /// Probability per lane, in configuration order.
    fn lane_probabilities(&self, features: &[f64]) -> Result<Vec<f64>, ModelError>;

    /// Suggested green seconds; callers clamp and adjust it.
    fn green_seconds(&self, features: &[f64]) -> Result<f64, ModelError>;

    /// Replace the fitted state with one trained on `rows`.
    fn retrain(&self, rows: &[TrainingRow]) -> Result<TrainingSummary, ModelError>;
}
