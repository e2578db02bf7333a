//! Intersection scheduling controller.
//!
//! Picks which lane gets the green next, broadcasts the command to every
//! lane endpoint, waits until all of them acknowledge, holds the green for
//! its full duration, and records the outcome so a learned strategy can
//! take over from the rule-based one.

pub mod controller;
pub mod db;
pub mod demand;
pub mod engine;
pub mod error;
pub mod fairness;
pub mod metrics;
pub mod model;
pub mod protocol;
pub mod recorder;
pub mod store;
pub mod training;

pub use controller::{Controller, ControllerDeps};
pub use demand::{DemandProvider, NullDemandProvider, PgDemandProvider};
pub use engine::{ActiveStrategy, DecisionEngine, DecisionInput, DecisionStrategy};
pub use error::{ControllerError, DemandError, FeedbackError, ModelError, StoreError};
pub use fairness::{FairnessSnapshot, FairnessTracker};
pub use metrics::ControllerMetrics;
pub use model::{CentroidModel, LaneModel, TrainingSummary};
pub use protocol::{CycleReport, CyclePhase, ProtocolCoordinator, QuorumOutcome, SharedState};
pub use recorder::{Completion, TrainingRecorder};
pub use store::{MemoryTrainingStore, PgTrainingStore, TrainingStore};
pub use training::{ModelTrainer, RetrainPolicy};
