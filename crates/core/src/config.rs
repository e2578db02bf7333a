//! Controller configuration.
//!
//! Loaded from `smartway.toml`, overridden by `SMARTWAY_*` environment
//! variables, then validated before anything else starts.

mod loading;
mod types;
mod validation;


pub use types::{
    BusConfig, DatabaseConfig, DemandConfig, DurationTier, LearnedConfig, ProtocolConfig,
    RotationConfig, RulesConfig, SmartwayConfig, TrainingConfig,
};
