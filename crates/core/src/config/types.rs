use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for the intersection controller.
///
/// Parsed from `smartway.toml` with support for environment variable overrides.
/// Every tunable the scheduling core uses lives here; nothing is hard-coded
/// inside the decision or protocol components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartwayConfig {
    /// Ordered lane identifiers. Order breaks ties and drives rotation.
    #[serde(default = "default_lanes")]
    pub lanes: Vec<String>,

    /// Pub/sub endpoints and topics.
    #[serde(default)]
    pub bus: BusConfig,

    /// Broadcast/acknowledge protocol tunables.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Rule-based scoring and duration tiers.
    #[serde(default)]
    pub rules: RulesConfig,

    /// Learned strategy adjustments.
    #[serde(default)]
    pub learned: LearnedConfig,

    /// Forced rotation and fairness rounds.
    #[serde(default)]
    pub rotation: RotationConfig,

    /// Training record collection and retrain cadence.
    #[serde(default)]
    pub training: TrainingConfig,

    /// Demand provider settings.
    #[serde(default)]
    pub demand: DemandConfig,

    /// Optional PostgreSQL connection.
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_lanes() -> Vec<String> {
    ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect()
}

// ── Section configs ─────────────────────────────────────────────────

/// Bus section: where commands go out and acknowledgments come in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Endpoint the controller binds its PUB socket on.
    #[serde(default = "default_command_endpoint")]
    pub command_endpoint: String,

    /// Endpoint the controller binds its SUB socket on.
    #[serde(default = "default_feedback_endpoint")]
    pub feedback_endpoint: String,

    #[serde(default = "default_command_topic")]
    pub command_topic: String,

    #[serde(default = "default_feedback_topic")]
    pub feedback_topic: String,

    /// Capacity of the bounded queue between the transport and the ack handler.
    #[serde(default = "default_feedback_queue")]
    pub feedback_queue: usize,
}

fn default_command_endpoint() -> String {
    "tcp://0.0.0.0:5600".into()
}

fn default_feedback_endpoint() -> String {
    "tcp://0.0.0.0:5601".into()
}

fn default_command_topic() -> String {
    "3105/comando".into()
}

fn default_feedback_topic() -> String {
    "3105/confirmacao".into()
}

fn default_feedback_queue() -> usize {
    64
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            command_endpoint: default_command_endpoint(),
            feedback_endpoint: default_feedback_endpoint(),
            command_topic: default_command_topic(),
            feedback_topic: default_feedback_topic(),
            feedback_queue: default_feedback_queue(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Value sent to lanes that must stay (or turn) red.
    #[serde(default = "default_stop_token")]
    pub stop_token: String,

    /// Key of the `{ <open_token>: seconds }` object sent to the green lane.
    #[serde(default = "default_open_token")]
    pub open_token: String,

    /// How often the loop re-checks the ack set while awaiting quorum.
    #[serde(default = "default_ack_poll_ms")]
    pub ack_poll_ms: u64,

    /// Pause before each new decision cycle.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Abort a cycle that has not reached quorum after this many seconds.
    /// Absent means wait forever.
    #[serde(default)]
    pub ack_timeout_secs: Option<u64>,
}

fn default_stop_token() -> String {
    "L".into()
}

fn default_open_token() -> String {
    "V".into()
}

fn default_ack_poll_ms() -> u64 {
    100
}

fn default_settle_ms() -> u64 {
    500
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            stop_token: default_stop_token(),
            open_token: default_open_token(),
            ack_poll_ms: default_ack_poll_ms(),
            settle_ms: default_settle_ms(),
            ack_timeout_secs: None,
        }
    }
}

/// One rung of the duration ladder: lanes with at most `max_count` cars get `seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationTier {
    pub max_count: u32,
    pub seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Score bonus per cycle a lane has waited.
    #[serde(default = "default_rules_bonus")]
    pub starvation_bonus: f64,

    /// Ascending duration tiers keyed by the chosen lane's car count.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<DurationTier>,

    /// Duration for counts above the last tier.
    #[serde(default = "default_overflow_seconds")]
    pub overflow_seconds: u32,

    #[serde(default = "default_dominance_ratio")]
    pub dominance_ratio: f64,

    #[serde(default = "default_dominance_min_count")]
    pub dominance_min_count: u32,

    #[serde(default = "default_dominance_factor")]
    pub dominance_factor: f64,

    #[serde(default = "default_starvation_cycles")]
    pub starvation_cycles: u32,

    #[serde(default = "default_starvation_min_count")]
    pub starvation_min_count: u32,

    #[serde(default = "default_starvation_extra_secs")]
    pub starvation_extra_secs: u32,
}

fn default_rules_bonus() -> f64 { 2.0 }
fn default_overflow_seconds() -> u32 { 25 }
fn default_dominance_ratio() -> f64 { 0.5 }
fn default_dominance_min_count() -> u32 { 5 }
fn default_dominance_factor() -> f64 { 1.2 }
fn default_starvation_cycles() -> u32 { 5 }
fn default_starvation_min_count() -> u32 { 3 }
fn default_starvation_extra_secs() -> u32 { 3 }

fn default_tiers() -> Vec<DurationTier> {
    vec![
        DurationTier { max_count: 0, seconds: 5 },
        DurationTier { max_count: 2, seconds: 8 },
        DurationTier { max_count: 5, seconds: 12 },
        DurationTier { max_count: 10, seconds: 18 },
    ]
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            starvation_bonus: default_rules_bonus(),
            tiers: default_tiers(),
            overflow_seconds: default_overflow_seconds(),
            dominance_ratio: default_dominance_ratio(),
            dominance_min_count: default_dominance_min_count(),
            dominance_factor: default_dominance_factor(),
            starvation_cycles: default_starvation_cycles(),
            starvation_min_count: default_starvation_min_count(),
            starvation_extra_secs: default_starvation_extra_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedConfig {
    /// Log-probability bonus per cycle a lane has waited.
    #[serde(default = "default_learned_bonus")]
    pub starvation_bonus: f64,
}

fn default_learned_bonus() -> f64 {
    0.1
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            starvation_bonus: default_learned_bonus(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Green duration for forced-rotation decisions.
    #[serde(default = "default_forced_seconds")]
    pub forced_seconds: u32,

    /// Restrict candidates to lanes not yet opened in the current round.
    #[serde(default = "default_enforce_rounds")]
    pub enforce_rounds: bool,
}

fn default_forced_seconds() -> u32 {
    10
}

fn default_enforce_rounds() -> bool {
    true
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            forced_seconds: default_forced_seconds(),
            enforce_rounds: default_enforce_rounds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Persist training records and retrain the learned strategy.
    #[serde(default = "default_training_enabled")]
    pub enabled: bool,

    /// Completed records needed before the first training run.
    #[serde(default = "default_min_completed")]
    pub min_completed: usize,

    /// Retrain after this many cycles once a model is active.
    #[serde(default = "default_retrain_every")]
    pub retrain_every: u32,

    /// Most recent completed records fed to each training run.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_training_enabled() -> bool { true }
fn default_min_completed() -> usize { 10 }
fn default_retrain_every() -> u32 { 20 }
fn default_window() -> usize { 1000 }

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            enabled: default_training_enabled(),
            min_completed: default_min_completed(),
            retrain_every: default_retrain_every(),
            window: default_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandConfig {
    /// Warn when the newest count is older than this.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Counter lane id → configured lane id. Unmapped ids are used as-is.
    #[serde(default)]
    pub lane_mapping: BTreeMap<String, String>,

    /// Vehicle-counter database, when it is not the training database.
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_stale_after() -> u64 {
    10
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
            lane_mapping: BTreeMap::new(),
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. When absent, in-memory storage is used and demand is unavailable.
    pub url: Option<String>,
}
