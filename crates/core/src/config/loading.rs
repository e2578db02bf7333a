use std::path::Path;
use std::time::Duration;

use crate::error::SmartwayError;
use crate::lane::LaneSet;

use super::types::{
    BusConfig, DatabaseConfig, DemandConfig, LearnedConfig, ProtocolConfig, RotationConfig,
    RulesConfig, SmartwayConfig, TrainingConfig,
};

impl SmartwayConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SmartwayError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SmartwayError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults for a single four-way intersection with no database.
    pub fn local() -> Self {
        Self {
            lanes: ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
            bus: BusConfig::default(),
            protocol: ProtocolConfig::default(),
            rules: RulesConfig::default(),
            learned: LearnedConfig::default(),
            rotation: RotationConfig::default(),
            training: TrainingConfig::default(),
            demand: DemandConfig::default(),
            database: DatabaseConfig::default(),
        }
    }

    /// The configured lanes as a validated, ordered set.
    pub fn lane_set(&self) -> Result<LaneSet, SmartwayError> {
        LaneSet::from_ids(self.lanes.iter().cloned())
    }

    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.protocol.ack_poll_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.protocol.settle_ms)
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        self.protocol.ack_timeout_secs.map(Duration::from_secs)
    }

    /// Where vehicle counts are read from: `demand.database_url`, else `database.url`.
    pub fn demand_database_url(&self) -> Option<&str> {
        self.demand
            .database_url
            .as_deref()
            .or(self.database.url.as_deref())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  lanes:     {}", self.lanes.join(","));
        tracing::info!(
            "  bus:       command={} ({}), feedback={} ({})",
            self.bus.command_endpoint,
            self.bus.command_topic,
            self.bus.feedback_endpoint,
            self.bus.feedback_topic
        );
        tracing::info!(
            "  protocol:  ack_timeout={}",
            self.protocol
                .ack_timeout_secs
                .map(|s| format!("{s}s"))
                .unwrap_or_else(|| "none".into())
        );
        tracing::info!(
            "  training:  enabled={}, min_completed={}, retrain_every={}",
            self.training.enabled,
            self.training.min_completed,
            self.training.retrain_every
        );
        tracing::info!(
            "  database:  {}",
            if self.database.url.is_some() { "configured" } else { "(none)" }
        );
        tracing::info!(
            "  demand:    {}",
            if self.demand_database_url().is_some() { "database" } else { "(none)" }
        );
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `SMARTWAY_SECTION_KEY` overrides `section.key`.
    /// Examples:
    /// - `SMARTWAY_LANES` -> `lanes` (comma separated)
    /// - `SMARTWAY_BUS_COMMAND_ENDPOINT` -> `bus.command_endpoint`
    /// - `SMARTWAY_PROTOCOL_ACK_TIMEOUT_SECS` -> `protocol.ack_timeout_secs`
    /// - `SMARTWAY_DATABASE_URL` (or `DATABASE_URL`) -> `database.url`
    /// - `SMARTWAY_DEMAND_DATABASE_URL` -> `demand.database_url`
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SMARTWAY_LANES") {
            self.lanes = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("SMARTWAY_BUS_COMMAND_ENDPOINT") {
            self.bus.command_endpoint = v;
        }
        if let Some(v) = lookup("SMARTWAY_BUS_FEEDBACK_ENDPOINT") {
            self.bus.feedback_endpoint = v;
        }
        if let Some(v) = lookup("SMARTWAY_BUS_COMMAND_TOPIC") {
            self.bus.command_topic = v;
        }
        if let Some(v) = lookup("SMARTWAY_BUS_FEEDBACK_TOPIC") {
            self.bus.feedback_topic = v;
        }
        if let Some(v) = lookup("SMARTWAY_PROTOCOL_ACK_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.protocol.ack_timeout_secs = Some(secs);
            }
        }
        if let Some(v) = lookup("SMARTWAY_TRAINING_ENABLED") {
            if let Ok(enabled) = v.parse::<bool>() {
                self.training.enabled = enabled;
            }
        }
        if let Some(v) = lookup("SMARTWAY_DATABASE_URL").or_else(|| lookup("DATABASE_URL")) {
            self.database.url = Some(v);
        }
        if let Some(v) = lookup("SMARTWAY_DEMAND_DATABASE_URL") {
            self.demand.database_url = Some(v);
        }
    }
}

impl Default for SmartwayConfig {
    fn default() -> Self {
        Self::local()
    }
}
