use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use smartway_core::Strategy;

/// Controller operational counters, logged at shutdown.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerMetrics {
    /// Cycles run, keyed by strategy name.
    pub cycles: HashMap<String, u64>,
    /// Cycles abandoned because quorum never arrived in time.
    pub cycles_aborted: u64,
    pub publish_failures: u64,
    pub acks_accepted: u64,
    pub acks_duplicate: u64,
    /// Feedback that arrived while no cycle was awaiting acknowledgment.
    pub feedback_out_of_phase: u64,
    pub feedback_malformed: u64,
    /// Cycles where the learned strategy failed and rules decided instead.
    pub learned_fallbacks: u64,
    pub records_opened: u64,
    pub records_completed: u64,
    pub retrain_successes: u64,
    pub retrain_failures: u64,
    /// Average time from dispatch to quorum.
    pub avg_quorum_wait: Duration,
    /// Average time from dispatch to the end of the cycle.
    pub avg_cycle_duration: Duration,
    pub last_cycle: Option<DateTime<Utc>>,
}

impl ControllerMetrics {
    /// Record a finished cycle.
    pub fn record_cycle(&mut self, strategy: Strategy, quorum_wait: Option<Duration>, total: Duration) {
        *self.cycles.entry(strategy.as_str().to_string()).or_default() += 1;
        self.last_cycle = Some(Utc::now());

        let count = self.total_cycles();
        self.avg_cycle_duration = running_mean(self.avg_cycle_duration, total, count);

        match quorum_wait {
            Some(wait) => {
                let reached = count - self.cycles_aborted;
                self.avg_quorum_wait = running_mean(self.avg_quorum_wait, wait, reached);
            }
            None => self.cycles_aborted += 1,
        }
    }

    pub fn total_cycles(&self) -> u64 {
        self.cycles.values().sum()
    }
}

/// Incremental mean: `prev + (value - prev) / count`.
fn running_mean(prev: Duration, value: Duration, count: u64) -> Duration {
    if count <= 1 {
        return value;
    }
    let prev = prev.as_secs_f64();
    let cur = value.as_secs_f64();
    Duration::from_secs_f64((prev + (cur - prev) / count as f64).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_are_counted_per_strategy() {
        let mut m = ControllerMetrics::default();
        m.record_cycle(Strategy::RuleBased, Some(Duration::from_secs(1)), Duration::from_secs(10));
        m.record_cycle(Strategy::RuleBased, Some(Duration::from_secs(3)), Duration::from_secs(20));
        m.record_cycle(Strategy::ForcedRotation, None, Duration::from_secs(30));

        assert_eq!(m.cycles["rule_based"], 2);
        assert_eq!(m.cycles["forced_rotation"], 1);
        assert_eq!(m.total_cycles(), 3);
        assert_eq!(m.cycles_aborted, 1);
        assert!(m.last_cycle.is_some());
    }

    #[test]
    fn averages_are_incremental_means() {
        let mut m = ControllerMetrics::default();
        m.record_cycle(Strategy::Learned, Some(Duration::from_millis(100)), Duration::from_secs(8));
        m.record_cycle(Strategy::Learned, Some(Duration::from_millis(300)), Duration::from_secs(12));

        let wait = m.avg_quorum_wait.as_millis();
        assert!((195..=205).contains(&wait), "expected ~200ms, got {wait}ms");
        let cycle = m.avg_cycle_duration.as_millis();
        assert!((9_990..=10_010).contains(&cycle), "expected ~10s, got {cycle}ms");
    }

    #[test]
    fn default_metrics() {
        let m = ControllerMetrics::default();
        assert_eq!(m.total_cycles(), 0);
        assert_eq!(m.avg_cycle_duration, Duration::ZERO);
        assert!(m.last_cycle.is_none());
    }
}
