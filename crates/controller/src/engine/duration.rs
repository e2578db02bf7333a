//! Green-time policy shared by both strategies.

use smartway_core::config::RulesConfig;
use smartway_core::{clamp_green_secs, MAX_GREEN_SECS, MIN_GREEN_SECS};

/// Seconds for the first tier that covers `count`, or `None` above the last tier.
fn tier_seconds(count: u32, rules: &RulesConfig) -> Option<u32> {
    rules
        .tiers
        .iter()
        .find(|tier| count <= tier.max_count)
        .map(|tier| tier.seconds)
}

/// Rule-based duration: tier lookup, then dominance and starvation adjustments.
pub fn rule_seconds(count: u32, total: u32, cycles_since_open: u32, rules: &RulesConfig) -> u32 {
    let base = tier_seconds(count, rules).unwrap_or(rules.overflow_seconds);
    adjust(base, count, total, cycles_since_open, rules)
}

/// Learned duration: the regressor's prediction capped by the tier for the
/// lane's count, then the same adjustments as the rules.
pub fn learned_seconds(
    predicted: f64,
    count: u32,
    total: u32,
    cycles_since_open: u32,
    rules: &RulesConfig,
) -> u32 {
    if total == 0 {
        return MIN_GREEN_SECS;
    }
    let base = clamp_green_secs(predicted as i64);
    let capped = match tier_seconds(count, rules) {
        Some(tier) => tier.min(base),
        None => base,
    };
    adjust(capped, count, total, cycles_since_open, rules)
}

fn adjust(seconds: u32, count: u32, total: u32, cycles_since_open: u32, rules: &RulesConfig) -> u32 {
    let mut seconds = seconds;

    let dominant = total > 0
        && (count as f64 / total as f64) > rules.dominance_ratio
        && count >= rules.dominance_min_count;
    if dominant {
        seconds = MAX_GREEN_SECS.min((seconds as f64 * rules.dominance_factor) as u32);
    }

    if cycles_since_open >= rules.starvation_cycles && count >= rules.starvation_min_count {
        seconds = MAX_GREEN_SECS.min(seconds.saturating_add(rules.starvation_extra_secs));
    }

    clamp_green_secs(seconds as i64)
}
