use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};

use smartway_bus::{EventPublisher, Message};
use smartway_core::config::SmartwayConfig;
use smartway_core::{Decision, LaneSet, RecordId};

use crate::recorder::{Completion, TrainingRecorder};

use super::command::CommandEncoder;
use super::state::{ActiveCycle, PendingRecord, SharedState};
use super::CyclePhase;

/// How the wait for acknowledgments ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuorumOutcome {
    /// Every lane confirmed; `waited` is measured from dispatch.
    Reached { waited: Duration },
    /// The configured ack timeout elapsed first.
    TimedOut { waited: Duration },
}

/// Summary of one finished cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub decision: Decision,
    pub record: Option<RecordId>,
    pub quorum: QuorumOutcome,
    /// Time spent in `Finalize` holding the green before completing.
    pub held: Duration,
    pub completion: Option<Completion>,
    /// Dispatch to return to `Idle`.
    pub elapsed: Duration,
}

/// Drives one decision through the broadcast/acknowledge state machine.
pub struct ProtocolCoordinator {
    publisher: Arc<dyn EventPublisher>,
    commands: CommandEncoder,
    topic: String,
    lanes: LaneSet,
    state: SharedState,
    recorder: Arc<TrainingRecorder>,
    ack_poll: Duration,
    ack_timeout: Option<Duration>,
}

impl ProtocolCoordinator {
    pub fn new(
        config: &SmartwayConfig,
        lanes: LaneSet,
        publisher: Arc<dyn EventPublisher>,
        state: SharedState,
        recorder: Arc<TrainingRecorder>,
    ) -> Self {
        Self {
            publisher,
            commands: CommandEncoder::new(lanes.clone(), &config.protocol),
            topic: config.bus.command_topic.clone(),
            lanes,
            state,
            recorder,
            ack_poll: config.ack_poll_interval(),
            ack_timeout: config.ack_timeout(),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Run a full cycle for `decision`, from broadcast back to `Idle`.
    pub async fn run_cycle(&self, decision: Decision, record: Option<PendingRecord>) -> CycleReport {
        self.dispatch(&decision, record).await;
        let quorum = self.await_quorum().await;
        match quorum {
            QuorumOutcome::Reached { waited } => self.finalize(decision, waited).await,
            QuorumOutcome::TimedOut { waited } => self.abort(decision, waited),
        }
    }

    /// Publish one command. Failures are logged and counted, never retried.
    async fn publish(&self, command: &Value, step: &str) {
        let result = match Message::json(self.topic.as_str(), command) {
            Ok(message) => self.publisher.publish(message).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(step, error = %e, "command publish failed, continuing");
            self.state.lock().metrics.publish_failures += 1;
        }
    }

    /// `BroadcastRed` then `BroadcastGreen`, ending in `AwaitAck`.
    pub async fn dispatch(&self, decision: &Decision, record: Option<PendingRecord>) {
        {
            let mut state = self.state.lock();
            state.phase = CyclePhase::BroadcastRed;
            state.pending = record;
        }
        self.publish(&self.commands.all_stop(), "red").await;

        self.state.lock().phase = CyclePhase::BroadcastGreen;
        self.publish(&self.commands.open(decision), "green").await;

        {
            let mut state = self.state.lock();
            state.acks.clear();
            state.active = Some(ActiveCycle {
                decision: decision.clone(),
                dispatched_at: Instant::now(),
            });
            state.phase = CyclePhase::AwaitAck;
        }
        info!(
            lane = %decision.lane(),
            seconds = decision.duration_secs(),
            strategy = %decision.strategy(),
            "green dispatched, awaiting acknowledgments"
        );
    }

    /// Poll the ack set until every lane has confirmed (or the timeout hits).
    ///
    /// Reaching quorum moves the phase to `Finalize` under the same lock,
    /// so no late ack can slip in afterwards.
    pub async fn await_quorum(&self) -> QuorumOutcome {
        let dispatched_at = self.dispatched_at();
        loop {
            {
                let mut state = self.state.lock();
                if state.acks.is_complete(&self.lanes) {
                    state.phase = CyclePhase::Finalize;
                    return QuorumOutcome::Reached {
                        waited: dispatched_at.elapsed(),
                    };
                }
            }
            if let Some(limit) = self.ack_timeout {
                let waited = dispatched_at.elapsed();
                if waited >= limit {
                    return QuorumOutcome::TimedOut { waited };
                }
            }
            tokio::time::sleep(self.ack_poll).await;
        }
    }

    fn dispatched_at(&self) -> Instant {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|a| a.dispatched_at)
            .unwrap_or_else(Instant::now)
    }

    /// Hold the green for its full duration, close the record, advance fairness.
    async fn finalize(&self, decision: Decision, waited: Duration) -> CycleReport {
        let dispatched_at = self.dispatched_at();
        let pending = self.state.lock().pending.take();

        let hold_until = dispatched_at + Duration::from_secs(decision.duration_secs() as u64);
        let held = hold_until.saturating_duration_since(Instant::now());
        if !held.is_zero() {
            info!(remaining_ms = held.as_millis() as u64, "holding green for remaining duration");
            tokio::time::sleep_until(hold_until).await;
        }

        let completion = match pending {
            Some(record) => Some(self.recorder.complete(record.id, record.before_total).await),
            None => None,
        };

        let elapsed = dispatched_at.elapsed();
        {
            let mut state = self.state.lock();
            state.fairness.on_cycle_complete(decision.lane());
            state
                .metrics
                .record_cycle(decision.strategy(), Some(waited), elapsed);
            if matches!(completion, Some(Completion::Recorded { .. })) {
                state.metrics.records_completed += 1;
            }
            state.active = None;
            state.acks.clear();
            state.phase = CyclePhase::Idle;
        }
        info!(
            lane = %decision.lane(),
            waited_ms = waited.as_millis() as u64,
            elapsed_ms = elapsed.as_millis() as u64,
            "cycle complete"
        );

        CycleReport {
            record: pending.map(|p| p.id),
            decision,
            quorum: QuorumOutcome::Reached { waited },
            held,
            completion,
            elapsed,
        }
    }

    /// Give up on a cycle that never reached quorum.
    ///
    /// The lane did receive its command, so fairness still advances; the
    /// training record is left incomplete.
    fn abort(&self, decision: Decision, waited: Duration) -> CycleReport {
        let mut state = self.state.lock();
        let pending = state.pending.take();
        let acked = state.acks.len();
        state.fairness.on_cycle_complete(decision.lane());
        state.metrics.record_cycle(decision.strategy(), None, waited);
        state.active = None;
        state.acks.clear();
        state.phase = CyclePhase::Idle;
        drop(state);

        warn!(
            lane = %decision.lane(),
            acked,
            lanes = self.lanes.len(),
            waited_ms = waited.as_millis() as u64,
            "acknowledgment timeout, cycle aborted"
        );

        CycleReport {
            record: pending.map(|p| p.id),
            decision,
            quorum: QuorumOutcome::TimedOut { waited },
            held: Duration::ZERO,
            completion: None,
            elapsed: waited,
        }
    }
}

#[cfg(test)]
mod tests;
