use super::*;
use std::sync::Mutex;

use async_trait::async_trait;
use smartway_bus::BusError;
use smartway_core::{DemandSnapshot, PendingExample, Strategy};

use crate::demand::{DemandProvider, NullDemandProvider};
use crate::error::DemandError;
use crate::protocol::inbound::handle_feedback;
use crate::store::{MemoryTrainingStore, TrainingStore};

// ── Mock publisher ──────────────────────────────────────────────────

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<Message>>,
    fail: bool,
}

impl RecordingPublisher {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn commands(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.decode().unwrap())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        if self.fail {
            return Err(BusError::Transport("socket gone".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

struct FixedDemand(u32);

#[async_trait]
impl DemandProvider for FixedDemand {
    async fn latest_counts(&self) -> Result<Option<DemandSnapshot>, DemandError> {
        Ok(Some(DemandSnapshot::from_pairs([("A", self.0)])))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn config(ack_timeout_secs: Option<u64>) -> SmartwayConfig {
    let mut config = SmartwayConfig::local();
    config.protocol.ack_timeout_secs = ack_timeout_secs;
    config
}

fn coordinator_with(
    config: &SmartwayConfig,
    publisher: Arc<dyn EventPublisher>,
    recorder: TrainingRecorder,
) -> ProtocolCoordinator {
    let lanes = config.lane_set().unwrap();
    let state = SharedState::new(lanes.clone());
    ProtocolCoordinator::new(config, lanes, publisher, state, Arc::new(recorder))
}

fn null_recorder() -> TrainingRecorder {
    TrainingRecorder::new(
        Arc::new(MemoryTrainingStore::new()),
        Arc::new(NullDemandProvider),
        true,
    )
}

/// Acknowledge `lanes` once the coordinator is awaiting, after `delay`.
fn ack_after(state: SharedState, lanes: &'static [&'static str], delay: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while state.phase() != CyclePhase::AwaitAck {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(delay).await;
        let all = LaneSet::from_ids(["A", "B", "C", "D"]).unwrap();
        for lane in lanes {
            handle_feedback(&state, &all, lane.as_bytes());
        }
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn green_is_held_for_remaining_duration_after_quorum() {
    let config = config(None);
    let publisher = Arc::new(RecordingPublisher::default());
    let coordinator = coordinator_with(&config, publisher.clone(), null_recorder());
    let state = coordinator.state().clone();

    let acker = ack_after(state.clone(), &["A", "B", "C", "D"], Duration::from_secs(2));
    let started = Instant::now();
    let report = coordinator
        .run_cycle(Decision::new("A".into(), 10, Strategy::RuleBased), None)
        .await;
    let elapsed = started.elapsed();
    acker.await.unwrap();

    let QuorumOutcome::Reached { waited } = report.quorum else {
        panic!("expected quorum, got {:?}", report.quorum);
    };
    assert!(waited >= Duration::from_secs(2) && waited <= Duration::from_millis(2200));
    assert!(report.held >= Duration::from_millis(7800) && report.held <= Duration::from_secs(8));
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_millis(10_100));

    assert_eq!(state.phase(), CyclePhase::Idle);
    let guard = state.lock();
    assert!(guard.active.is_none());
    assert!(guard.acks.is_empty());
    assert_eq!(guard.fairness.cycles_since_open(&"A".into()), 0);
    assert_eq!(guard.fairness.cycles_since_open(&"B".into()), 1);
    assert_eq!(guard.metrics.total_cycles(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_quorum_completes_without_extra_hold() {
    let config = config(None);
    let coordinator = coordinator_with(&config, Arc::new(RecordingPublisher::default()), null_recorder());
    let state = coordinator.state().clone();

    let acker = ack_after(state.clone(), &["A", "B", "C", "D"], Duration::from_secs(12));
    let report = coordinator
        .run_cycle(Decision::new("B".into(), 5, Strategy::RuleBased), None)
        .await;
    acker.await.unwrap();

    assert!(matches!(report.quorum, QuorumOutcome::Reached { .. }));
    assert_eq!(report.held, Duration::ZERO);
    assert_eq!(state.phase(), CyclePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn red_precedes_a_single_green() {
    let config = config(None);
    let publisher = Arc::new(RecordingPublisher::default());
    let coordinator = coordinator_with(&config, publisher.clone(), null_recorder());

    let acker = ack_after(coordinator.state().clone(), &["A", "B", "C", "D"], Duration::ZERO);
    coordinator
        .run_cycle(Decision::new("C".into(), 7, Strategy::Learned), None)
        .await;
    acker.await.unwrap();

    let commands = publisher.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(
        commands[0],
        serde_json::json!({"A": "L", "B": "L", "C": "L", "D": "L"})
    );
    assert_eq!(
        commands[1],
        serde_json::json!({"A": "L", "B": "L", "C": {"V": 7}, "D": "L"})
    );
    let sent = publisher.sent.lock().unwrap();
    assert!(sent.iter().all(|m| m.topic == "3105/comando"));
}

#[tokio::test(start_paused = true)]
async fn publish_failure_still_awaits_acks() {
    let config = config(None);
    let coordinator = coordinator_with(&config, Arc::new(RecordingPublisher::failing()), null_recorder());
    let state = coordinator.state().clone();

    coordinator
        .dispatch(&Decision::new("D".into(), 6, Strategy::RuleBased), None)
        .await;
    assert_eq!(state.phase(), CyclePhase::AwaitAck);
    assert_eq!(state.metrics().publish_failures, 2);
    assert!(state.lock().active.is_some());
}

#[tokio::test(start_paused = true)]
async fn quorum_needs_every_lane() {
    let config = config(Some(5));
    let coordinator = coordinator_with(&config, Arc::new(RecordingPublisher::default()), null_recorder());
    let state = coordinator.state().clone();

    let acker = ack_after(state.clone(), &["A", "B", "C"], Duration::from_secs(1));
    coordinator
        .dispatch(&Decision::new("A".into(), 10, Strategy::RuleBased), None)
        .await;
    let outcome = coordinator.await_quorum().await;
    acker.await.unwrap();

    assert!(matches!(outcome, QuorumOutcome::TimedOut { .. }));
    assert_eq!(state.lock().acks.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn timeout_aborts_cycle_and_leaves_record_open() {
    let config = config(Some(3));
    let store = Arc::new(MemoryTrainingStore::new());
    let recorder = TrainingRecorder::new(store.clone(), Arc::new(FixedDemand(4)), true);
    let coordinator = coordinator_with(&config, Arc::new(RecordingPublisher::default()), recorder);
    let state = coordinator.state().clone();

    let decision = Decision::new("B".into(), 12, Strategy::RuleBased);
    let example = PendingExample {
        snapshot: DemandSnapshot::from_pairs([("B", 8)]),
        decision: decision.clone(),
        hour: 8,
        weekday: 1,
        cycles_since_open: 0,
    };
    let id = store.create_record(&example).await.unwrap();
    let pending = PendingRecord { id, before_total: 8 };

    let report = coordinator.run_cycle(decision, Some(pending)).await;

    let QuorumOutcome::TimedOut { waited } = report.quorum else {
        panic!("expected timeout");
    };
    assert!(waited >= Duration::from_secs(3));
    assert_eq!(report.record, Some(id));
    assert!(report.completion.is_none());
    assert!(!store.records()[0].completed);

    assert_eq!(state.phase(), CyclePhase::Idle);
    let guard = state.lock();
    assert!(guard.pending.is_none());
    assert_eq!(guard.metrics.cycles_aborted, 1);
    assert_eq!(guard.fairness.last_opened(), Some(&"B".into()));
}

#[tokio::test(start_paused = true)]
async fn finalize_completes_pending_record() {
    let config = config(None);
    let store = Arc::new(MemoryTrainingStore::new());
    let recorder = TrainingRecorder::new(store.clone(), Arc::new(FixedDemand(2)), true);
    let coordinator = coordinator_with(&config, Arc::new(RecordingPublisher::default()), recorder);
    let state = coordinator.state().clone();

    let decision = Decision::new("A".into(), 8, Strategy::RuleBased);
    let example = PendingExample {
        snapshot: DemandSnapshot::from_pairs([("A", 8)]),
        decision: decision.clone(),
        hour: 17,
        weekday: 4,
        cycles_since_open: 2,
    };
    let id = store.create_record(&example).await.unwrap();

    let acker = ack_after(state.clone(), &["A", "B", "C", "D"], Duration::from_secs(1));
    let report = coordinator
        .run_cycle(decision, Some(PendingRecord { id, before_total: 8 }))
        .await;
    acker.await.unwrap();

    assert_eq!(
        report.completion,
        Some(Completion::Recorded {
            after_total: 2,
            efficiency: 0.75
        })
    );
    let record = &store.records()[0];
    assert!(record.completed);
    assert_eq!(record.after_total, Some(2));
    assert_eq!(state.metrics().records_completed, 1);
}
