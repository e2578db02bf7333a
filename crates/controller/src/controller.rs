//! The decide → dispatch → acknowledge → record loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, Timelike};
use tracing::{info, warn};

use smartway_bus::EventPublisher;
use smartway_core::config::SmartwayConfig;
use smartway_core::{Decision, DemandSnapshot, LaneSet, PendingExample, Strategy};

use crate::demand::DemandProvider;
use crate::engine::{ActiveStrategy, DecisionEngine, DecisionInput};
use crate::error::{ControllerError, ModelError};
use crate::model::{LaneModel, TrainingSummary};
use crate::protocol::{CycleReport, PendingRecord, ProtocolCoordinator, SharedState};
use crate::recorder::TrainingRecorder;
use crate::store::TrainingStore;
use crate::training::ModelTrainer;

/// External collaborators injected into the controller.
#[derive(Clone)]
pub struct ControllerDeps {
    pub publisher: Arc<dyn EventPublisher>,
    pub demand: Arc<dyn DemandProvider>,
    pub store: Arc<dyn TrainingStore>,
    pub model: Arc<dyn LaneModel>,
}

pub struct Controller {
    lanes: LaneSet,
    state: SharedState,
    engine: DecisionEngine,
    coordinator: ProtocolCoordinator,
    recorder: Arc<TrainingRecorder>,
    trainer: ModelTrainer,
    demand: Arc<dyn DemandProvider>,
    forced_seconds: u32,
    enforce_rounds: bool,
    settle: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(config: &SmartwayConfig, deps: ControllerDeps) -> Result<Self, ControllerError> {
        let lanes = config.lane_set()?;
        let state = SharedState::new(lanes.clone());
        let recorder = Arc::new(TrainingRecorder::new(
            deps.store.clone(),
            deps.demand.clone(),
            config.training.enabled,
        ));
        let coordinator = ProtocolCoordinator::new(
            config,
            lanes.clone(),
            deps.publisher,
            state.clone(),
            recorder.clone(),
        );

        Ok(Self {
            engine: DecisionEngine::new(config, lanes.clone(), deps.model.clone()),
            trainer: ModelTrainer::new(&config.training, lanes.clone(), deps.store, deps.model),
            lanes,
            state,
            coordinator,
            recorder,
            demand: deps.demand,
            forced_seconds: config.rotation.forced_seconds,
            enforce_rounds: config.rotation.enforce_rounds,
            settle: config.settle_interval(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// State shared with the ack handler.
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Setting this flag stops [`run`](Self::run) after the current cycle.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn active_strategy(&self) -> ActiveStrategy {
        self.engine.active()
    }

    /// Train immediately if enough completed records already exist.
    pub async fn initialize(&mut self) {
        if let Some(result) = self.trainer.maybe_retrain().await {
            self.apply_training(result);
        }
    }

    /// Run cycles until the shutdown flag is set.
    pub async fn run(&mut self) {
        self.initialize().await;
        info!(lanes = self.lanes.len(), strategy = ?self.engine.active(), "control loop started");

        while !self.shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(self.settle).await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.run_once().await;
        }
        info!("control loop stopped");
    }

    /// One full cycle, from reading demand to the optional retrain.
    pub async fn run_once(&mut self) -> CycleReport {
        let demand = match self.demand.latest_counts().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "demand unavailable");
                None
            }
        };

        let now = Local::now();
        let hour = now.hour();
        let weekday = now.weekday().num_days_from_monday();

        let decision = match &demand {
            Some(snapshot) => self.decide(snapshot, hour, weekday),
            None => None,
        };
        let decision = match decision {
            Some(decision) => decision,
            None => {
                let lane = self.state.lock().fairness.take_rotation_lane();
                info!(lane = %lane, "no demand, forcing rotation");
                Decision::new(lane, self.forced_seconds as i64, Strategy::ForcedRotation)
            }
        };

        if self.engine.active() == ActiveStrategy::Learned
            && decision.strategy() == Strategy::RuleBased
        {
            self.state.lock().metrics.learned_fallbacks += 1;
        }

        let pending = match (&demand, decision.strategy()) {
            (_, Strategy::ForcedRotation) | (None, _) => None,
            (Some(snapshot), _) => self.open_record(snapshot, &decision, hour, weekday).await,
        };

        info!(
            lane = %decision.lane(),
            seconds = decision.duration_secs(),
            strategy = %decision.strategy(),
            "decision"
        );
        let report = self.coordinator.run_cycle(decision, pending).await;

        if let Some(result) = self.trainer.after_cycle().await {
            self.apply_training(result);
        }
        report
    }

    fn decide(&self, snapshot: &DemandSnapshot, hour: u32, weekday: u32) -> Option<Decision> {
        let input = {
            let state = self.state.lock();
            let exclude = state.fairness.last_opened().cloned();
            let candidates = if self.enforce_rounds {
                state.fairness.round_candidates(exclude.as_ref())
            } else {
                state.fairness.candidates(exclude.as_ref())
            };
            DecisionInput {
                demand: snapshot.clone(),
                fairness: state.fairness.snapshot(),
                exclude,
                candidates,
                hour,
                weekday,
            }
        };
        self.engine.decide(&input)
    }

    async fn open_record(
        &self,
        snapshot: &DemandSnapshot,
        decision: &Decision,
        hour: u32,
        weekday: u32,
    ) -> Option<PendingRecord> {
        if !self.recorder.is_enabled() {
            return None;
        }
        let cycles_since_open = self.state.lock().fairness.cycles_since_open(decision.lane());
        let example = PendingExample {
            snapshot: snapshot.clone(),
            decision: decision.clone(),
            hour,
            weekday,
            cycles_since_open,
        };
        let id = self.recorder.open(&example).await?;
        self.state.lock().metrics.records_opened += 1;
        Some(PendingRecord {
            id,
            before_total: snapshot.total(),
        })
    }

    fn apply_training(&mut self, result: Result<TrainingSummary, ModelError>) {
        match result {
            Ok(summary) => {
                info!(rows = summary.rows, "learned strategy enabled");
                self.engine.set_active(ActiveStrategy::Learned);
                self.state.lock().metrics.retrain_successes += 1;
            }
            Err(e) => {
                warn!(error = %e, "training failed, using rule-based strategy");
                self.engine.set_active(ActiveStrategy::RuleBased);
                self.state.lock().metrics.retrain_failures += 1;
            }
        }
    }
}
