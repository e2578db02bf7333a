//! smartway-controller: runs the scheduling loop for one intersection.
//!
//! Binds:
//! - a PUB socket on `bus.command_endpoint`, publishing lane commands on
//!   `bus.command_topic`
//! - a SUB socket on `bus.feedback_endpoint`, receiving lane acknowledgments
//!   on `bus.feedback_topic`
//!
//! Training records go to PostgreSQL when `database.url` is set, otherwise
//! they are kept in memory. Vehicle counts come from `demand.database_url`
//! (or `database.url`); without one every cycle is a forced rotation.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use smartway_bus::{EventPublisher, EventSubscriber, Transport, ZmqPublisher, ZmqSubscriber};
use smartway_core::{SmartwayConfig, SmartwayError};

use smartway_controller::db;
use smartway_controller::protocol::{run_ack_handler, run_feedback_pump};
use smartway_controller::{
    CentroidModel, Controller, ControllerDeps, ControllerError, DemandProvider,
    MemoryTrainingStore, NullDemandProvider, PgDemandProvider, PgTrainingStore, TrainingStore,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Intersection controller: decides, broadcasts and confirms each green phase.
#[derive(Parser, Debug)]
#[command(name = "smartway-controller", version, about)]
struct Cli {
    /// Path to smartway.toml config file.
    #[arg(long, env = "SMARTWAY_CONFIG", default_value = "config/smartway.toml")]
    config: String,

    /// Seconds to let the current cycle finish after Ctrl-C.
    #[arg(long, env = "SMARTWAY_SHUTDOWN_TIMEOUT", default_value_t = 30)]
    shutdown_timeout: u64,
}

fn load_config(path: &str) -> Result<SmartwayConfig, SmartwayError> {
    match SmartwayConfig::from_file(path) {
        Ok(cfg) => {
            info!(path, "loaded smartway config");
            Ok(cfg)
        }
        Err(SmartwayError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path, "config file not found, using local defaults");
            // defaults plus environment overrides
            SmartwayConfig::from_toml("")
        }
        Err(e) => Err(e),
    }
}

fn transport(endpoint: &str) -> Result<Transport, ControllerError> {
    Transport::parse(endpoint).ok_or_else(|| ControllerError::Endpoint(endpoint.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).context("loading configuration")?;
    config.log_summary();
    let lanes = config.lane_set()?;

    // ── Persistence and demand ──────────────────────────────────────

    let store: Arc<dyn TrainingStore> = match db::init_training_pool(config.database.url.as_deref()).await {
        Some(pool) => Arc::new(PgTrainingStore::new(pool)),
        None => Arc::new(MemoryTrainingStore::with_capacity(config.training.window)),
    };
    let demand: Arc<dyn DemandProvider> = match db::init_demand_pool(config.demand_database_url()).await {
        Some(pool) => Arc::new(PgDemandProvider::new(pool, lanes.clone(), &config.demand)),
        None => Arc::new(NullDemandProvider),
    };

    // ── Sockets ─────────────────────────────────────────────────────

    let command_transport = transport(&config.bus.command_endpoint)?;
    let feedback_transport = transport(&config.bus.feedback_endpoint)?;

    let publisher: Arc<dyn EventPublisher> = Arc::new(
        ZmqPublisher::bind(&command_transport)
            .await
            .with_context(|| format!("binding command socket on {command_transport}"))?,
    );
    let subscriber = ZmqSubscriber::bind(&feedback_transport)
        .await
        .with_context(|| format!("binding feedback socket on {feedback_transport}"))?;
    subscriber.subscribe(&config.bus.feedback_topic).await?;
    info!(
        command = %command_transport,
        feedback = %feedback_transport,
        "sockets bound"
    );

    // ── Controller ──────────────────────────────────────────────────

    let model = Arc::new(CentroidModel::new(lanes.len()));
    let mut controller = Controller::new(
        &config,
        ControllerDeps {
            publisher,
            demand,
            store,
            model,
        },
    )?;
    let state = controller.state().clone();
    let shutdown = controller.shutdown_handle();

    let (tx, rx) = mpsc::channel(config.bus.feedback_queue.max(1));
    let pump = tokio::spawn(run_feedback_pump(
        subscriber,
        config.bus.feedback_topic.clone(),
        tx,
    ));
    let handler = tokio::spawn(run_ack_handler(rx, state.clone(), lanes));

    info!("smartway-controller starting");
    let mut control_loop = tokio::spawn(async move { controller.run().await });

    tokio::select! {
        result = &mut control_loop => {
            if let Err(e) = result {
                warn!(error = %e, "control loop ended unexpectedly");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, letting the current cycle finish");
            shutdown.store(true, Ordering::SeqCst);
            let timeout = Duration::from_secs(cli.shutdown_timeout);
            match tokio::time::timeout(timeout, &mut control_loop).await {
                Ok(_) => info!("control loop finished"),
                Err(_) => {
                    warn!(timeout_secs = cli.shutdown_timeout, "cycle still running, aborting");
                    control_loop.abort();
                }
            }
        }
    }

    pump.abort();
    handler.abort();

    let metrics = state.metrics();
    match serde_json::to_string(&metrics) {
        Ok(json) => info!(metrics = %json, "final controller metrics"),
        Err(e) => warn!(error = %e, "failed to serialize metrics"),
    }

    info!("smartway-controller exited cleanly");
    Ok(())
}
