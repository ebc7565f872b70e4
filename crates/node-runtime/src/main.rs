//! # Tidal Node Runtime
//!
//! The main entry point for a Tidal node.
//!
//! ## Startup Sequence
//!
//! 1. Install the tracing subscriber (filter from `TD_LOG`, default `info`)
//! 2. Load configuration (defaults + `TD_*` environment overrides) and
//!    validate it
//! 3. Initialize subsystems in dependency order
//! 4. Bid for the coordinator lease
//! 5. Start the scheduler and the exchange sweeper
//! 6. Run until Ctrl+C
//!
//! ## Shutdown Sequence
//!
//! 1. Signal the sweeper
//! 2. Shut the scheduler down (waits for running jobs, resigns the lease)
//! 3. Tear down the operation catalog

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::wiring::spawn_sweeper;
use node_runtime::{NodeConfig, SubsystemContainer};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "TD_LOG";

/// The node runtime orchestrating all subsystems.
pub struct NodeRuntime {
    /// Subsystem container with all initialized services.
    container: Arc<SubsystemContainer>,
    /// Background tasks owned by the runtime.
    tasks: Vec<JoinHandle<()>>,
    /// Shutdown signal sender.
    shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig) -> Self {
        info!(node = %config.scheduler.node_id(), "Creating Tidal node runtime");
        let container = Arc::new(SubsystemContainer::new(config));
        let (shutdown_tx, _) = tokio::sync::watch::channel(false);
        Self {
            container,
            tasks: Vec::new(),
            shutdown_tx,
        }
    }

    /// Starts the scheduler and the coordinator-only sweeper.
    pub async fn start(&mut self) -> Result<()> {
        info!("===========================================");
        info!("  Tidal Node Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let container = Arc::clone(&self.container);
        match container.coordinator.refresh().await {
            Ok(leader) => info!(coordinator = leader, "Coordinator lease checked"),
            Err(e) => warn!(error = %e, "Coordinator lease unavailable; starting as follower"),
        }

        container
            .scheduler
            .start()
            .context("Failed to start scheduler")?;

        let period = std::time::Duration::from_millis(container.registry.config().sweep_interval_ms());
        self.tasks.push(spawn_sweeper(
            Arc::clone(&container.registry),
            Arc::clone(&container.coordinator),
            Arc::clone(&container.time),
            period,
            self.shutdown_tx.subscribe(),
        ));

        let config = &container.config;
        info!(
            node = %config.scheduler.node_id(),
            workers = config.scheduler.worker_threads,
            tx_timeout_secs = config.transactions.default_timeout.as_secs(),
            mex_ttl_secs = config.registry.ttl.as_secs(),
            "Node is running"
        );
        Ok(())
    }

    /// Shuts the node down gracefully.
    pub async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");
        self.shutdown_tx.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "Background task ended abnormally");
            }
        }
        self.container.scheduler.shutdown().await;
        self.container.catalog.clear();
        info!(stats = ?self.container.registry.stats(), "Shutdown complete");
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = NodeConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let mut runtime = NodeRuntime::new(config);
    runtime.start().await?;

    info!("Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
