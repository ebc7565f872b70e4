//! # Subsystem Container
//!
//! Holds every subsystem instance of one node and wires them together.
//!
//! ## Initialization Order
//!
//! ```text
//! Level 0: time source, operation catalog
//! Level 1: transaction manager, job store, instance store, lease table
//! Level 2: exchange registry (needs transactions + catalog)
//! Level 3: scheduler (needs transactions + job store + coordinator)
//! Level 4: job handlers, instance cleanup listener
//! ```
//!
//! ## Shared Backends
//!
//! The job store, the instance store, the lease table and the cluster view
//! stand in for the database shared by a cluster. Nodes built from the same
//! [`ClusterBackends`] behave like members of one cluster.

use std::sync::Arc;

use tracing::{info, instrument};

use shared_types::{OperationCatalog, SystemTimeSource, TimeSource};
use td_01_transaction::{InMemoryResourceManager, ResourceManager, TransactionManager};
use td_02_job_store::{InMemoryJobStore, JobStore};
use td_03_scheduler::{
    ClusterView, CoordinatorElection, InMemoryLeaseTable, JobDispatcher, LeaseCoordinator,
    LeaseTable, SchedulerDeps, SimpleScheduler,
};
use td_04_exchange_registry::MessageExchangeRegistry;
use td_05_instance_store::{InMemoryInstanceStore, ProcessInstanceStore};

use crate::container::config::NodeConfig;
use crate::handlers::{
    ExchangeTimeoutHandler, InstanceCommandHandler, EXCHANGE_TIMEOUT_JOB_TYPE, INSTANCE_JOB_TYPE,
};
use crate::wiring::InstanceCleanup;

/// Cluster-wide resources shared by every node.
#[derive(Clone)]
pub struct ClusterBackends {
    pub time: Arc<dyn TimeSource>,
    pub resources: Arc<dyn ResourceManager>,
    pub job_store: Arc<dyn JobStore>,
    pub instances: Arc<dyn ProcessInstanceStore>,
    pub lease_table: Arc<dyn LeaseTable>,
    pub cluster: Arc<ClusterView>,
}

impl Default for ClusterBackends {
    fn default() -> Self {
        Self {
            time: Arc::new(SystemTimeSource),
            resources: Arc::new(InMemoryResourceManager::new()),
            job_store: Arc::new(InMemoryJobStore::new()),
            instances: Arc::new(InMemoryInstanceStore::new()),
            lease_table: Arc::new(InMemoryLeaseTable::new()),
            cluster: Arc::new(ClusterView::new()),
        }
    }
}

/// Every subsystem instance of one node.
pub struct SubsystemContainer {
    // =========================================================================
    // LEVEL 0-1: Infrastructure
    // =========================================================================
    pub time: Arc<dyn TimeSource>,
    pub catalog: Arc<OperationCatalog>,
    pub transactions: Arc<TransactionManager>,
    pub job_store: Arc<dyn JobStore>,
    pub instances: Arc<dyn ProcessInstanceStore>,

    // =========================================================================
    // LEVEL 2-3: Services
    // =========================================================================
    /// Message exchange registry (per node).
    pub registry: Arc<MessageExchangeRegistry>,
    pub coordinator: Arc<dyn CoordinatorElection>,
    pub scheduler: Arc<SimpleScheduler>,

    // =========================================================================
    // LEVEL 4: Dispatch
    // =========================================================================
    /// Job type to handler table installed as the scheduler's processor.
    pub dispatcher: Arc<JobDispatcher>,

    /// Node configuration (immutable after initialization).
    pub config: NodeConfig,
}

impl SubsystemContainer {
    /// Creates a standalone node with its own in-memory backends.
    pub fn new(config: NodeConfig) -> Self {
        Self::with_backends(config, ClusterBackends::default())
    }

    /// Creates a node on top of backends possibly shared with other nodes.
    #[instrument(name = "subsystem_init", skip_all, fields(node = %config.scheduler.node_id()))]
    pub fn with_backends(config: NodeConfig, backends: ClusterBackends) -> Self {
        info!("Initializing Tidal subsystem container");
        let ClusterBackends {
            time,
            resources,
            job_store,
            instances,
            lease_table,
            cluster,
        } = backends;

        let catalog = OperationCatalog::new_shared();
        let transactions = Arc::new(TransactionManager::new(
            resources,
            config.transactions.clone(),
        ));
        info!("  [01] Transaction manager initialized");

        let registry = Arc::new(
            MessageExchangeRegistry::new(config.registry.clone(), Arc::clone(&time))
                .with_catalog(Arc::clone(&catalog)),
        );
        instances.add_listener(Arc::new(InstanceCleanup::new(Arc::clone(&registry))));
        info!("  [04] Exchange registry initialized");

        let coordinator: Arc<dyn CoordinatorElection> = Arc::new(LeaseCoordinator::new(
            config.scheduler.node_id().clone(),
            lease_table,
            Arc::clone(&time),
            config.scheduler.cluster.lease_duration,
        ));
        let scheduler = SimpleScheduler::new(
            config.scheduler.clone(),
            SchedulerDeps {
                transactions: Arc::clone(&transactions),
                store: Arc::clone(&job_store),
                coordinator: Arc::clone(&coordinator),
                cluster,
                time: Arc::clone(&time),
            },
        );
        info!("  [03] Scheduler initialized");

        let dispatcher = Arc::new(JobDispatcher::new());
        dispatcher.register(
            INSTANCE_JOB_TYPE,
            Arc::new(InstanceCommandHandler::new(
                Arc::clone(&instances),
                Arc::clone(&time),
            )),
        );
        dispatcher.register(
            EXCHANGE_TIMEOUT_JOB_TYPE,
            Arc::new(ExchangeTimeoutHandler::new(Arc::clone(&registry))),
        );
        scheduler.set_job_processor(dispatcher.clone());
        info!(handlers = dispatcher.len(), "Job dispatch table installed");

        Self {
            time,
            catalog,
            transactions,
            job_store,
            instances,
            registry,
            coordinator,
            scheduler,
            dispatcher,
            config,
        }
    }
}
