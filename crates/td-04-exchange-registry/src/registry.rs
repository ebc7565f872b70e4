//! The message exchange registry.
//!
//! Exchanges are indexed twice: by id for lookups and by creation time for
//! the sweep. The creation-ordered index is append-only and pruned lazily;
//! an entry whose exchange was already released or rolled back is skipped
//! when the sweep reaches it.

use crate::config::RegistryConfig;
use crate::domain::{
    Completion, Direction, ExchangeSnapshot, ExchangeStatus, FailureType, InvocationStyle,
    MessageExchange, ResourceRoute, RouteKey, RouteTable,
};
use crate::error::{RegistryError, RegistryResult};
use parking_lot::RwLock;
use shared_types::{
    ExchangeId, InstanceId, InteractionPattern, OperationCatalog, OperationKey, TimeSource,
    Timestamp,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use td_01_transaction::{Synchronizer, TransactionContext};
use tracing::{debug, warn};

/// Longest chain of piped exchanges followed by one completion.
const MAX_PIPE_DEPTH: usize = 16;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Unfinished exchanges dropped for exceeding the TTL.
    pub evicted: usize,
    /// Finished exchanges dropped for exceeding the TTL.
    pub released: usize,
    /// The sweep did not run because the previous one was too recent.
    pub throttled: bool,
}

/// Registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub live: usize,
    pub created: u64,
    pub evicted: u64,
    pub released: u64,
    pub rolled_back: u64,
}

#[derive(Debug, Default)]
struct Index {
    by_id: HashMap<ExchangeId, Arc<MessageExchange>>,
    order: VecDeque<(Timestamp, Weak<MessageExchange>)>,
}

impl Index {
    fn last_created(&self) -> Timestamp {
        self.order.back().map_or(0, |(created, _)| *created)
    }
}

#[derive(Debug, Default)]
struct Shared {
    index: RwLock<Index>,
    created: AtomicU64,
    evicted: AtomicU64,
    released: AtomicU64,
    rolled_back: AtomicU64,
}

impl Shared {
    fn remove(&self, id: &ExchangeId) -> Option<Arc<MessageExchange>> {
        let removed = self.index.write().by_id.remove(id);
        if let Some(mex) = &removed {
            mex.detach();
        }
        removed
    }
}

/// In-memory registry of live message exchanges.
pub struct MessageExchangeRegistry {
    config: RegistryConfig,
    time: Arc<dyn TimeSource>,
    catalog: Option<Arc<OperationCatalog>>,
    shared: Arc<Shared>,
    routes: RouteTable,
    last_sweep: AtomicU64,
}

impl MessageExchangeRegistry {
    pub fn new(config: RegistryConfig, time: Arc<dyn TimeSource>) -> Self {
        Self {
            config,
            time,
            catalog: None,
            shared: Arc::new(Shared::default()),
            routes: RouteTable::new(),
            last_sweep: AtomicU64::new(0),
        }
    }

    /// Attaches the operation catalog consulted by [`Self::bind_operation`].
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<OperationCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Creates an exchange in status `New` as part of `tx`.
    ///
    /// If `tx` rolls back the exchange is removed, whatever its status by
    /// then. Creation also gives the sweep a chance to run.
    pub fn create(
        &self,
        tx: &TransactionContext,
        id: ExchangeId,
        direction: Direction,
    ) -> RegistryResult<Arc<MessageExchange>> {
        let now = self.time.now();
        let mex = {
            let mut index = self.shared.index.write();
            if index.by_id.contains_key(&id) {
                return Err(RegistryError::DuplicateExchange(id));
            }
            // Keep the order index sorted even if the clock steps back.
            let created = now.max(index.last_created());
            let mex = Arc::new(MessageExchange::new(id.clone(), direction, created));
            index.by_id.insert(id.clone(), Arc::clone(&mex));
            index.order.push_back((created, Arc::downgrade(&mex)));
            mex
        };

        let shared = Arc::clone(&self.shared);
        let rollback_id = id.clone();
        let registered = tx.register_synchronizer(Synchronizer::on_rollback(move || {
            if shared.remove(&rollback_id).is_some() {
                shared.rolled_back.fetch_add(1, Ordering::Relaxed);
                debug!(exchange = %rollback_id, "Creating transaction rolled back; exchange removed");
            }
            Ok(())
        }));
        if let Err(e) = registered {
            self.shared.remove(&id);
            return Err(e.into());
        }

        self.shared.created.fetch_add(1, Ordering::Relaxed);
        debug!(exchange = %id, %direction, tx = %tx.id(), "Message exchange created");
        self.sweep(now);
        Ok(mex)
    }

    pub fn get(&self, id: &ExchangeId) -> Option<Arc<MessageExchange>> {
        self.shared.index.read().by_id.get(id).cloned()
    }

    pub fn snapshot(&self, id: &ExchangeId) -> Option<ExchangeSnapshot> {
        self.get(id).map(|mex| mex.snapshot())
    }

    fn lookup(&self, id: &ExchangeId) -> RegistryResult<Arc<MessageExchange>> {
        self.get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Moves an exchange to a later non-terminal status.
    pub fn advance(&self, id: &ExchangeId, to: ExchangeStatus) -> RegistryResult<()> {
        self.lookup(id)?.advance(to)
    }

    /// Sets a terminal status. Completing an already finished exchange
    /// changes nothing. A piped exchange forwards its outcome to the target.
    pub fn complete(&self, id: &ExchangeId, status: ExchangeStatus) -> RegistryResult<Completion> {
        let mex = self.lookup(id)?;
        let completion = mex.complete(status)?;
        if completion == Completion::Completed {
            self.forward(&mex, status);
        }
        Ok(completion)
    }

    /// Records a failure and completes the exchange as `Failed`.
    pub fn fail(
        &self,
        id: &ExchangeId,
        failure: FailureType,
        explanation: Option<String>,
    ) -> RegistryResult<Completion> {
        let mex = self.lookup(id)?;
        if mex.is_terminal() {
            return Ok(Completion::AlreadyCompleted(mex.status()));
        }
        mex.set_failure(failure, explanation);
        self.complete(id, ExchangeStatus::Failed)
    }

    fn forward(&self, source: &Arc<MessageExchange>, status: ExchangeStatus) {
        let mut current = Arc::clone(source);
        for _ in 0..MAX_PIPE_DEPTH {
            let InvocationStyle::Piped(target_id) = current.invocation_style() else {
                return;
            };
            let Some(target) = self.get(&target_id) else {
                warn!(exchange = %current.id(), target = %target_id, "Pipe target not registered; outcome dropped");
                return;
            };
            if target.is_terminal() {
                return;
            }
            current.copy_outcome_to(&target);
            match target.complete(status) {
                Ok(Completion::Completed) => {
                    debug!(exchange = %current.id(), target = %target_id, %status, "Outcome forwarded");
                    current = target;
                }
                Ok(Completion::AlreadyCompleted(_)) => return,
                Err(e) => {
                    warn!(exchange = %current.id(), target = %target_id, error = %e, "Outcome forwarding failed");
                    return;
                }
            }
        }
        warn!(exchange = %source.id(), "Pipe chain too long; forwarding stopped");
    }

    /// Binds the exchange to an operation and resolves its interaction
    /// pattern from the catalog.
    pub fn bind_operation(
        &self,
        id: &ExchangeId,
        service: &str,
        operation: &str,
    ) -> RegistryResult<InteractionPattern> {
        let mex = self.lookup(id)?;
        let pattern = self
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.pattern(&OperationKey::new(service, operation)))
            .unwrap_or(InteractionPattern::Unknown);
        mex.set_operation(operation);
        mex.set_pattern(pattern);
        Ok(pattern)
    }

    /// Drops an exchange explicitly. Returns `false` if it was not registered.
    pub fn release(&self, id: &ExchangeId) -> bool {
        let released = self.shared.remove(id).is_some();
        if released {
            self.shared.released.fetch_add(1, Ordering::Relaxed);
        }
        released
    }

    /// Drops every exchange owned by `instance`.
    pub fn release_instance(&self, instance: &InstanceId) -> usize {
        let ids: Vec<ExchangeId> = self
            .shared
            .index
            .read()
            .by_id
            .values()
            .filter(|mex| mex.instance().as_ref() == Some(instance))
            .map(|mex| mex.id().clone())
            .collect();
        ids.iter().filter(|id| self.release(id)).count()
    }

    /// Sweeps expired exchanges unless a sweep ran less than the minimum
    /// interval ago.
    ///
    /// The throttle trades eviction precision for fewer scans: an unfinished
    /// exchange is never evicted at or before `created + ttl`, but it may
    /// survive until `created + ttl + sweep_interval`. A zero
    /// `min_sweep_interval` evicts on the first sweep past the TTL.
    pub fn sweep(&self, now: Timestamp) -> SweepReport {
        let last = self.last_sweep.load(Ordering::Acquire);
        let due = last == 0 || now.saturating_sub(last) >= self.config.sweep_interval_ms();
        if !due
            || self
                .last_sweep
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return SweepReport {
                throttled: true,
                ..SweepReport::default()
            };
        }
        self.sweep_expired(now)
    }

    /// Sweeps regardless of the throttle.
    pub fn force_sweep(&self, now: Timestamp) -> SweepReport {
        self.last_sweep.store(now, Ordering::Release);
        self.sweep_expired(now)
    }

    fn sweep_expired(&self, now: Timestamp) -> SweepReport {
        let ttl = self.config.ttl_ms();
        let mut report = SweepReport::default();
        let mut evicted = Vec::new();
        {
            let mut index = self.shared.index.write();
            while let Some((created, _)) = index.order.front() {
                if now.saturating_sub(*created) <= ttl {
                    break;
                }
                let Some((_, weak)) = index.order.pop_front() else {
                    break;
                };
                let Some(mex) = weak.upgrade() else {
                    continue;
                };
                let current = index
                    .by_id
                    .get(mex.id())
                    .is_some_and(|registered| Arc::ptr_eq(registered, &mex));
                if !current {
                    continue;
                }
                index.by_id.remove(mex.id());
                if mex.try_evict() {
                    report.evicted += 1;
                    evicted.push(mex);
                } else {
                    mex.detach();
                    report.released += 1;
                }
            }
        }

        for mex in &evicted {
            debug!(exchange = %mex.id(), status = %mex.status(), age_ms = now.saturating_sub(mex.created_at()), "Evicting stale message exchange");
        }
        self.shared
            .evicted
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        self.shared
            .released
            .fetch_add(report.released as u64, Ordering::Relaxed);
        report
    }

    pub fn len(&self) -> usize {
        self.shared.index.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.len(),
            created: self.shared.created.load(Ordering::Relaxed),
            evicted: self.shared.evicted.load(Ordering::Relaxed),
            released: self.shared.released.load(Ordering::Relaxed),
            rolled_back: self.shared.rolled_back.load(Ordering::Relaxed),
        }
    }

    // -------------------------------------------------------------------------
    // Resource routes
    // -------------------------------------------------------------------------

    pub fn add_route(&self, route: ResourceRoute) -> RegistryResult<()> {
        self.routes.add(route)
    }

    pub fn get_route(&self, url: &str, method: &str) -> Option<ResourceRoute> {
        self.routes.get(url, method)
    }

    pub fn remove_route(&self, key: &RouteKey) -> Option<ResourceRoute> {
        self.routes.remove(key)
    }

    pub fn cleanup_routes_for_instance(&self, instance: &InstanceId) -> usize {
        self.routes.cleanup_for_instance(instance)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CorrelationStatus;
    use shared_types::ManualTimeSource;
    use std::time::Duration;
    use td_01_transaction::{InMemoryResourceManager, TransactionConfig, TransactionManager};

    const T0: Timestamp = 1_000_000;

    struct Fixture {
        time: Arc<ManualTimeSource>,
        tm: TransactionManager,
        registry: MessageExchangeRegistry,
    }

    fn fixture(config: RegistryConfig) -> Fixture {
        let time = Arc::new(ManualTimeSource::new(T0));
        let tm = TransactionManager::new(
            Arc::new(InMemoryResourceManager::new()),
            TransactionConfig::default(),
        );
        let registry = MessageExchangeRegistry::new(config, time.clone());
        Fixture { time, tm, registry }
    }

    fn eager_config(ttl_secs: u64) -> RegistryConfig {
        RegistryConfig {
            ttl: Duration::from_secs(ttl_secs),
            min_sweep_interval: Some(Duration::ZERO),
        }
    }

    fn create_committed(f: &Fixture, id: &str) -> Arc<MessageExchange> {
        let tx = f.tm.begin().unwrap();
        let mex = f
            .registry
            .create(&tx, ExchangeId::from(id), Direction::PartnerRole)
            .unwrap();
        tx.commit().unwrap();
        mex
    }

    #[test]
    fn test_create_and_get() {
        let f = fixture(RegistryConfig::default());
        let mex = create_committed(&f, "m1");
        assert_eq!(mex.status(), ExchangeStatus::New);
        assert_eq!(mex.created_at(), T0);

        let found = f.registry.get(&ExchangeId::from("m1")).unwrap();
        assert!(Arc::ptr_eq(&found, &mex));
        assert!(f.registry.get(&ExchangeId::from("nope")).is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let f = fixture(RegistryConfig::default());
        create_committed(&f, "m1");
        let tx = f.tm.begin().unwrap();
        let err = f
            .registry
            .create(&tx, ExchangeId::from("m1"), Direction::MyRole)
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateExchange(ExchangeId::from("m1")));
        tx.commit().unwrap();
    }

    #[test]
    fn test_rollback_removes_exchange() {
        let f = fixture(RegistryConfig::default());
        let tx = f.tm.begin().unwrap();
        let mex = f
            .registry
            .create(&tx, ExchangeId::from("m1"), Direction::MyRole)
            .unwrap();
        mex.advance(ExchangeStatus::Invoked).unwrap();
        mex.complete(ExchangeStatus::CompletedOk).unwrap();
        tx.rollback().unwrap();

        assert!(f.registry.get(&ExchangeId::from("m1")).is_none());
        assert!(mex.is_detached());
        assert_eq!(f.registry.stats().rolled_back, 1);
    }

    #[test]
    fn test_ttl_boundary() {
        let f = fixture(eager_config(120));
        create_committed(&f, "m1");
        let id = ExchangeId::from("m1");

        f.registry.sweep(T0 + 120_000 - 1);
        assert!(f.registry.get(&id).is_some());

        f.registry.sweep(T0 + 120_000);
        assert!(f.registry.get(&id).is_some());

        let report = f.registry.sweep(T0 + 120_000 + 1);
        assert_eq!(report.evicted, 1);
        assert!(f.registry.get(&id).is_none());
    }

    #[test]
    fn test_sweep_stops_at_first_live_entry() {
        let f = fixture(eager_config(10));
        create_committed(&f, "old");
        f.time.advance(5_000);
        create_committed(&f, "young");

        let report = f.registry.sweep(T0 + 10_001);
        assert_eq!(report.evicted, 1);
        assert!(f.registry.get(&ExchangeId::from("young")).is_some());
        assert_eq!(f.registry.len(), 1);
    }

    #[test]
    fn test_sweep_is_throttled() {
        let f = fixture(RegistryConfig::default());
        assert!(!f.registry.sweep(T0).throttled);
        assert!(f.registry.sweep(T0 + 29_999).throttled);
        assert!(!f.registry.sweep(T0 + 30_000).throttled);
        assert!(!f.registry.force_sweep(T0 + 30_001).throttled);
    }

    #[test]
    fn test_throttled_eviction_is_late_by_at_most_one_interval() {
        let f = fixture(RegistryConfig::default());
        create_committed(&f, "m1");
        let id = ExchangeId::from("m1");
        let ttl = 120_000;
        let interval = f.registry.config().sweep_interval_ms();

        assert!(!f.registry.sweep(T0 + ttl - 1).throttled);
        assert!(f.registry.get(&id).is_some());

        let report = f.registry.sweep(T0 + ttl + 1);
        assert!(report.throttled);
        assert!(f.registry.get(&id).is_some());

        let report = f.registry.sweep(T0 + ttl - 1 + interval);
        assert_eq!(report.evicted, 1);
        assert!(f.registry.get(&id).is_none());
    }

    #[test]
    fn test_terminal_exchanges_released_not_evicted() {
        let f = fixture(eager_config(10));
        let done = create_committed(&f, "done");
        done.complete(ExchangeStatus::CompletedOk).unwrap();
        create_committed(&f, "stuck");

        let report = f.registry.sweep(T0 + 10_001);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.released, 1);
        assert!(f.registry.is_empty());
        assert_eq!(done.status(), ExchangeStatus::CompletedOk);
    }

    #[test]
    fn test_evicted_exchange_cannot_complete() {
        let f = fixture(eager_config(10));
        let mex = create_committed(&f, "m1");
        f.registry.sweep(T0 + 10_001);

        assert!(matches!(
            mex.complete(ExchangeStatus::CompletedOk),
            Err(RegistryError::Detached(_))
        ));
        assert_eq!(
            f.registry.complete(&ExchangeId::from("m1"), ExchangeStatus::CompletedOk),
            Err(RegistryError::NotFound(ExchangeId::from("m1")))
        );
    }

    #[test]
    fn test_released_id_can_be_reused() {
        let f = fixture(eager_config(10));
        let first = create_committed(&f, "m1");
        assert!(f.registry.release(&ExchangeId::from("m1")));
        assert!(first.is_detached());
        assert!(!f.registry.release(&ExchangeId::from("m1")));

        f.time.advance(5_000);
        let second = create_committed(&f, "m1");
        // The stale order entry of the first exchange must not evict the second.
        let report = f.registry.sweep(T0 + 10_001);
        assert_eq!(report.evicted, 0);
        assert!(!second.is_detached());
        assert_eq!(f.registry.len(), 1);
    }

    #[test]
    fn test_complete_idempotent_through_registry() {
        let f = fixture(RegistryConfig::default());
        create_committed(&f, "m1");
        let id = ExchangeId::from("m1");
        assert_eq!(
            f.registry.complete(&id, ExchangeStatus::CompletedWithFault),
            Ok(Completion::Completed)
        );
        assert_eq!(
            f.registry.complete(&id, ExchangeStatus::CompletedOk),
            Ok(Completion::AlreadyCompleted(ExchangeStatus::CompletedWithFault))
        );
    }

    #[test]
    fn test_piped_outcome_forwarded() {
        let f = fixture(RegistryConfig::default());
        let inbound = create_committed(&f, "in");
        let outbound = create_committed(&f, "out");
        outbound.set_invocation_style(InvocationStyle::Piped(ExchangeId::from("in")));
        outbound.set_fault("tns:rejected", Some("no stock".into()));

        f.registry
            .complete(&ExchangeId::from("out"), ExchangeStatus::CompletedWithFault)
            .unwrap();

        assert_eq!(inbound.status(), ExchangeStatus::CompletedWithFault);
        assert_eq!(
            inbound.fault(),
            Some(("tns:rejected".to_string(), Some("no stock".to_string())))
        );
    }

    #[test]
    fn test_pipe_cycle_terminates() {
        let f = fixture(RegistryConfig::default());
        let a = create_committed(&f, "a");
        let b = create_committed(&f, "b");
        a.set_invocation_style(InvocationStyle::Piped(ExchangeId::from("b")));
        b.set_invocation_style(InvocationStyle::Piped(ExchangeId::from("a")));

        f.registry
            .complete(&ExchangeId::from("a"), ExchangeStatus::CompletedOk)
            .unwrap();
        assert_eq!(b.status(), ExchangeStatus::CompletedOk);
    }

    #[test]
    fn test_fail_records_failure() {
        let f = fixture(RegistryConfig::default());
        let mex = create_committed(&f, "m1");
        f.registry
            .fail(
                &ExchangeId::from("m1"),
                FailureType::NoResponse,
                Some("partner timed out".into()),
            )
            .unwrap();
        assert_eq!(mex.status(), ExchangeStatus::Failed);
        assert_eq!(mex.failure_type(), Some(FailureType::NoResponse));
    }

    #[test]
    fn test_bind_operation_uses_catalog() {
        let catalog = OperationCatalog::new_shared();
        catalog
            .register(
                OperationKey::new("OrderService", "placeOrder"),
                InteractionPattern::RequestResponse,
            )
            .unwrap();
        let mut f = fixture(RegistryConfig::default());
        f.registry = MessageExchangeRegistry::new(RegistryConfig::default(), f.time.clone())
            .with_catalog(catalog);
        create_committed(&f, "m1");
        let id = ExchangeId::from("m1");

        assert_eq!(
            f.registry.bind_operation(&id, "OrderService", "placeOrder"),
            Ok(InteractionPattern::RequestResponse)
        );
        assert_eq!(
            f.registry.bind_operation(&id, "OrderService", "unknown"),
            Ok(InteractionPattern::Unknown)
        );
        assert_eq!(f.registry.snapshot(&id).unwrap().operation.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_correlation_status_and_advance() {
        let f = fixture(RegistryConfig::default());
        let mex = create_committed(&f, "m1");
        let id = ExchangeId::from("m1");
        f.registry.advance(&id, ExchangeStatus::Invoked).unwrap();
        mex.set_correlation_status(CorrelationStatus::Correlated);

        let snapshot = f.registry.snapshot(&id).unwrap();
        assert_eq!(snapshot.status, ExchangeStatus::Invoked);
        assert_eq!(snapshot.correlation_status, CorrelationStatus::Correlated);
    }

    #[test]
    fn test_release_instance() {
        let f = fixture(RegistryConfig::default());
        create_committed(&f, "a").set_instance(InstanceId::from("P1"));
        create_committed(&f, "b").set_instance(InstanceId::from("P1"));
        create_committed(&f, "c").set_instance(InstanceId::from("P2"));

        assert_eq!(f.registry.release_instance(&InstanceId::from("P1")), 2);
        assert_eq!(f.registry.len(), 1);
    }

    #[test]
    fn test_clock_step_back_keeps_order() {
        let f = fixture(eager_config(10));
        create_committed(&f, "a");
        f.time.set(T0 - 5_000);
        let b = create_committed(&f, "b");
        assert_eq!(b.created_at(), T0);
    }
}
