//! Drops registry state of instances that are gone.

use shared_types::InstanceId;
use std::sync::Arc;
use td_04_exchange_registry::MessageExchangeRegistry;
use td_05_instance_store::{InstanceListener, InstanceState};
use tracing::debug;

/// Releases the resource routes and exchanges of finished or deleted
/// instances.
pub struct InstanceCleanup {
    registry: Arc<MessageExchangeRegistry>,
}

impl InstanceCleanup {
    pub fn new(registry: Arc<MessageExchangeRegistry>) -> Self {
        Self { registry }
    }

    fn cleanup(&self, id: &InstanceId) {
        let routes = self.registry.cleanup_routes_for_instance(id);
        let exchanges = self.registry.release_instance(id);
        debug!(instance = %id, routes, exchanges, "Instance registry state released");
    }
}

impl InstanceListener for InstanceCleanup {
    fn on_finished(&self, id: &InstanceId, _state: InstanceState) {
        self.cleanup(id);
    }

    fn on_removed(&self, id: &InstanceId) {
        self.cleanup(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ExchangeId, ManualTimeSource};
    use td_01_transaction::{InMemoryResourceManager, TransactionConfig, TransactionManager};
    use td_04_exchange_registry::{Direction, RegistryConfig, ResourceRoute, RouteKey};
    use td_05_instance_store::{InMemoryInstanceStore, ProcessInstance, ProcessInstanceStore};

    #[test]
    fn test_finished_instance_loses_routes_and_exchanges() {
        let tm = TransactionManager::new(
            Arc::new(InMemoryResourceManager::new()),
            TransactionConfig::default(),
        );
        let registry = Arc::new(MessageExchangeRegistry::new(
            RegistryConfig::default(),
            Arc::new(ManualTimeSource::new(1_000)),
        ));
        let store = InMemoryInstanceStore::new();
        store.add_listener(Arc::new(InstanceCleanup::new(registry.clone())));
        let p1 = InstanceId::from("P1");

        let tx = tm.begin().unwrap();
        store
            .create(&tx, ProcessInstance::new(p1.clone(), "Order", 0))
            .unwrap();
        registry
            .create(&tx, ExchangeId::from("m1"), Direction::MyRole)
            .unwrap()
            .set_instance(p1.clone());
        registry
            .add_route(ResourceRoute::new(RouteKey::new("/orders/1", "PUT"), "sel", p1.clone(), "ch"))
            .unwrap();
        tx.commit().unwrap();

        let tx = tm.begin().unwrap();
        store
            .set_state(&tx, &p1, InstanceState::CompletedOk, 10)
            .unwrap();
        assert_eq!(registry.route_count(), 1);
        tx.commit().unwrap();

        assert_eq!(registry.route_count(), 0);
        assert!(registry.is_empty());
    }
}
