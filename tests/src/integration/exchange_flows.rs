//! # Exchange Flows
//!
//! The exchange registry driven through the scheduler's transactions:
//!
//! 1. **Rollback compensation**: an exchange created by a transaction that
//!    rolls back disappears, whatever status it reached.
//! 2. **TTL boundary**: an unfinished exchange survives a sweep at exactly
//!    its TTL and is evicted one millisecond later.
//! 3. **Idempotent completion**: the first terminal status sticks.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use node_runtime::{ClusterBackends, NodeConfig, SubsystemContainer};
    use shared_types::{
        ExchangeId, InteractionPattern, ManualTimeSource, OperationKey, Timestamp,
    };
    use td_03_scheduler::SchedulerError;
    use td_04_exchange_registry::{
        Completion, Direction, ExchangeStatus, InvocationStyle, RegistryConfig,
    };

    const T0: Timestamp = 1_700_000_000_000;
    const TTL_MS: u64 = 120_000;

    // =========================================================================
    // FIXTURES
    // =========================================================================

    fn node(time: Arc<ManualTimeSource>) -> SubsystemContainer {
        let mut config = NodeConfig::default();
        // Unthrottled, so each sweep below sees the exact TTL boundary.
        config.registry = RegistryConfig {
            ttl: Duration::from_millis(TTL_MS),
            min_sweep_interval: Some(Duration::ZERO),
        };
        let backends = ClusterBackends {
            time,
            ..ClusterBackends::default()
        };
        SubsystemContainer::with_backends(config, backends)
    }

    fn create(node: &SubsystemContainer, id: &str) {
        node.scheduler
            .exec_transaction(
                |tx| {
                    node.registry
                        .create(tx, ExchangeId::from(id), Direction::PartnerRole)
                        .map(|_| ())
                },
                None,
            )
            .unwrap();
    }

    // =========================================================================
    // ROLLBACK COMPENSATION
    // =========================================================================

    #[test]
    fn test_rolled_back_creation_leaves_nothing_behind() {
        let node = node(Arc::new(ManualTimeSource::new(T0)));
        let id = ExchangeId::from("mex-rollback");

        let result: Result<(), SchedulerError> = node.scheduler.exec_transaction(
            |tx| -> anyhow::Result<()> {
                let mex = node.registry.create(tx, id.clone(), Direction::MyRole)?;
                mex.advance(ExchangeStatus::Invoked)?;
                mex.complete(ExchangeStatus::CompletedOk)?;
                Err(anyhow::anyhow!("partner call failed"))
            },
            None,
        );

        assert!(matches!(result, Err(SchedulerError::Context { .. })));
        assert!(node.registry.get(&id).is_none());
        assert_eq!(node.registry.stats().rolled_back, 1);
    }

    #[test]
    fn test_committed_creation_survives() {
        let node = node(Arc::new(ManualTimeSource::new(T0)));
        create(&node, "mex-ok");
        let mex = node.registry.get(&ExchangeId::from("mex-ok")).unwrap();
        assert_eq!(mex.status(), ExchangeStatus::New);
        assert_eq!(mex.created_at(), T0);
    }

    // =========================================================================
    // TTL BOUNDARY
    // =========================================================================

    #[test]
    fn test_ttl_boundary() {
        let time = Arc::new(ManualTimeSource::new(T0));
        let node = node(time.clone());
        create(&node, "mex-ttl");
        let id = ExchangeId::from("mex-ttl");

        node.registry.sweep(T0 + TTL_MS - 1);
        assert!(node.registry.get(&id).is_some());

        node.registry.sweep(T0 + TTL_MS);
        assert!(node.registry.get(&id).is_some());

        let report = node.registry.sweep(T0 + TTL_MS + 1);
        assert_eq!(report.evicted, 1);
        assert!(node.registry.get(&id).is_none());
    }

    #[test]
    fn test_creation_triggers_sweep() {
        let time = Arc::new(ManualTimeSource::new(T0));
        let node = node(time.clone());
        create(&node, "old");

        time.advance(TTL_MS + 1);
        create(&node, "new");

        assert!(node.registry.get(&ExchangeId::from("old")).is_none());
        assert!(node.registry.get(&ExchangeId::from("new")).is_some());
        assert_eq!(node.registry.stats().evicted, 1);
    }

    // =========================================================================
    // COMPLETION
    // =========================================================================

    #[test]
    fn test_double_completion_is_idempotent() {
        let node = node(Arc::new(ManualTimeSource::new(T0)));
        create(&node, "mex-done");
        let id = ExchangeId::from("mex-done");

        assert_eq!(
            node.registry.complete(&id, ExchangeStatus::CompletedOk),
            Ok(Completion::Completed)
        );
        assert_eq!(
            node.registry.complete(&id, ExchangeStatus::CompletedWithFault),
            Ok(Completion::AlreadyCompleted(ExchangeStatus::CompletedOk))
        );
        assert_eq!(
            node.registry.snapshot(&id).unwrap().status,
            ExchangeStatus::CompletedOk
        );
    }

    #[test]
    fn test_piped_request_response() {
        let node = node(Arc::new(ManualTimeSource::new(T0)));
        node.catalog
            .register(
                OperationKey::new("Shipping", "ship"),
                InteractionPattern::RequestResponse,
            )
            .unwrap();
        create(&node, "inbound");
        create(&node, "outbound");
        let inbound = ExchangeId::from("inbound");
        let outbound = ExchangeId::from("outbound");

        assert_eq!(
            node.registry.bind_operation(&outbound, "Shipping", "ship"),
            Ok(InteractionPattern::RequestResponse)
        );
        node.registry
            .get(&outbound)
            .unwrap()
            .set_invocation_style(InvocationStyle::Piped(inbound.clone()));
        node.registry
            .advance(&outbound, ExchangeStatus::AsyncWait)
            .unwrap();
        node.registry
            .complete(&outbound, ExchangeStatus::CompletedOk)
            .unwrap();

        assert_eq!(
            node.registry.get(&inbound).unwrap().status(),
            ExchangeStatus::CompletedOk
        );
    }
}
