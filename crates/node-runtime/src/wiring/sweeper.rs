//! Background exchange sweep, run by the coordinator only.

use shared_types::TimeSource;
use std::sync::Arc;
use std::time::Duration;
use td_03_scheduler::CoordinatorElection;
use td_04_exchange_registry::MessageExchangeRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawns the sweeper. It ticks every `period` and sweeps while this node
/// holds the coordinator role, until `shutdown` turns `true`.
pub fn spawn_sweeper(
    registry: Arc<MessageExchangeRegistry>,
    coordinator: Arc<dyn CoordinatorElection>,
    time: Arc<dyn TimeSource>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            if !coordinator.is_coordinator() {
                continue;
            }
            let report = registry.sweep(time.now());
            if report.evicted > 0 || report.released > 0 {
                debug!(
                    evicted = report.evicted,
                    released = report.released,
                    live = registry.len(),
                    "Exchange sweep finished"
                );
            }
        }
        info!("Exchange sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ExchangeId, ManualTimeSource};
    use td_01_transaction::{InMemoryResourceManager, TransactionConfig, TransactionManager};
    use td_03_scheduler::StaticCoordinator;
    use td_04_exchange_registry::{Direction, RegistryConfig};

    const T0: u64 = 1_000_000;

    fn registry_with_stale_exchange(time: Arc<ManualTimeSource>) -> Arc<MessageExchangeRegistry> {
        let config = RegistryConfig {
            ttl: Duration::from_secs(10),
            min_sweep_interval: Some(Duration::ZERO),
        };
        let registry = Arc::new(MessageExchangeRegistry::new(config, time.clone()));
        let tm = TransactionManager::new(
            Arc::new(InMemoryResourceManager::new()),
            TransactionConfig::default(),
        );
        let tx = tm.begin().unwrap();
        registry
            .create(&tx, ExchangeId::from("m1"), Direction::PartnerRole)
            .unwrap();
        tx.commit().unwrap();
        time.advance(10_001);
        registry
    }

    async fn run_briefly(registry: Arc<MessageExchangeRegistry>, coordinator: bool, time: Arc<ManualTimeSource>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_sweeper(
            registry,
            Arc::new(StaticCoordinator::new(coordinator)),
            time,
            Duration::from_millis(10),
            shutdown_rx,
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send_replace(true);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_coordinator_sweeps() {
        let time = Arc::new(ManualTimeSource::new(T0));
        let registry = registry_with_stale_exchange(time.clone());
        run_briefly(registry.clone(), true, time).await;
        assert!(registry.is_empty());
        assert_eq!(registry.stats().evicted, 1);
    }

    #[tokio::test]
    async fn test_follower_does_not_sweep() {
        let time = Arc::new(ManualTimeSource::new(T0));
        let registry = registry_with_stale_exchange(time.clone());
        run_briefly(registry.clone(), false, time).await;
        assert_eq!(registry.len(), 1);
    }
}
