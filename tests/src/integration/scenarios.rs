//! # Multi-Node Scenarios
//!
//! Two nodes built on the same [`ClusterBackends`] behave like members of
//! one cluster: they share the job store, the instance store and the
//! coordinator lease table.
//!
//! ## Retire P1
//!
//! ```text
//! node-a: tx { schedule_persisted_job({op: retire, pid: P1}) } ─commit─→ queued on node-a
//! node-a: claim ─→ InstanceCommandHandler ─→ P1 = RETIRED ─commit─→ job deleted
//! node-b: claim(same job) ─→ JobNoLongerInDb
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use node_runtime::handlers::InstanceCommand;
    use node_runtime::{ClusterBackends, NodeConfig, SubsystemContainer};
    use shared_types::{InstanceId, NodeId};
    use td_02_job_store::{JobStore, JobStoreError};
    use td_03_scheduler::CoordinatorElection;
    use td_04_exchange_registry::{ResourceRoute, RouteKey};
    use td_05_instance_store::{InstanceState, ProcessInstance, ProcessInstanceStore};

    // =========================================================================
    // FIXTURES
    // =========================================================================

    fn cluster_node(name: &str, backends: &ClusterBackends) -> SubsystemContainer {
        let mut config = NodeConfig::default();
        config.scheduler.cluster.node_id = NodeId::new(name);
        config.scheduler.worker_threads = 4;
        SubsystemContainer::with_backends(config, backends.clone())
    }

    fn seed_active_instance(node: &SubsystemContainer, pid: &InstanceId) {
        let now = node.time.now();
        node.scheduler
            .exec_transaction(
                |tx| -> anyhow::Result<()> {
                    node.instances
                        .create(tx, ProcessInstance::new(pid.clone(), "OrderProcess", now))?;
                    node.instances
                        .set_state(tx, pid, InstanceState::Active, now)?;
                    Ok(())
                },
                None,
            )
            .unwrap();
    }

    async fn wait_for_state(node: &SubsystemContainer, pid: &InstanceId, state: InstanceState) {
        for _ in 0..150 {
            if node.instances.get(pid).map(|i| i.state) == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("instance {pid} never reached {state}");
    }

    async fn wait_for_completed_jobs(node: &SubsystemContainer, count: u64) {
        for _ in 0..150 {
            if node.scheduler.stats().completed >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("scheduler never completed {count} job(s)");
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retire_p1_across_two_nodes() {
        let backends = ClusterBackends::default();
        let node_a = cluster_node("node-a", &backends);
        let node_b = cluster_node("node-b", &backends);
        let p1 = InstanceId::from("P1");
        seed_active_instance(&node_a, &p1);

        node_a
            .registry
            .add_route(ResourceRoute::new(
                RouteKey::new("/orders/P1", "DELETE"),
                "cancel",
                p1.clone(),
                "ch-cancel",
            ))
            .unwrap();
        node_a.scheduler.start().unwrap();

        let scheduler = Arc::clone(&node_a.scheduler);
        let target = p1.clone();
        let job_id = tokio::task::spawn_blocking(move || {
            scheduler.exec_transaction(
                |tx| scheduler.schedule_persisted_job(tx, InstanceCommand::Retire.job(&target), None),
                None,
            )
        })
        .await
        .unwrap()
        .unwrap();

        wait_for_state(&node_a, &p1, InstanceState::Retired).await;
        wait_for_completed_jobs(&node_a, 1).await;
        assert!(node_b.job_store.get(&job_id).unwrap().is_none());

        let instance = node_b.instances.get(&p1).unwrap();
        assert_eq!(instance.state, InstanceState::Retired);
        assert_eq!(instance.previous_state, Some(InstanceState::Active));

        let second_claim = node_b
            .job_store
            .claim(&job_id, node_b.scheduler.node_id());
        assert_eq!(second_claim.unwrap_err(), JobStoreError::JobNoLongerInDb(job_id));

        assert!(node_a.registry.get_route("/orders/P1", "DELETE").is_none());

        node_a.scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rolled_back_schedule_never_runs_on_any_node() {
        let backends = ClusterBackends::default();
        let node_a = cluster_node("node-a", &backends);
        let node_b = cluster_node("node-b", &backends);
        let p1 = InstanceId::from("P1");
        seed_active_instance(&node_a, &p1);
        node_a.scheduler.start().unwrap();
        node_b.scheduler.start().unwrap();

        let scheduler = Arc::clone(&node_a.scheduler);
        let target = p1.clone();
        let result = tokio::task::spawn_blocking(move || {
            scheduler.exec_transaction(
                |tx| -> anyhow::Result<()> {
                    scheduler.schedule_persisted_job(tx, InstanceCommand::Retire.job(&target), None)?;
                    Err(anyhow::anyhow!("caller changed its mind"))
                },
                None,
            )
        })
        .await
        .unwrap();
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            node_b.instances.get(&p1).unwrap().state,
            InstanceState::Active
        );
        assert_eq!(backends.job_store.stats().unwrap().pending, 0);

        node_a.scheduler.shutdown().await;
        node_b.scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_coordinator_between_nodes() {
        let backends = ClusterBackends::default();
        let node_a = cluster_node("node-a", &backends);
        let node_b = cluster_node("node-b", &backends);

        assert!(node_a.coordinator.refresh().await.unwrap());
        assert!(!node_b.coordinator.refresh().await.unwrap());
        assert!(node_a.scheduler.am_i_coordinator());
        assert!(!node_b.scheduler.am_i_coordinator());

        node_a.coordinator.resign().await.unwrap();
        assert!(node_b.coordinator.refresh().await.unwrap());
        assert!(node_b.scheduler.am_i_coordinator());
    }
}
