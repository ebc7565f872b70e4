//! # Scheduler Flows
//!
//! Scheduler behavior observed from the outside of a running node:
//!
//! 1. **Delayed volatile job**: a job due in five seconds does not run early
//!    and runs within 250ms of its due time.
//! 2. **Timeout override**: `exec_transaction` restores the transaction
//!    timeout when the body fails.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use node_runtime::{NodeConfig, SubsystemContainer};
    use parking_lot::Mutex;
    use shared_types::{JobDetails, SystemTimeSource, TimeSource, Timestamp};

    const DELAY_MS: u64 = 5_000;
    const TOLERANCE_MS: u64 = 250;

    #[derive(Debug, Clone, Copy)]
    struct Fired {
        at: Timestamp,
        in_transaction: bool,
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_delayed_volatile_job_fires_on_time() {
        let node = SubsystemContainer::new(NodeConfig::default());
        let fired: Arc<Mutex<Option<Fired>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&fired);
        node.dispatcher.register_fn("marker", move |_job, tx| {
            *slot.lock() = Some(Fired {
                at: SystemTimeSource.now(),
                in_transaction: tx.is_some(),
            });
            Ok(())
        });
        node.scheduler.start().unwrap();

        let scheduler = Arc::clone(&node.scheduler);
        let due = tokio::task::spawn_blocking(move || {
            let due = SystemTimeSource.now() + DELAY_MS;
            scheduler
                .exec_transaction(
                    |tx| scheduler.schedule_volatile_job(tx, true, JobDetails::new("marker"), Some(due)),
                    None,
                )
                .map(|_| due)
        })
        .await
        .unwrap()
        .unwrap();

        tokio::time::sleep(Duration::from_millis(DELAY_MS - 500)).await;
        assert!(fired.lock().is_none(), "job ran before its due time");

        for _ in 0..100 {
            if fired.lock().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let fired = fired.lock().expect("job never ran");
        assert!(fired.at >= due, "ran {}ms early", due - fired.at);
        assert!(
            fired.at <= due + TOLERANCE_MS,
            "ran {}ms late",
            fired.at - due
        );
        assert!(fired.in_transaction);

        node.scheduler.shutdown().await;
    }

    #[test]
    fn test_timeout_override_restored_after_failure() {
        let node = SubsystemContainer::new(NodeConfig::default());
        let default = node.transactions.default_timeout();
        let override_timeout = Duration::from_secs(5);

        let seen = node.scheduler.exec_transaction(
            |tx| Ok::<_, anyhow::Error>(tx.timeout()),
            Some(override_timeout),
        );
        assert_eq!(seen.unwrap(), override_timeout);
        assert_eq!(node.transactions.timeout(), default);

        let failed = node.scheduler.exec_transaction(
            |_tx| Err::<(), _>(anyhow::anyhow!("body failed")),
            Some(override_timeout),
        );
        assert!(failed.is_err());
        assert_eq!(node.transactions.timeout(), default);
        assert!(!node.scheduler.is_transacted());
    }

    #[test]
    fn test_rolled_back_volatile_job_never_queued() {
        let node = SubsystemContainer::new(NodeConfig::default());
        let result = node.scheduler.exec_transaction(
            |tx| -> anyhow::Result<()> {
                node.scheduler
                    .schedule_volatile_job(tx, false, JobDetails::new("marker"), None)?;
                Err(anyhow::anyhow!("abort"))
            },
            None,
        );
        assert!(result.is_err());
        assert_eq!(node.scheduler.queued_jobs(), 0);
    }
}
