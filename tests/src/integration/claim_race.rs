//! # Claim Race
//!
//! Many nodes try to claim the same pending job at once. The store's claim
//! is the only linearization point, so exactly one of them may win; every
//! other node must see `JobNoLongerInDb`.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use rand::Rng;
    use shared_types::{JobDetails, JobId, NodeId};
    use td_02_job_store::{InMemoryJobStore, JobOutcome, JobRecord, JobState, JobStore, JobStoreError};

    const NODES: usize = 8;
    const ROUNDS: usize = 25;

    // =========================================================================
    // FIXTURES
    // =========================================================================

    fn publish_job(store: &InMemoryJobStore) -> JobId {
        let record = JobRecord::new(JobId::generate(), JobDetails::new("timer"));
        let id = record.id.clone();
        store.stage(record).unwrap();
        store.publish(&id).unwrap();
        id
    }

    fn race(store: &Arc<InMemoryJobStore>, id: &JobId) -> Vec<Result<JobRecord, JobStoreError>> {
        let barrier = Arc::new(Barrier::new(NODES));
        let handles: Vec<_> = (0..NODES)
            .map(|n| {
                let store = Arc::clone(store);
                let barrier = Arc::clone(&barrier);
                let id = id.clone();
                thread::spawn(move || {
                    let node = NodeId::new(format!("node-{n}"));
                    let jitter = rand::thread_rng().gen_range(0..50);
                    barrier.wait();
                    thread::sleep(Duration::from_micros(jitter));
                    store.claim(&id, &node)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    // =========================================================================
    // TESTS
    // =========================================================================

    #[test]
    fn test_exactly_one_node_wins_each_claim() {
        let store = Arc::new(InMemoryJobStore::new());
        for _ in 0..ROUNDS {
            let id = publish_job(&store);
            let results = race(&store, &id);

            let winners: Vec<&JobRecord> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(winners.len(), 1);
            for result in &results {
                if let Err(e) = result {
                    assert_eq!(*e, JobStoreError::JobNoLongerInDb(id.clone()));
                }
            }

            let stored = store.get(&id).unwrap().unwrap();
            let JobState::Claimed(winner) = stored.state else {
                panic!("job {id} not claimed after the race");
            };
            store.finish(&id, &winner, JobOutcome::Done).unwrap();
        }
        assert!(store.is_empty());
        assert_eq!(store.stats().unwrap().done, ROUNDS as u64);
    }

    #[test]
    fn test_owned_job_cannot_be_taken_by_other_nodes() {
        let store = Arc::new(InMemoryJobStore::new());
        let owner = NodeId::new("node-3");
        let record = JobRecord::new(JobId::generate(), JobDetails::new("timer"))
            .owned_by(Some(owner.clone()));
        let id = record.id.clone();
        store.stage(record).unwrap();
        store.publish(&id).unwrap();

        let results = race(&store, &id);
        let winners: Vec<NodeId> = results
            .into_iter()
            .filter_map(Result::ok)
            .filter_map(|record| match record.state {
                JobState::Claimed(node) => Some(node),
                _ => None,
            })
            .collect();
        assert_eq!(winners, vec![owner]);
    }

    #[test]
    fn test_staged_job_cannot_be_claimed() {
        let store = InMemoryJobStore::new();
        let record = JobRecord::new(JobId::generate(), JobDetails::new("timer"));
        let id = record.id.clone();
        store.stage(record).unwrap();

        assert_eq!(
            store.claim(&id, &NodeId::new("node-0")).unwrap_err(),
            JobStoreError::JobNoLongerInDb(id)
        );
    }
}
