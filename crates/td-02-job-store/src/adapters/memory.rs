//! In-memory job store.
//!
//! One instance shared between schedulers stands in for the shared
//! database of a cluster. Every mutation happens under a single mutex, which
//! makes `claim` a conditional update.

use crate::domain::{
    JobOutcome, JobRecord, JobState, JobStoreError, JobStoreResult, JobStoreStats,
};
use crate::ports::JobStore;
use parking_lot::Mutex;
use shared_types::{JobId, NodeId, Timestamp};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobId, JobRecord>,
    done: u64,
    dropped: u64,
}

/// Job store held in process memory.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<StoreInner>,
    unavailable: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing the connection to the store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> JobStoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(JobStoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl JobStore for InMemoryJobStore {
    fn stage(&self, mut job: JobRecord) -> JobStoreResult<()> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        if inner.jobs.contains_key(&job.id) {
            return Err(JobStoreError::DuplicateJob(job.id));
        }
        job.state = JobState::Staged;
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn publish(&self, job_id: &JobId) -> JobStoreResult<()> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobStoreError::JobNoLongerInDb(job_id.clone()))?;
        if job.state != JobState::Staged {
            return Err(JobStoreError::InvalidState {
                job_id: job_id.clone(),
                expected: "STAGED",
                actual: job.state.to_string(),
            });
        }
        job.state = JobState::Pending;
        Ok(())
    }

    fn discard(&self, job_id: &JobId) -> JobStoreResult<()> {
        let mut inner = self.inner.lock();
        if matches!(inner.jobs.get(job_id), Some(job) if job.state == JobState::Staged) {
            inner.jobs.remove(job_id);
        }
        Ok(())
    }

    fn claim(&self, job_id: &JobId, node: &NodeId) -> JobStoreResult<JobRecord> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let job = match inner.jobs.get_mut(job_id) {
            Some(job)
                if job.state == JobState::Pending
                    && job.node_owner.as_ref().map_or(true, |owner| owner == node) =>
            {
                job
            }
            _ => return Err(JobStoreError::JobNoLongerInDb(job_id.clone())),
        };
        job.state = JobState::Claimed(node.clone());
        job.node_owner = Some(node.clone());
        Ok(job.clone())
    }

    fn finish(&self, job_id: &JobId, node: &NodeId, outcome: JobOutcome) -> JobStoreResult<()> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        match inner.jobs.get(job_id) {
            Some(job) if matches!(&job.state, JobState::Claimed(holder) if holder == node) => {}
            Some(job) if job.state == JobState::Staged => {
                return Err(JobStoreError::InvalidState {
                    job_id: job_id.clone(),
                    expected: "CLAIMED",
                    actual: job.state.to_string(),
                })
            }
            Some(job) => {
                debug!(job_id = %job_id, node = %node, state = %job.state, "Claim lost before finish");
                return Err(JobStoreError::JobNoLongerInDb(job_id.clone()));
            }
            None => return Err(JobStoreError::JobNoLongerInDb(job_id.clone())),
        }
        inner.jobs.remove(job_id);
        match outcome {
            JobOutcome::Done => inner.done += 1,
            JobOutcome::FailedDropped => inner.dropped += 1,
        }
        Ok(())
    }

    fn cancel(&self, job_id: &JobId) -> JobStoreResult<bool> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        match inner.jobs.get(job_id) {
            Some(job) if matches!(job.state, JobState::Pending | JobState::Staged) => {
                inner.jobs.remove(job_id);
                debug!(job_id = %job_id, "Job cancelled");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get(&self, job_id: &JobId) -> JobStoreResult<Option<JobRecord>> {
        self.check_available()?;
        Ok(self.inner.lock().jobs.get(job_id).cloned())
    }

    fn dequeue_immediate(
        &self,
        node: &NodeId,
        max_due: Timestamp,
        limit: usize,
    ) -> JobStoreResult<Vec<JobRecord>> {
        self.check_available()?;
        let inner = self.inner.lock();
        let mut due: Vec<JobRecord> = inner
            .jobs
            .values()
            .filter(|job| {
                job.is_pending()
                    && job.node_owner.as_ref() == Some(node)
                    && job.effective_due() <= max_due
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.effective_due()
                .cmp(&b.effective_due())
                .then_with(|| a.id.cmp(&b.id))
        });
        due.truncate(limit);
        Ok(due)
    }

    fn upgrade_jobs(&self, max_due: Timestamp, nodes: &[NodeId]) -> JobStoreResult<usize> {
        self.check_available()?;
        if nodes.is_empty() {
            return Ok(0);
        }
        let mut inner = self.inner.lock();
        let mut assigned = 0;
        for job in inner.jobs.values_mut() {
            if job.is_pending() && job.node_owner.is_none() && job.effective_due() <= max_due {
                let slot = (job.effective_due() % nodes.len() as u64) as usize;
                job.node_owner = Some(nodes[slot].clone());
                assigned += 1;
            }
        }
        if assigned > 0 {
            debug!(assigned, max_due, nodes = nodes.len(), "Upgraded far-future jobs");
        }
        Ok(assigned)
    }

    fn reassign_jobs(&self, from: &NodeId, to: &NodeId) -> JobStoreResult<usize> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let mut moved = 0;
        for job in inner.jobs.values_mut() {
            if job.node_owner.as_ref() != Some(from) {
                continue;
            }
            if job.state == JobState::Claimed(from.clone()) {
                job.state = JobState::Pending;
            }
            job.node_owner = Some(to.clone());
            moved += 1;
        }
        if moved > 0 {
            info!(from = %from, to = %to, moved, "Reassigned jobs of stale node");
        }
        Ok(moved)
    }

    fn node_ids(&self) -> JobStoreResult<Vec<NodeId>> {
        self.check_available()?;
        let inner = self.inner.lock();
        let owners: BTreeSet<NodeId> = inner
            .jobs
            .values()
            .filter_map(|job| job.node_owner.clone())
            .collect();
        Ok(owners.into_iter().collect())
    }

    fn stats(&self) -> JobStoreResult<JobStoreStats> {
        let inner = self.inner.lock();
        let mut stats = JobStoreStats {
            done: inner.done,
            dropped: inner.dropped,
            ..JobStoreStats::default()
        };
        for job in inner.jobs.values() {
            match job.state {
                JobState::Staged => stats.staged += 1,
                JobState::Pending => stats.pending += 1,
                JobState::Claimed(_) => stats.claimed += 1,
            }
        }
        Ok(stats)
    }
}
