//! The todo queue.
//!
//! Holds everything this node intends to run soon, ordered by due time:
//! persisted jobs inside the immediate horizon, volatile jobs, and the
//! scheduler's own periodic tasks.
//!
//! Persisted jobs can reach the queue twice (once from the after-commit hook,
//! again from a load-immediate pass). An outstanding mark per job id keeps
//! the second copy out until the first has run or the mark has gone stale.

use crate::ports::JobInfo;
use parking_lot::Mutex;
use shared_types::{JobId, Timestamp};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use td_02_job_store::JobRecord;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// A job ready to be handed to the worker pool.
#[derive(Debug, Clone)]
pub enum ScheduledJob {
    /// Backed by a store record; must be claimed before it runs.
    Persisted(JobRecord),
    /// Lives only in memory.
    Volatile(JobInfo),
}

impl ScheduledJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Persisted(record) => &record.id,
            Self::Volatile(info) => &info.job_id,
        }
    }

    pub fn info(&self) -> JobInfo {
        match self {
            Self::Persisted(record) => JobInfo {
                job_id: record.id.clone(),
                details: record.details.clone(),
                due_at: record.due_at,
                persisted: true,
                transacted: record.transacted,
            },
            Self::Volatile(info) => info.clone(),
        }
    }

    fn is_volatile(&self) -> bool {
        matches!(self, Self::Volatile(_))
    }
}

/// Unit of work in the todo queue.
#[derive(Debug, Clone)]
pub enum Task {
    Job(ScheduledJob),
    /// Pull this node's soon-due jobs from the store.
    LoadImmediate,
    /// Give unowned near-future jobs an owner.
    UpgradeJobs,
    /// Recover the jobs of nodes that stopped heart-beating.
    CheckStaleNodes,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Job(ScheduledJob::Persisted(_)) => "persisted-job",
            Self::Job(ScheduledJob::Volatile(_)) => "volatile-job",
            Self::LoadImmediate => "load-immediate",
            Self::UpgradeJobs => "upgrade-jobs",
            Self::CheckStaleNodes => "check-stale-nodes",
        }
    }
}

struct Entry {
    due: Timestamp,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: the heap pops the earliest due, then the earliest pushed.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct TodoInner {
    heap: BinaryHeap<Entry>,
    seq: u64,
    outstanding: HashMap<JobId, Timestamp>,
    jobs: usize,
}

impl TodoInner {
    fn push(&mut self, task: Task, due: Timestamp) {
        if matches!(task, Task::Job(_)) {
            self.jobs += 1;
        }
        self.seq += 1;
        let seq = self.seq;
        self.heap.push(Entry { due, seq, task });
    }
}

/// Time-ordered queue shared by the dispatch loop and the commit hooks.
#[derive(Default)]
pub struct TodoQueue {
    inner: Mutex<TodoInner>,
    notify: Notify,
}

impl TodoQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a scheduler task.
    pub fn push_task(&self, task: Task, due: Timestamp) {
        self.inner.lock().push(task, due);
        self.notify.notify_one();
    }

    /// Queues a job unless it is already outstanding.
    ///
    /// Returns `false` when the job was skipped.
    pub fn enqueue_job(
        &self,
        job: ScheduledJob,
        due: Timestamp,
        now: Timestamp,
        outstanding_ttl_ms: u64,
    ) -> bool {
        {
            let mut inner = self.inner.lock();
            if !job.is_volatile() {
                let id = job.job_id().clone();
                if let Some(marked_at) = inner.outstanding.get(&id) {
                    if now.saturating_sub(*marked_at) < outstanding_ttl_ms {
                        return false;
                    }
                }
                inner.outstanding.insert(id, now);
            }
            inner.push(Task::Job(job), due);
        }
        self.notify.notify_one();
        true
    }

    /// Due time of the earliest entry.
    pub fn next_due(&self) -> Option<Timestamp> {
        self.inner.lock().heap.peek().map(|entry| entry.due)
    }

    /// Pops the earliest entry if it is due at `now`.
    pub fn pop_due(&self, now: Timestamp) -> Option<Task> {
        let mut inner = self.inner.lock();
        if inner.heap.peek().map_or(true, |entry| entry.due > now) {
            return None;
        }
        let entry = inner.heap.pop()?;
        if matches!(entry.task, Task::Job(_)) {
            inner.jobs -= 1;
        }
        Some(entry.task)
    }

    /// Clears the outstanding mark once a job has run.
    pub fn finish_job(&self, job_id: &JobId) {
        self.inner.lock().outstanding.remove(job_id);
    }

    /// Drops a queued job. Returns whether anything was removed.
    pub fn remove_job(&self, job_id: &JobId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.heap.len();
        inner
            .heap
            .retain(|entry| !matches!(&entry.task, Task::Job(job) if job.job_id() == job_id));
        let removed = before - inner.heap.len();
        inner.jobs -= removed;
        inner.outstanding.remove(job_id);
        removed > 0
    }

    /// Drops everything except volatile jobs, which exist nowhere else.
    /// Returns the number of entries dropped.
    pub fn clear_for_stop(&self) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.heap.len();
        inner
            .heap
            .retain(|entry| matches!(&entry.task, Task::Job(job) if job.is_volatile()));
        let kept = inner.heap.len();
        inner.jobs = kept;
        inner.outstanding.clear();
        before - kept
    }

    /// Number of queued jobs (scheduler tasks excluded).
    pub fn job_count(&self) -> usize {
        self.inner.lock().jobs
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_outstanding(&self, job_id: &JobId) -> bool {
        self.inner.lock().outstanding.contains_key(job_id)
    }

    /// Resolves when something was queued since the last wake-up.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::JobDetails;

    fn volatile(id: &str) -> ScheduledJob {
        ScheduledJob::Volatile(JobInfo {
            job_id: JobId::from(id),
            details: JobDetails::new("timer"),
            due_at: None,
            persisted: false,
            transacted: true,
        })
    }

    fn persisted(id: &str) -> ScheduledJob {
        ScheduledJob::Persisted(JobRecord::new(JobId::from(id), JobDetails::new("timer")))
    }

    fn job_id(task: Task) -> String {
        match task {
            Task::Job(job) => job.job_id().to_string(),
            other => other.name().to_string(),
        }
    }

    #[test]
    fn test_pops_in_due_order() {
        let todo = TodoQueue::new();
        todo.enqueue_job(volatile("late"), 300, 0, 1_000);
        todo.enqueue_job(volatile("early"), 100, 0, 1_000);
        todo.push_task(Task::LoadImmediate, 200);

        assert_eq!(todo.next_due(), Some(100));
        assert!(todo.pop_due(99).is_none());
        assert_eq!(job_id(todo.pop_due(1_000).unwrap()), "early");
        assert_eq!(job_id(todo.pop_due(1_000).unwrap()), "load-immediate");
        assert_eq!(job_id(todo.pop_due(1_000).unwrap()), "late");
        assert!(todo.is_empty());
    }

    #[test]
    fn test_equal_due_keeps_insertion_order() {
        let todo = TodoQueue::new();
        for id in ["a", "b", "c"] {
            todo.enqueue_job(volatile(id), 50, 0, 1_000);
        }
        let order: Vec<_> = (0..3).map(|_| job_id(todo.pop_due(50).unwrap())).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_outstanding_guard() {
        let todo = TodoQueue::new();
        assert!(todo.enqueue_job(persisted("p"), 0, 1_000, 5_000));
        assert!(!todo.enqueue_job(persisted("p"), 0, 2_000, 5_000));
        assert_eq!(todo.job_count(), 1);

        // Stale mark lets the job in again.
        assert!(todo.enqueue_job(persisted("p"), 0, 7_000, 5_000));

        todo.pop_due(0);
        todo.pop_due(0);
        todo.finish_job(&JobId::from("p"));
        assert!(!todo.is_outstanding(&JobId::from("p")));
        assert!(todo.enqueue_job(persisted("p"), 0, 7_001, 5_000));
    }

    #[test]
    fn test_remove_job() {
        let todo = TodoQueue::new();
        todo.enqueue_job(volatile("keep"), 10, 0, 1_000);
        todo.enqueue_job(volatile("drop"), 10, 0, 1_000);
        assert!(todo.remove_job(&JobId::from("drop")));
        assert!(!todo.remove_job(&JobId::from("drop")));
        assert_eq!(todo.job_count(), 1);
    }

    #[test]
    fn test_clear_for_stop_keeps_volatile_jobs() {
        let todo = TodoQueue::new();
        todo.enqueue_job(volatile("v"), 10, 0, 1_000);
        todo.enqueue_job(persisted("p"), 10, 0, 1_000);
        todo.push_task(Task::UpgradeJobs, 10);

        assert_eq!(todo.clear_for_stop(), 2);
        assert_eq!(todo.job_count(), 1);
        assert!(!todo.is_outstanding(&JobId::from("p")));
        assert_eq!(job_id(todo.pop_due(10).unwrap()), "v");
    }
}
