//! # Simple Scheduler
//!
//! Ties the job store, the transaction manager and the todo queue together.
//!
//! ## Scheduling Horizons
//!
//! ```text
//!  now        now + immediate          now + near_future
//!   │──────────────│──────────────────────────│─────────────────→
//!   │  IMMEDIATE   │       NEAR FUTURE        │    FAR FUTURE
//!   │ owner = self │       owner = self       │    owner = none
//!   │ queued after │  loaded by LoadImmediate │ assigned by UpgradeJobs
//!   │   commit     │                          │
//! ```
//!
//! ## Background Tasks
//!
//! | Task | Runs on | Next run |
//! |------|---------|----------|
//! | LoadImmediate | every node | 0.9 × immediate (1s after a failure) |
//! | UpgradeJobs | coordinator | 0.5 × near future (1s after a failure) |
//! | CheckStaleNodes | coordinator | stale interval |
//!
//! ## Job Execution
//!
//! A due job is handed to the worker pool. A persisted job is claimed inside
//! the job's own transaction and deleted as the last step of that
//! transaction, fenced on the claim. Losing the claim race, at the start or
//! to stale-node recovery while running, rolls the transaction back quietly.
//! Processor failures roll back and the job is dropped.

use crate::config::SchedulerConfig;
use crate::domain::{ClusterView, ScheduledJob, Task, TodoQueue};
use crate::error::{BoxError, JobProcessorError, SchedulerError, SchedulerResult};
use crate::isolated::IsolatedTransaction;
use crate::ports::{CoordinatorElection, JobInfo, JobProcessor};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use shared_types::{JobDetails, JobId, NodeId, TimeSource, Timestamp};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use td_01_transaction::{Synchronizer, TransactionContext, TransactionManager, TxError};
use td_02_job_store::{JobOutcome, JobRecord, JobState, JobStore, JobStoreError};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Longest the dispatch loop sleeps without re-checking the queue.
const MAX_IDLE: Duration = Duration::from_secs(1);

/// Delay before retrying a background task that failed.
const RETRY_DELAY_MS: u64 = 1_000;

/// Collaborators the scheduler runs against.
pub struct SchedulerDeps {
    pub transactions: Arc<TransactionManager>,
    pub store: Arc<dyn JobStore>,
    pub coordinator: Arc<dyn CoordinatorElection>,
    pub cluster: Arc<ClusterView>,
    pub time: Arc<dyn TimeSource>,
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Running,
    Stopped,
    ShutDown,
}

/// Job execution counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs whose processor succeeded and whose transaction committed.
    pub completed: u64,
    /// Jobs dropped after a processor or transaction failure.
    pub failed: u64,
    /// Persisted jobs that another node claimed first.
    pub lost_claims: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    lost_claims: AtomicU64,
}

/// Why a transaction run ended without committing.
enum ExecFailure<E> {
    /// The body returned an error; the transaction was rolled back.
    Body(E),
    /// Begin or commit failed.
    Transaction(TxError),
}

/// Why a job body failed.
enum JobFailure {
    NoLongerInDb(JobId),
    Store(JobStoreError),
    Transaction(TxError),
    Processor(JobProcessorError),
}

/// A persisted job claimed by this node inside a job transaction.
struct HeldClaim {
    job_id: JobId,
    /// Set once the job record has been deleted.
    released: Arc<AtomicBool>,
}

/// Cluster-aware transactional job scheduler.
pub struct SimpleScheduler {
    config: SchedulerConfig,
    node_id: NodeId,
    transactions: Arc<TransactionManager>,
    store: Arc<dyn JobStore>,
    coordinator: Arc<dyn CoordinatorElection>,
    cluster: Arc<ClusterView>,
    time: Arc<dyn TimeSource>,
    todo: Arc<TodoQueue>,
    processor: RwLock<Option<Arc<dyn JobProcessor>>>,
    workers: Arc<Semaphore>,
    state: Mutex<SchedulerState>,
    runtime: Mutex<Option<Handle>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    counters: Counters,
}

impl SimpleScheduler {
    pub fn new(config: SchedulerConfig, deps: SchedulerDeps) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let workers = Arc::new(Semaphore::new(config.worker_threads.max(1)));
        Arc::new(Self {
            node_id: config.node_id().clone(),
            config,
            transactions: deps.transactions,
            store: deps.store,
            coordinator: deps.coordinator,
            cluster: deps.cluster,
            time: deps.time,
            todo: Arc::new(TodoQueue::new()),
            processor: RwLock::new(None),
            workers,
            state: Mutex::new(SchedulerState::Created),
            runtime: Mutex::new(None),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            counters: Counters::default(),
        })
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Starts the dispatch and heartbeat loops on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - `NoProcessor` if no job processor is registered
    /// - `NotRunning` after `shutdown()`
    /// - `Context` when called outside a tokio runtime
    pub fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        if self.processor.read().is_none() {
            return Err(SchedulerError::NoProcessor);
        }
        let handle = Handle::try_current().map_err(|e| {
            SchedulerError::context("scheduler must be started inside a tokio runtime", e)
        })?;
        {
            let mut state = self.state.lock();
            match *state {
                SchedulerState::Running => return Ok(()),
                SchedulerState::ShutDown => return Err(SchedulerError::NotRunning),
                SchedulerState::Created | SchedulerState::Stopped => {}
            }
            *state = SchedulerState::Running;
        }
        *self.runtime.lock() = Some(handle.clone());
        self.shutdown_tx.send_replace(false);

        let now = self.time.now();
        self.cluster.heartbeat(&self.node_id, now);
        self.todo.push_task(Task::LoadImmediate, now);
        self.todo.push_task(Task::UpgradeJobs, now);
        self.todo
            .push_task(Task::CheckStaleNodes, now + self.config.stale_ms());

        let dispatch = handle.spawn(Arc::clone(self).dispatch_loop(self.shutdown_tx.subscribe()));
        let heartbeat =
            handle.spawn(Arc::clone(self).heartbeat_loop(self.shutdown_tx.subscribe()));
        self.tasks.lock().extend([dispatch, heartbeat]);

        info!(
            node = %self.node_id,
            workers = self.config.worker_threads,
            "Scheduler started"
        );
        Ok(())
    }

    /// Stops the background loops. Queued volatile jobs are kept for the next
    /// `start()`; persisted jobs are reloaded from the store.
    ///
    /// The loops are aborted, so a `start()` right after cannot revive them.
    /// Jobs already handed to the worker pool run to completion.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Running {
                return;
            }
            *state = SchedulerState::Stopped;
        }
        self.shutdown_tx.send_replace(true);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let dropped = self.todo.clear_for_stop();
        info!(node = %self.node_id, dropped, "Scheduler stopped");
    }

    /// Stops the scheduler, waits for running jobs and gives up the
    /// coordinator role. The scheduler cannot be restarted afterwards.
    pub async fn shutdown(&self) {
        self.stop();
        *self.state.lock() = SchedulerState::ShutDown;

        let all = u32::try_from(self.config.worker_threads.max(1)).unwrap_or(u32::MAX);
        match self.workers.acquire_many(all).await {
            Ok(permits) => {
                self.workers.close();
                permits.forget();
            }
            Err(_) => self.workers.close(),
        }

        if let Err(e) = self.coordinator.resign().await {
            warn!(node = %self.node_id, error = %e, "Failed to resign coordinator role");
        }
        *self.runtime.lock() = None;
        info!(node = %self.node_id, "Scheduler shut down");
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    // =========================================================================
    // PUBLIC API
    // =========================================================================

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn set_job_processor(&self, processor: Arc<dyn JobProcessor>) {
        *self.processor.write() = Some(processor);
    }

    pub fn am_i_coordinator(&self) -> bool {
        self.coordinator.is_coordinator()
    }

    /// Whether the calling thread has an active transaction.
    pub fn is_transacted(&self) -> bool {
        self.transactions.is_transacted()
    }

    /// Records a heartbeat from `node`.
    pub fn update_heartbeat(&self, node: &NodeId) {
        self.cluster.heartbeat(node, self.time.now());
    }

    /// Jobs currently waiting in this node's todo queue.
    pub fn queued_jobs(&self) -> usize {
        self.todo.job_count()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            lost_claims: self.counters.lost_claims.load(Ordering::Relaxed),
        }
    }

    /// Schedules a durable job inside `tx`.
    ///
    /// The job is staged now and becomes visible when `tx` commits; a
    /// rollback discards it. `due_at = None` runs it right after commit.
    pub fn schedule_persisted_job(
        &self,
        tx: &TransactionContext,
        details: JobDetails,
        due_at: Option<Timestamp>,
    ) -> SchedulerResult<JobId> {
        let now = self.time.now();
        let due = due_at.unwrap_or(now);
        let immediate = due < now + self.config.immediate_ms();
        let near_future = due < now + self.config.near_future_ms();
        let owner = (immediate || near_future).then(|| self.node_id.clone());

        let record = JobRecord::new(JobId::generate(), details)
            .due_at(due_at)
            .owned_by(owner)
            .transacted(true);
        let job_id = record.id.clone();

        self.store.stage(record.clone()).map_err(|e| {
            SchedulerError::context(format!("failed to persist job {job_id}"), e)
        })?;

        let store = Arc::clone(&self.store);
        let todo = Arc::clone(&self.todo);
        let time = Arc::clone(&self.time);
        let outstanding_ms = self.config.outstanding_ttl.as_millis() as u64;
        let publish = Synchronizer::after(move |committed| {
            if !committed {
                store.discard(&record.id)?;
                return Ok(());
            }
            store.publish(&record.id)?;
            if immediate {
                let mut record = record;
                record.state = JobState::Pending;
                todo.enqueue_job(ScheduledJob::Persisted(record), due, time.now(), outstanding_ms);
            }
            Ok(())
        });

        if let Err(e) = tx.register_synchronizer(publish) {
            if let Err(discard) = self.store.discard(&job_id) {
                warn!(job_id = %job_id, error = %discard, "Failed to discard unregistered job");
            }
            return Err(SchedulerError::context(
                format!("failed to bind job {job_id} to transaction"),
                e,
            ));
        }

        debug!(
            job_id = %job_id,
            due,
            immediate,
            near_future,
            "Persisted job scheduled"
        );
        Ok(job_id)
    }

    /// Schedules an in-memory job that is queued when `tx` commits.
    ///
    /// `transacted` jobs run inside their own transaction; the others run
    /// with no transaction at all. A rollback of `tx` means the job never
    /// runs.
    pub fn schedule_volatile_job(
        &self,
        tx: &TransactionContext,
        transacted: bool,
        details: JobDetails,
        due_at: Option<Timestamp>,
    ) -> SchedulerResult<JobId> {
        let job_id = JobId::generate();
        let info = JobInfo {
            job_id: job_id.clone(),
            details,
            due_at,
            persisted: false,
            transacted,
        };

        let todo = Arc::clone(&self.todo);
        let time = Arc::clone(&self.time);
        tx.register_synchronizer(Synchronizer::on_commit(move || {
            let now = time.now();
            todo.enqueue_job(ScheduledJob::Volatile(info), due_at.unwrap_or(now), now, 0);
            Ok(())
        }))
        .map_err(|e| {
            SchedulerError::context(format!("failed to bind volatile job {job_id} to transaction"), e)
        })?;

        debug!(job_id = %job_id, ?due_at, transacted, "Volatile job scheduled");
        Ok(job_id)
    }

    /// Cancels a job that has not been claimed yet.
    ///
    /// Returns whether anything was cancelled. Has no effect on a job that is
    /// already running.
    pub fn cancel_job(&self, job_id: &JobId) -> SchedulerResult<bool> {
        let queued = self.todo.remove_job(job_id);
        let stored = self
            .store
            .cancel(job_id)
            .map_err(|e| SchedulerError::context(format!("failed to cancel job {job_id}"), e))?;
        if queued || stored {
            debug!(job_id = %job_id, "Job cancelled");
        }
        Ok(queued || stored)
    }

    /// Runs `body` in a new transaction on the calling thread.
    ///
    /// Commits when `body` returns `Ok`, rolls back when it returns `Err`.
    /// `timeout` overrides the transaction timeout for this call only; the
    /// previous setting is restored however the call ends.
    pub fn exec_transaction<T, E, F>(&self, body: F, timeout: Option<Duration>) -> SchedulerResult<T>
    where
        F: FnOnce(&TransactionContext) -> Result<T, E>,
        E: Into<BoxError>,
    {
        self.run_in_transaction(timeout, body).map_err(|failure| match failure {
            ExecFailure::Body(e) => SchedulerError::context("transaction body failed", e),
            ExecFailure::Transaction(e) => {
                SchedulerError::context("transaction could not complete", e)
            }
        })
    }

    /// Runs `body` on the worker pool in a transaction independent of any the
    /// caller may hold.
    pub fn exec_isolated_transaction<T, E, F>(self: &Arc<Self>, body: F) -> IsolatedTransaction<T>
    where
        F: FnOnce(&TransactionContext) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let Some(handle) = self.runtime.lock().clone() else {
            return IsolatedTransaction::ready(Err(SchedulerError::NotRunning));
        };
        let (result_tx, result_rx) = oneshot::channel();
        let scheduler = Arc::clone(self);
        let workers = Arc::clone(&self.workers);

        handle.spawn(async move {
            let Ok(permit) = workers.acquire_owned().await else {
                let _ = result_tx.send(Err(SchedulerError::NotRunning));
                return;
            };
            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                scheduler.exec_transaction(body, None)
            })
            .await;
            let result = joined.unwrap_or_else(|e| {
                Err(SchedulerError::context("isolated transaction panicked", e))
            });
            let _ = result_tx.send(result);
        });

        IsolatedTransaction::new(result_rx)
    }

    // =========================================================================
    // TRANSACTION EXECUTION
    // =========================================================================

    fn run_in_transaction<T, E, F>(
        &self,
        timeout: Option<Duration>,
        body: F,
    ) -> Result<T, ExecFailure<E>>
    where
        F: FnOnce(&TransactionContext) -> Result<T, E>,
    {
        let _timeout = self.transactions.timeout_guard(timeout);
        let tx = self.transactions.begin().map_err(ExecFailure::Transaction)?;
        match body(&tx) {
            Ok(value) => {
                tx.commit().map_err(ExecFailure::Transaction)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "Rollback after failed transaction body failed");
                }
                Err(ExecFailure::Body(e))
            }
        }
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    async fn dispatch_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        debug!(node = %self.node_id, "Dispatch loop running");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let now = self.time.now();
            if let Some(task) = self.todo.pop_due(now) {
                self.dispatch(task).await;
                continue;
            }
            let wait = self
                .todo
                .next_due()
                .map_or(MAX_IDLE, |due| Duration::from_millis(due.saturating_sub(now)))
                .min(MAX_IDLE);
            tokio::select! {
                _ = self.todo.notified() => {}
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {}
            }
        }
        debug!(node = %self.node_id, "Dispatch loop exited");
    }

    async fn dispatch(self: &Arc<Self>, task: Task) {
        let Ok(permit) = Arc::clone(&self.workers).acquire_owned().await else {
            debug!(task = task.name(), "Worker pool closed; task dropped");
            return;
        };
        let scheduler = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            scheduler.run_task(task);
        });
    }

    async fn heartbeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let base = self.config.cluster.heartbeat_interval;
        let spread = (base.as_millis() as u64 / 10).max(1);
        let jitter = rand::thread_rng().gen_range(0..spread);
        let mut ticker = tokio::time::interval(base + Duration::from_millis(jitter));
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            self.cluster.heartbeat(&self.node_id, self.time.now());
            if let Err(e) = self.coordinator.refresh().await {
                warn!(node = %self.node_id, error = %e, "Coordinator refresh failed");
            }
        }
    }

    fn run_task(&self, task: Task) {
        let now = self.time.now();
        let next = match task {
            Task::Job(job) => {
                self.run_job(job);
                return;
            }
            Task::LoadImmediate => (Task::LoadImmediate, self.load_immediate(now)),
            Task::UpgradeJobs => (Task::UpgradeJobs, self.upgrade_jobs(now)),
            Task::CheckStaleNodes => (Task::CheckStaleNodes, self.check_stale_nodes(now)),
        };
        if self.is_running() {
            self.todo.push_task(next.0, next.1);
        }
    }

    // =========================================================================
    // JOB EXECUTION
    // =========================================================================

    pub(crate) fn run_job(&self, job: ScheduledJob) {
        let info = job.info();
        let persisted = matches!(job, ScheduledJob::Persisted(_));
        let Some(processor) = self.processor.read().clone() else {
            warn!(job_id = %info.job_id, "No job processor registered; job left in place");
            self.todo.finish_job(&info.job_id);
            return;
        };

        let result = if info.transacted {
            self.run_in_transaction(None, |tx| {
                let claim = if persisted {
                    Some(self.claim_in_transaction(tx, &info.job_id)?)
                } else {
                    None
                };
                processor
                    .on_scheduled_job(&info, Some(tx))
                    .map_err(JobFailure::Processor)?;
                match claim {
                    Some(claim) => self.release_claim(&claim),
                    None => Ok(()),
                }
            })
        } else {
            self.run_without_transaction(&info, persisted, processor.as_ref())
                .map_err(ExecFailure::Body)
        };
        self.todo.finish_job(&info.job_id);

        match result {
            Ok(()) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = %info.job_id, job_type = info.job_type(), "Job completed");
            }
            Err(ExecFailure::Body(JobFailure::NoLongerInDb(job_id))) => {
                self.counters.lost_claims.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = %job_id, "Job no longer in store; forced rollback");
            }
            Err(ExecFailure::Body(failure)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                let cause = match failure {
                    JobFailure::Processor(e) => e.to_string(),
                    JobFailure::Store(e) => e.to_string(),
                    JobFailure::Transaction(e) => e.to_string(),
                    JobFailure::NoLongerInDb(id) => id.to_string(),
                };
                error!(
                    job_id = %info.job_id,
                    error = %cause,
                    "Scheduled transaction failed unexpectedly: transaction will not be retried"
                );
            }
            Err(ExecFailure::Transaction(e)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    job_id = %info.job_id,
                    error = %e,
                    "Scheduled transaction failed unexpectedly: transaction will not be retried"
                );
            }
        }
    }

    /// Claims a persisted job for the duration of `tx`.
    ///
    /// A rollback drops the job, unless the claim was already released or
    /// taken over by another node.
    fn claim_in_transaction(
        &self,
        tx: &TransactionContext,
        job_id: &JobId,
    ) -> Result<HeldClaim, JobFailure> {
        self.claim(job_id)?;
        let released = Arc::new(AtomicBool::new(false));
        let store = Arc::clone(&self.store);
        let node = self.node_id.clone();
        let id = job_id.clone();
        let removed = Arc::clone(&released);
        tx.register_synchronizer(Synchronizer::on_rollback(move || {
            if removed.load(Ordering::SeqCst) {
                warn!(job_id = %id, "Job removed before its transaction failed; it will not be retried");
                return Ok(());
            }
            match store.finish(&id, &node, JobOutcome::FailedDropped) {
                Ok(()) | Err(JobStoreError::JobNoLongerInDb(_)) => Ok(()),
                Err(e) => Err(e.into()),
            }
        }))
        .map_err(JobFailure::Transaction)?;
        Ok(HeldClaim {
            job_id: job_id.clone(),
            released,
        })
    }

    /// Deletes the claimed job as the last step of its transaction.
    ///
    /// Fails with `NoLongerInDb` when stale-node recovery reset the claim in
    /// the meantime, so the job's effects roll back instead of committing
    /// next to another node's run.
    fn release_claim(&self, claim: &HeldClaim) -> Result<(), JobFailure> {
        match self
            .store
            .finish(&claim.job_id, &self.node_id, JobOutcome::Done)
        {
            Ok(()) => {
                claim.released.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(JobStoreError::JobNoLongerInDb(id)) => Err(JobFailure::NoLongerInDb(id)),
            Err(e) => Err(JobFailure::Store(e)),
        }
    }

    fn run_without_transaction(
        &self,
        info: &JobInfo,
        persisted: bool,
        processor: &dyn JobProcessor,
    ) -> Result<(), JobFailure> {
        if persisted {
            self.claim(&info.job_id)?;
        }
        let result = processor.on_scheduled_job(info, None);
        if persisted {
            let outcome = if result.is_ok() {
                JobOutcome::Done
            } else {
                JobOutcome::FailedDropped
            };
            match self.store.finish(&info.job_id, &self.node_id, outcome) {
                Ok(()) => {}
                Err(JobStoreError::JobNoLongerInDb(id)) => return Err(JobFailure::NoLongerInDb(id)),
                Err(e) => return Err(JobFailure::Store(e)),
            }
        }
        result.map_err(JobFailure::Processor)
    }

    fn claim(&self, job_id: &JobId) -> Result<(), JobFailure> {
        match self.store.claim(job_id, &self.node_id) {
            Ok(_) => Ok(()),
            Err(JobStoreError::JobNoLongerInDb(id)) => Err(JobFailure::NoLongerInDb(id)),
            Err(e) => Err(JobFailure::Store(e)),
        }
    }

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================

    /// Queues this node's jobs due within the immediate horizon. Returns the
    /// time of the next pass.
    pub(crate) fn load_immediate(&self, now: Timestamp) -> Timestamp {
        let immediate_ms = self.config.immediate_ms();
        let next = now + immediate_ms * 9 / 10;
        if self.todo.job_count() > self.config.todo_limit / 2 {
            debug!(
                queued = self.todo.job_count(),
                limit = self.config.todo_limit,
                "Todo queue over half full; skipping load"
            );
            return next;
        }

        let batch = self.config.immediate_batch_size();
        match self
            .store
            .dequeue_immediate(&self.node_id, now + immediate_ms, batch)
        {
            Ok(jobs) => {
                let outstanding_ms = self.config.outstanding_ttl.as_millis() as u64;
                let mut loaded = 0;
                for record in jobs {
                    let due = record.effective_due();
                    let job = ScheduledJob::Persisted(record);
                    if self.todo.enqueue_job(job, due, now, outstanding_ms) {
                        loaded += 1;
                    }
                }
                if loaded > 0 {
                    debug!(node = %self.node_id, loaded, "Loaded immediate jobs");
                }
                next
            }
            Err(e) => {
                error!(node = %self.node_id, error = %e, "Failed to load immediate jobs");
                now + RETRY_DELAY_MS
            }
        }
    }

    /// Assigns owners to unowned near-future jobs. Coordinator only.
    pub(crate) fn upgrade_jobs(&self, now: Timestamp) -> Timestamp {
        if !self.am_i_coordinator() {
            return now + self.config.cluster.heartbeat_interval.as_millis() as u64;
        }
        let mut nodes = self.cluster.known_nodes();
        if nodes.is_empty() {
            nodes.push(self.node_id.clone());
        }
        let near_future_ms = self.config.near_future_ms();
        match self.store.upgrade_jobs(now + near_future_ms, &nodes) {
            Ok(assigned) => {
                if assigned > 0 {
                    info!(assigned, nodes = nodes.len(), "Assigned near-future jobs");
                }
                now + near_future_ms / 2
            }
            Err(e) => {
                error!(error = %e, "Failed to upgrade jobs");
                now + RETRY_DELAY_MS
            }
        }
    }

    /// Moves the jobs of silent nodes to this node. Coordinator only.
    pub(crate) fn check_stale_nodes(&self, now: Timestamp) -> Timestamp {
        let next = now + self.config.stale_ms();
        if !self.am_i_coordinator() {
            return next;
        }
        match self.store.node_ids() {
            Ok(owners) => self.cluster.observe(owners.iter(), now),
            Err(e) => warn!(error = %e, "Failed to list job owners"),
        }
        for node in self
            .cluster
            .stale_nodes(now, self.config.stale_ms(), &self.node_id)
        {
            match self.store.reassign_jobs(&node, &self.node_id) {
                Ok(moved) => {
                    warn!(stale_node = %node, moved, "Recovered jobs of stale node");
                    self.cluster.forget(&node);
                }
                Err(e) => {
                    error!(stale_node = %node, error = %e, "Failed to recover stale node");
                }
            }
        }
        next
    }
}
