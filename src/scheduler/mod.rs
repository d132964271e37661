//! Priority job scheduling, dispatch, retry, and self-healing.
//!
//! The scheduler owns two pieces of shared state behind one lock: the
//! pending priority queue and the in-flight set. A drain pass pops jobs up
//! to the concurrency cap and launches each as an independent task; job
//! completion re-triggers the drain after a short debounce. A background
//! ticker re-drains a non-empty queue once per second, and a health loop
//! fails stuck jobs and re-enqueues overdue ones.

mod pipeline;
mod queue;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::collaborators::{ContentUpdater, PerformanceRecorder, PositionManager};
use crate::config::{ConflictConfig, SchedulerConfig, SelectionConfig};
use crate::conflict::{ConflictDetector, ConflictResolver};
use crate::model::{
    AccountId, ActorId, AutomationStatus, ExecutionReport, GroupId, JobKind, JobMetadata,
    JobStatus, MaintenanceJob,
};
use crate::observability::Metrics;
use crate::selection::ContentSelector;
use crate::store::{ContentCatalog, JobFilter, Store, StoreError};
use uuid::Uuid;

use queue::{DispatchState, QueuedJob};

/// Priority assigned to emergency jobs.
const EMERGENCY_PRIORITY: u8 = 10;

/// Priority assigned to self-scheduled follow-up jobs.
const DEFAULT_PRIORITY: u8 = 1;

/// Grace period before a pending job counts as overdue.
const OVERDUE_GRACE_MINUTES: i64 = 5;

/// Debounce between a job finishing and the next drain pass.
const REDISPATCH_DELAY_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} is disabled")]
    FeatureDisabled(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {id} is not executable in status {status:?}")]
    NotExecutable { id: String, status: JobStatus },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Counters reported by one health-check pass.
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub stuck_failed: usize,
    pub requeued: usize,
}

/// Cheaply cloneable handle; all state lives behind one shared core.
#[derive(Clone)]
pub struct MaintenanceScheduler {
    inner: Arc<SchedulerCore>,
}

struct SchedulerCore {
    store: Arc<dyn Store>,
    updater: Arc<dyn ContentUpdater>,
    positions: Arc<dyn PositionManager>,
    recorder: Arc<dyn PerformanceRecorder>,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    selector: ContentSelector,
    config: SchedulerConfig,
    state: Mutex<DispatchState>,
    accepting: AtomicBool,
    loops: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

impl MaintenanceScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn ContentCatalog>,
        updater: Arc<dyn ContentUpdater>,
        positions: Arc<dyn PositionManager>,
        recorder: Arc<dyn PerformanceRecorder>,
        config: SchedulerConfig,
        conflict_config: ConflictConfig,
        selection_config: SelectionConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let detector = ConflictDetector::new(store.clone(), conflict_config);
        let resolver = ConflictResolver::new(store.clone(), detector.clone());
        let selector = ContentSelector::new(catalog, selection_config);

        Self {
            inner: Arc::new(SchedulerCore {
                store,
                updater,
                positions,
                recorder,
                detector,
                resolver,
                selector,
                config,
                state: Mutex::new(DispatchState::default()),
                accepting: AtomicBool::new(true),
                loops: Mutex::new(Vec::new()),
                metrics,
            }),
        }
    }

    /// Spawn the background drain ticker and health-check loop.
    pub async fn start(&self) {
        let mut loops = self.inner.loops.lock().await;
        if !loops.is_empty() {
            return;
        }

        let drain = {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let interval =
                    std::time::Duration::from_millis(scheduler.inner.config.drain_interval_ms);
                loop {
                    tokio::time::sleep(interval).await;
                    if !scheduler.inner.accepting.load(Ordering::SeqCst) {
                        break;
                    }
                    let queued = scheduler.inner.state.lock().await.queued();
                    if queued > 0 {
                        scheduler.dispatch().await;
                    }
                }
            })
        };

        let health = {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let interval = std::time::Duration::from_millis(
                    scheduler.inner.config.health_check_interval_ms,
                );
                loop {
                    tokio::time::sleep(interval).await;
                    if !scheduler.inner.accepting.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = scheduler.run_health_check().await {
                        error!(error = %e, "Health check failed");
                    }
                }
            })
        };

        loops.push(drain);
        loops.push(health);
        info!("Maintenance scheduler started");
    }

    /// Schedule a maintenance job.
    ///
    /// The job is persisted immediately and enqueued for dispatch when its
    /// scheduled time is not in the future. Returns the new job id.
    #[allow(clippy::too_many_arguments)]
    pub async fn schedule_maintenance(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        actor_id: ActorId,
        scheduled_for: DateTime<Utc>,
        kind: JobKind,
        priority: u8,
        metadata: JobMetadata,
    ) -> Result<String> {
        let job = self
            .create_job(group_id, account_id, actor_id, scheduled_for, kind, priority, metadata)
            .await?;

        if scheduled_for <= Utc::now() {
            self.enqueue_job(&job).await;
        }

        info!(
            job_id = %job.id,
            group_id,
            account_id,
            kind = ?kind,
            priority,
            %scheduled_for,
            "Maintenance scheduled"
        );

        Ok(job.id)
    }

    /// Run an emergency maintenance pass synchronously, bypassing the queue.
    ///
    /// Gated on the `emergency_override_enabled` configuration flag. With
    /// `override_conflicts`, conflict detection is skipped entirely.
    pub async fn execute_immediate(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        actor_id: ActorId,
        override_conflicts: bool,
        mut metadata: JobMetadata,
    ) -> Result<ExecutionReport> {
        if !self.inner.config.emergency_override_enabled {
            return Err(SchedulerError::FeatureDisabled("emergency override"));
        }

        metadata.override_conflicts = override_conflicts;
        let job = self
            .create_job(
                group_id,
                account_id,
                actor_id,
                Utc::now(),
                JobKind::Emergency,
                EMERGENCY_PRIORITY,
                metadata,
            )
            .await?;

        info!(job_id = %job.id, group_id, account_id, "Executing immediate maintenance");
        self.execute_job(&job.id).await
    }

    async fn create_job(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        actor_id: ActorId,
        scheduled_for: DateTime<Utc>,
        kind: JobKind,
        priority: u8,
        metadata: JobMetadata,
    ) -> Result<MaintenanceJob> {
        if priority < 1 {
            return Err(SchedulerError::Validation(
                "priority must be at least 1".to_string(),
            ));
        }

        let group = self
            .inner
            .store
            .get_group(group_id)
            .await?
            .ok_or_else(|| SchedulerError::Validation(format!("unknown group {group_id}")))?;

        if group.account_id != account_id {
            return Err(SchedulerError::Validation(format!(
                "group {group_id} does not belong to account {account_id}"
            )));
        }

        let now = Utc::now();
        let job = MaintenanceJob {
            id: Uuid::now_v7().to_string(),
            group_id,
            account_id,
            actor_id,
            kind,
            status: JobStatus::Pending,
            scheduled_for,
            started_at: None,
            completed_at: None,
            priority,
            retry_count: 0,
            max_retries: self.inner.config.max_retries,
            metadata,
            result: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        self.inner.store.put_job(&job).await?;
        self.inner.metrics.job_scheduled();
        Ok(job)
    }

    /// Insert a job into the dispatch queue and kick a drain pass.
    /// Idempotent: a job already queued or in flight is left alone.
    async fn enqueue_job(&self, job: &MaintenanceJob) {
        let inserted = {
            let mut state = self.inner.state.lock().await;
            state.enqueue(QueuedJob {
                job_id: job.id.clone(),
                priority: job.priority,
            })
        };

        if !inserted {
            warn!(job_id = %job.id, "Job already queued or active");
            return;
        }

        debug!(job_id = %job.id, priority = job.priority, "Job queued");
        self.dispatch().await;
    }

    /// Drain the queue up to the concurrency cap, launching each popped job
    /// as an independent task. Safe to call concurrently: pops are
    /// serialized under the state lock.
    async fn dispatch(&self) {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return;
        }

        loop {
            let next = {
                let mut state = self.inner.state.lock().await;
                state.pop_next(self.inner.config.max_concurrent_jobs)
            };

            match next {
                Some(queued) => self.spawn_job(queued.job_id),
                None => break,
            }
        }
    }

    fn spawn_job(&self, job_id: String) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.execute_job(&job_id).await {
                warn!(job_id = %job_id, error = %e, "Job execution failed");
            }

            {
                let mut state = scheduler.inner.state.lock().await;
                state.finish(&job_id);
            }

            // Debounced re-drain so queued work keeps flowing without a
            // busy loop.
            let more = scheduler.inner.state.lock().await.queued() > 0;
            if more {
                tokio::time::sleep(std::time::Duration::from_millis(REDISPATCH_DELAY_MS)).await;
                scheduler.dispatch().await;
            }
        });
    }

    /// Execute a job's phase pipeline and persist the outcome.
    ///
    /// Store failures route through the retry policy; domain failures (no
    /// content, unresolved conflicts, collaborator errors) land in the
    /// report's error list instead.
    pub async fn execute_job(&self, job_id: &str) -> Result<ExecutionReport> {
        match self.try_execute(job_id).await {
            Ok(report) => Ok(report),
            Err(err) => {
                match &err {
                    // Jobs in the wrong state are not retried; there is
                    // nothing to back off from.
                    SchedulerError::JobNotFound(_) | SchedulerError::NotExecutable { .. } => {}
                    _ => self.handle_failure(job_id, &err).await,
                }
                Err(err)
            }
        }
    }

    async fn try_execute(&self, job_id: &str) -> Result<ExecutionReport> {
        let mut job = self
            .inner
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;

        if !job.status.is_executable() {
            return Err(SchedulerError::NotExecutable {
                id: job.id,
                status: job.status,
            });
        }

        let now = Utc::now();
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.updated_at = now;
        self.inner.store.put_job(&job).await?;

        info!(
            job_id = %job.id,
            group_id = job.group_id,
            account_id = job.account_id,
            kind = ?job.kind,
            "Starting maintenance execution"
        );

        let outcome = self.run_pipeline(&mut job).await?;

        if outcome.postponed {
            self.inner.metrics.job_postponed();
            return Ok(outcome.report);
        }

        let now = Utc::now();
        job.status = if outcome.report.success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        job.completed_at = Some(now);
        job.updated_at = now;
        job.result = Some(outcome.report.clone());
        self.inner.store.put_job(&job).await?;

        if outcome.report.success {
            self.inner.metrics.job_completed();
        } else {
            self.inner.metrics.job_failed();
        }

        info!(
            job_id = %job.id,
            success = outcome.report.success,
            content_updated = outcome.report.content_updated,
            positions_changed = outcome.report.positions_changed,
            "Maintenance execution completed"
        );

        Ok(outcome.report)
    }

    /// Retry bookkeeping: exponential backoff until retries are exhausted,
    /// then a terminal failure.
    async fn handle_failure(&self, job_id: &str, err: &SchedulerError) {
        let mut job = match self.inner.store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                error!(job_id, error = %e, "Failed to load job for retry handling");
                return;
            }
        };

        let now = Utc::now();

        if job.retry_count < job.max_retries {
            // Backoff exponent uses the pre-increment retry count.
            let delay_ms = self.inner.config.retry_delay_ms * 2u64.pow(job.retry_count);
            job.status = JobStatus::Retrying;
            job.retry_count += 1;
            job.scheduled_for = now + Duration::milliseconds(delay_ms as i64);
            job.last_error = Some(err.to_string());
            job.updated_at = now;

            info!(
                job_id,
                retry_count = job.retry_count,
                retry_at = %job.scheduled_for,
                "Job scheduled for retry"
            );
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.last_error = Some(err.to_string());
            job.updated_at = now;
            self.inner.metrics.job_failed();

            warn!(job_id, retry_count = job.retry_count, "Job retries exhausted");
        }

        if let Err(e) = self.inner.store.put_job(&job).await {
            error!(job_id, error = %e, "Failed to persist retry state");
        }
    }

    /// One health-monitoring pass: fail stuck jobs, then re-enqueue overdue
    /// pending jobs, due retries, and due postponements. Re-enqueueing is
    /// idempotent against the queue and the in-flight set.
    pub async fn run_health_check(&self) -> Result<HealthReport> {
        let now = Utc::now();
        let mut report = HealthReport::default();

        // Stuck: running past the job timeout. Marked failed post-hoc; the
        // task itself is not cancelled.
        let timeout = Duration::milliseconds(self.inner.config.job_timeout_ms as i64);
        let stuck = self
            .inner
            .store
            .find_jobs(&JobFilter {
                statuses: vec![JobStatus::Running],
                started_before: Some(now - timeout),
                ..JobFilter::default()
            })
            .await?;

        for mut job in stuck {
            warn!(job_id = %job.id, "Stuck job detected");
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.last_error = Some("job timeout".to_string());
            job.updated_at = now;
            self.inner.store.put_job(&job).await?;
            self.inner.metrics.job_failed();
            report.stuck_failed += 1;
        }

        // Overdue: pending past the grace period.
        let overdue = self
            .inner
            .store
            .find_jobs(&JobFilter {
                statuses: vec![JobStatus::Pending],
                scheduled_before: Some(now - Duration::minutes(OVERDUE_GRACE_MINUTES)),
                ..JobFilter::default()
            })
            .await?;

        for job in &overdue {
            self.enqueue_job(job).await;
            report.requeued += 1;
        }

        // Retries whose backoff has elapsed.
        let retrying = self
            .inner
            .store
            .find_jobs(&JobFilter {
                statuses: vec![JobStatus::Retrying],
                scheduled_before: Some(now),
                ..JobFilter::default()
            })
            .await?;

        for job in &retrying {
            self.enqueue_job(job).await;
            report.requeued += 1;
        }

        // Postponed jobs whose delay has elapsed go back to pending.
        let postponed = self
            .inner
            .store
            .find_jobs(&JobFilter {
                statuses: vec![JobStatus::Postponed],
                scheduled_before: Some(now),
                ..JobFilter::default()
            })
            .await?;

        for mut job in postponed {
            job.status = JobStatus::Pending;
            job.updated_at = now;
            self.inner.store.put_job(&job).await?;
            self.enqueue_job(&job).await;
            report.requeued += 1;
        }

        let state = self.inner.state.lock().await;
        debug!(
            active_jobs = state.active(),
            queued_jobs = state.queued(),
            stuck = report.stuck_failed,
            requeued = report.requeued,
            "Health check completed"
        );

        Ok(report)
    }

    /// Live queue gauges plus today's totals from the store.
    pub async fn status(&self) -> Result<AutomationStatus> {
        let (active_jobs, queued_jobs) = {
            let state = self.inner.state.lock().await;
            (state.active(), state.queued())
        };

        let today_start = Utc::now()
            .date_naive()
            .and_time(chrono::NaiveTime::MIN)
            .and_utc();

        let todays = self
            .inner
            .store
            .find_jobs(&JobFilter {
                created_after: Some(today_start),
                ..JobFilter::default()
            })
            .await?;

        let total = todays.len();
        let completed = todays
            .iter()
            .filter(|job| job.status == JobStatus::Completed)
            .count();

        Ok(AutomationStatus {
            is_running: self.inner.accepting.load(Ordering::SeqCst),
            active_jobs,
            queued_jobs,
            total_jobs_today: total,
            success_rate: if total > 0 {
                completed as f64 / total as f64
            } else {
                0.0
            },
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Stop accepting dispatch cycles and wait for in-flight jobs to drain,
    /// up to the configured timeout. Leftover jobs are logged, not failed.
    pub async fn shutdown(&self) {
        info!("Shutting down maintenance scheduler");
        self.inner.accepting.store(false, Ordering::SeqCst);

        for handle in self.inner.loops.lock().await.drain(..) {
            handle.abort();
        }

        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_millis(self.inner.config.shutdown_timeout_ms);

        loop {
            let active = self.inner.state.lock().await.active();
            if active == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(active, "Shutdown timeout with active jobs remaining");
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }

        info!("Maintenance scheduler shutdown complete");
    }
}
