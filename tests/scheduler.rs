//! Integration tests for the maintenance scheduler: dispatch, retry,
//! health checks, and the phase pipeline against an in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use rotabox::collaborators::{
    ContentUpdateOutcome, ContentUpdater, NoopContentUpdater, NoopPerformanceRecorder,
    NoopPositionManager,
};
use rotabox::config::{ConflictConfig, SchedulerConfig, SelectionConfig};
use rotabox::model::{
    AccountId, ContentCandidate, ContentGroup, ContentId, GroupId, JobKind, JobMetadata,
    JobStatus, MaintenanceJob, MediaKind, Sprint,
};
use rotabox::observability::Metrics;
use rotabox::scheduler::MaintenanceScheduler;
use rotabox::store::{
    ContentCatalog, JobFilter, MemoryStore, Result as StoreResult, Store, StoreError,
};

fn test_group(id: GroupId, account_id: AccountId) -> ContentGroup {
    ContentGroup {
        id,
        account_id,
        owner_id: 1,
        name: format!("group-{id}"),
        current_position: 5,
        is_active: true,
        maintenance_frequency_weeks: 2,
        maintenance_content_count: 3,
        next_maintenance_date: None,
        last_maintenance_date: None,
        blocks: vec![],
    }
}

fn test_content(id: ContentId, group_id: GroupId) -> ContentCandidate {
    ContentCandidate {
        id,
        group_id,
        kind: MediaKind::Image,
        uploaded_at: Utc::now() - Duration::days(5),
        last_used_at: None,
        usage_count: 0,
        base_quality: 8.0,
        computed_score: 0.0,
        mood: None,
        location: None,
        seasonal_months: vec![],
        performance: None,
    }
}

async fn seed_group_with_content(store: &Arc<MemoryStore>, group_id: GroupId, account_id: AccountId) {
    store.put_group(&test_group(group_id, account_id)).await.unwrap();
    for i in 0..5 {
        store
            .put_content(&test_content(group_id * 100 + i, group_id))
            .await
            .unwrap();
    }
}

fn build_scheduler(
    store: Arc<MemoryStore>,
    config: SchedulerConfig,
    conflict: ConflictConfig,
) -> MaintenanceScheduler {
    MaintenanceScheduler::new(
        store.clone(),
        store,
        Arc::new(NoopContentUpdater),
        Arc::new(NoopPositionManager),
        Arc::new(NoopPerformanceRecorder),
        config,
        conflict,
        SelectionConfig::default(),
        Arc::new(Metrics::new()),
    )
}

async fn wait_for_status(store: &Arc<MemoryStore>, job_id: &str, status: JobStatus) -> MaintenanceJob {
    for _ in 0..200 {
        if let Some(job) = store.get_job(job_id).await.unwrap() {
            if job.status == status {
                return job;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    panic!("job {job_id} never reached {status:?}");
}

#[tokio::test]
async fn test_schedule_validates_priority_and_group() {
    let store = Arc::new(MemoryStore::new());
    seed_group_with_content(&store, 1, 1).await;
    let scheduler = build_scheduler(store, SchedulerConfig::default(), ConflictConfig::default());

    let err = scheduler
        .schedule_maintenance(1, 1, 1, Utc::now(), JobKind::Scheduled, 0, JobMetadata::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("priority"));

    let err = scheduler
        .schedule_maintenance(99, 1, 1, Utc::now(), JobKind::Scheduled, 1, JobMetadata::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown group"));
}

#[tokio::test]
async fn test_pipeline_happy_path() {
    let store = Arc::new(MemoryStore::new());
    seed_group_with_content(&store, 1, 1).await;
    let scheduler = build_scheduler(
        store.clone(),
        SchedulerConfig::default(),
        ConflictConfig::default(),
    );

    let job_id = scheduler
        .schedule_maintenance(
            1,
            1,
            1,
            Utc::now() - Duration::seconds(1),
            JobKind::Scheduled,
            1,
            JobMetadata::default(),
        )
        .await
        .unwrap();

    let job = wait_for_status(&store, &job_id, JobStatus::Completed).await;
    let report = job.result.expect("completed job must carry a result");
    assert!(report.success);
    assert_eq!(report.content_updated, 3);
    assert!(report.next_scheduled_at.is_some());

    // The group was stamped and a follow-up job scheduled.
    let group = store.get_group(1).await.unwrap().unwrap();
    assert!(group.next_maintenance_date.is_some());
    assert!(group.last_maintenance_date.is_some());

    let pending = store
        .find_jobs(&JobFilter::with_statuses(&[JobStatus::Pending]))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, JobKind::Scheduled);
    assert!(pending[0].scheduled_for > Utc::now());
}

#[tokio::test]
async fn test_no_content_is_terminal_not_retried() {
    let store = Arc::new(MemoryStore::new());
    // Group exists but owns no content at all.
    store.put_group(&test_group(1, 1)).await.unwrap();
    let scheduler = build_scheduler(
        store.clone(),
        SchedulerConfig::default(),
        ConflictConfig::default(),
    );

    let report = scheduler
        .execute_immediate(1, 1, 1, true, JobMetadata::default())
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.errors.iter().any(|e| e.contains("no suitable content")));

    let job = store.get_job(&report.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
}

/// Content updater that tracks the maximum number of concurrent calls.
struct ConcurrencyProbe {
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

impl ConcurrencyProbe {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ContentUpdater for ConcurrencyProbe {
    async fn replace_group_content(
        &self,
        _group_id: GroupId,
        _account_id: AccountId,
        content_ids: &[ContentId],
    ) -> ContentUpdateOutcome {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        ContentUpdateOutcome {
            updated: content_ids.len(),
            errors: Vec::new(),
        }
    }
}

#[tokio::test]
async fn test_concurrency_cap_is_never_exceeded() {
    let store = Arc::new(MemoryStore::new());
    for group_id in 1..=6 {
        seed_group_with_content(&store, group_id, 1).await;
    }

    let probe = Arc::new(ConcurrencyProbe::new());
    let scheduler = MaintenanceScheduler::new(
        store.clone(),
        store.clone(),
        probe.clone(),
        Arc::new(NoopPositionManager),
        Arc::new(NoopPerformanceRecorder),
        SchedulerConfig {
            max_concurrent_jobs: 2,
            ..SchedulerConfig::default()
        },
        ConflictConfig::default(),
        SelectionConfig::default(),
        Arc::new(Metrics::new()),
    );

    let mut job_ids = Vec::new();
    for group_id in 1..=6 {
        let job_id = scheduler
            .schedule_maintenance(
                group_id,
                1,
                1,
                Utc::now() - Duration::seconds(1),
                JobKind::Scheduled,
                1,
                JobMetadata::default(),
            )
            .await
            .unwrap();
        job_ids.push(job_id);
    }

    for job_id in &job_ids {
        wait_for_status(&store, job_id, JobStatus::Completed).await;
    }

    assert!(
        probe.max_seen.load(Ordering::SeqCst) <= 2,
        "concurrency cap exceeded: {}",
        probe.max_seen.load(Ordering::SeqCst)
    );
}

/// Store wrapper that injects I/O failures into group lookups on demand.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    failing: AtomicBool,
}

#[async_trait]
impl Store for FlakyStore {
    async fn put_job(&self, job: &MaintenanceJob) -> StoreResult<()> {
        self.inner.put_job(job).await
    }

    async fn get_job(&self, id: &str) -> StoreResult<Option<MaintenanceJob>> {
        self.inner.get_job(id).await
    }

    async fn find_jobs(&self, filter: &JobFilter) -> StoreResult<Vec<MaintenanceJob>> {
        self.inner.find_jobs(filter).await
    }

    async fn put_group(&self, group: &ContentGroup) -> StoreResult<()> {
        self.inner.put_group(group).await
    }

    async fn get_group(&self, id: GroupId) -> StoreResult<Option<ContentGroup>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("injected failure")));
        }
        self.inner.get_group(id).await
    }

    async fn find_groups_by_ids(&self, ids: &[GroupId]) -> StoreResult<Vec<ContentGroup>> {
        self.inner.find_groups_by_ids(ids).await
    }

    async fn find_groups_at_position(
        &self,
        account_id: AccountId,
        position: u32,
        exclude: GroupId,
    ) -> StoreResult<Vec<ContentGroup>> {
        self.inner.find_groups_at_position(account_id, position, exclude).await
    }

    async fn put_sprint(&self, sprint: &Sprint) -> StoreResult<()> {
        self.inner.put_sprint(sprint).await
    }

    async fn find_overlapping_sprints(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Sprint>> {
        self.inner.find_overlapping_sprints(account_id, from, to).await
    }
}

#[tokio::test]
async fn test_retry_exhaustion_ends_in_terminal_failure() {
    let inner = Arc::new(MemoryStore::new());
    seed_group_with_content(&inner, 1, 1).await;
    let flaky = Arc::new(FlakyStore {
        inner: inner.clone(),
        failing: AtomicBool::new(false),
    });

    let scheduler = MaintenanceScheduler::new(
        flaky.clone(),
        inner.clone(),
        Arc::new(NoopContentUpdater),
        Arc::new(NoopPositionManager),
        Arc::new(NoopPerformanceRecorder),
        SchedulerConfig {
            retry_delay_ms: 10,
            ..SchedulerConfig::default()
        },
        ConflictConfig::default(),
        SelectionConfig::default(),
        Arc::new(Metrics::new()),
    );

    // Future-dated so nothing dispatches on its own.
    let job_id = scheduler
        .schedule_maintenance(
            1,
            1,
            1,
            Utc::now() + Duration::hours(1),
            JobKind::Scheduled,
            1,
            JobMetadata::default(),
        )
        .await
        .unwrap();

    flaky.failing.store(true, Ordering::SeqCst);

    // max_retries failures flip the job to retrying with backoff...
    for attempt in 1..=3u32 {
        scheduler.execute_job(&job_id).await.unwrap_err();
        let job = inner.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Retrying);
        assert_eq!(job.retry_count, attempt);
    }

    // ...and one more exhausts them.
    scheduler.execute_job(&job_id).await.unwrap_err();
    let job = inner.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, job.max_retries);
    assert!(job.last_error.unwrap().contains("injected failure"));
}

#[tokio::test]
async fn test_health_requeue_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    seed_group_with_content(&store, 1, 1).await;

    // Zero concurrency: jobs stay queued, never popped.
    let scheduler = build_scheduler(
        store.clone(),
        SchedulerConfig {
            max_concurrent_jobs: 0,
            ..SchedulerConfig::default()
        },
        ConflictConfig::default(),
    );

    // Ten minutes overdue.
    let job_id = scheduler
        .schedule_maintenance(
            1,
            1,
            1,
            Utc::now() - Duration::minutes(10),
            JobKind::Scheduled,
            1,
            JobMetadata::default(),
        )
        .await
        .unwrap();

    let status = scheduler.status().await.unwrap();
    assert_eq!(status.queued_jobs, 1);

    // Two health passes must not duplicate the queued job.
    scheduler.run_health_check().await.unwrap();
    scheduler.run_health_check().await.unwrap();

    let status = scheduler.status().await.unwrap();
    assert_eq!(status.queued_jobs, 1);

    let job = store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_health_check_fails_stuck_jobs() {
    let store = Arc::new(MemoryStore::new());
    seed_group_with_content(&store, 1, 1).await;
    let scheduler = build_scheduler(
        store.clone(),
        SchedulerConfig::default(),
        ConflictConfig::default(),
    );

    // Simulate a job that has been running past the timeout.
    let now = Utc::now();
    let stuck = MaintenanceJob {
        id: "stuck-job".to_string(),
        group_id: 1,
        account_id: 1,
        actor_id: 1,
        kind: JobKind::Scheduled,
        status: JobStatus::Running,
        scheduled_for: now - Duration::minutes(30),
        started_at: Some(now - Duration::minutes(20)),
        completed_at: None,
        priority: 1,
        retry_count: 0,
        max_retries: 3,
        metadata: JobMetadata::default(),
        result: None,
        last_error: None,
        created_at: now - Duration::minutes(30),
        updated_at: now - Duration::minutes(20),
    };
    store.put_job(&stuck).await.unwrap();

    let report = scheduler.run_health_check().await.unwrap();
    assert_eq!(report.stuck_failed, 1);

    let job = store.get_job("stuck-job").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some("job timeout"));
}

#[tokio::test]
async fn test_unresolved_conflicts_postpone_scheduled_jobs() {
    let store = Arc::new(MemoryStore::new());
    seed_group_with_content(&store, 1, 1).await;

    // Critical sprint covering the entire lookahead window: reschedule
    // finds no safe slot and postponement is barred at critical severity.
    let now = Utc::now();
    store
        .put_sprint(&Sprint {
            id: 1,
            account_id: 1,
            sprint_type: "emergency".to_string(),
            priority: 9,
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::days(30),
            is_active: true,
        })
        .await
        .unwrap();

    let scheduler = build_scheduler(
        store.clone(),
        SchedulerConfig::default(),
        ConflictConfig {
            lookahead_days: 1,
            ..ConflictConfig::default()
        },
    );

    let job_id = scheduler
        .schedule_maintenance(
            1,
            1,
            1,
            now - Duration::seconds(1),
            JobKind::Scheduled,
            1,
            JobMetadata::default(),
        )
        .await
        .unwrap();

    let job = wait_for_status(&store, &job_id, JobStatus::Postponed).await;
    assert_eq!(job.metadata.postpone_reason.as_deref(), Some("conflicts detected"));
    assert!(job.metadata.original_schedule.is_some());
    assert!(job.scheduled_for > now + Duration::minutes(55));
}

#[tokio::test]
async fn test_emergency_pushes_through_unresolved_conflicts() {
    let store = Arc::new(MemoryStore::new());
    seed_group_with_content(&store, 1, 1).await;

    let now = Utc::now();
    store
        .put_sprint(&Sprint {
            id: 1,
            account_id: 1,
            sprint_type: "emergency".to_string(),
            priority: 9,
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::days(30),
            is_active: true,
        })
        .await
        .unwrap();

    let scheduler = build_scheduler(
        store.clone(),
        SchedulerConfig::default(),
        ConflictConfig {
            lookahead_days: 1,
            ..ConflictConfig::default()
        },
    );

    let report = scheduler
        .execute_immediate(1, 1, 1, false, JobMetadata::default())
        .await
        .unwrap();

    // The unresolved conflict is reported but later phases still ran.
    assert!(!report.success);
    assert!(report.errors.iter().any(|e| e.contains("unable to resolve")));
    assert_eq!(report.content_updated, 3);

    let job = store.get_job(&report.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

/// Store wrapper that counts sprint-overlap queries, the entry point of
/// conflict detection.
struct DetectionSpy {
    inner: Arc<MemoryStore>,
    sprint_queries: AtomicUsize,
}

#[async_trait]
impl Store for DetectionSpy {
    async fn put_job(&self, job: &MaintenanceJob) -> StoreResult<()> {
        self.inner.put_job(job).await
    }

    async fn get_job(&self, id: &str) -> StoreResult<Option<MaintenanceJob>> {
        self.inner.get_job(id).await
    }

    async fn find_jobs(&self, filter: &JobFilter) -> StoreResult<Vec<MaintenanceJob>> {
        self.inner.find_jobs(filter).await
    }

    async fn put_group(&self, group: &ContentGroup) -> StoreResult<()> {
        self.inner.put_group(group).await
    }

    async fn get_group(&self, id: GroupId) -> StoreResult<Option<ContentGroup>> {
        self.inner.get_group(id).await
    }

    async fn find_groups_by_ids(&self, ids: &[GroupId]) -> StoreResult<Vec<ContentGroup>> {
        self.inner.find_groups_by_ids(ids).await
    }

    async fn find_groups_at_position(
        &self,
        account_id: AccountId,
        position: u32,
        exclude: GroupId,
    ) -> StoreResult<Vec<ContentGroup>> {
        self.inner.find_groups_at_position(account_id, position, exclude).await
    }

    async fn put_sprint(&self, sprint: &Sprint) -> StoreResult<()> {
        self.inner.put_sprint(sprint).await
    }

    async fn find_overlapping_sprints(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Sprint>> {
        self.sprint_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.find_overlapping_sprints(account_id, from, to).await
    }
}

#[tokio::test]
async fn test_emergency_override_skips_conflict_detection() {
    let inner = Arc::new(MemoryStore::new());
    seed_group_with_content(&inner, 1, 1).await;
    let spy = Arc::new(DetectionSpy {
        inner: inner.clone(),
        sprint_queries: AtomicUsize::new(0),
    });

    let scheduler = MaintenanceScheduler::new(
        spy.clone(),
        inner.clone(),
        Arc::new(NoopContentUpdater),
        Arc::new(NoopPositionManager),
        Arc::new(NoopPerformanceRecorder),
        SchedulerConfig::default(),
        ConflictConfig::default(),
        SelectionConfig::default(),
        Arc::new(Metrics::new()),
    );

    let report = scheduler
        .execute_immediate(1, 1, 1, true, JobMetadata::default())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(
        spy.sprint_queries.load(Ordering::SeqCst),
        0,
        "conflict detection must never run with override_conflicts"
    );

    // Without the override, detection runs.
    let report = scheduler
        .execute_immediate(1, 1, 1, false, JobMetadata::default())
        .await
        .unwrap();
    assert!(report.success);
    assert!(spy.sprint_queries.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn test_emergency_override_gate() {
    let store = Arc::new(MemoryStore::new());
    seed_group_with_content(&store, 1, 1).await;
    let scheduler = build_scheduler(
        store,
        SchedulerConfig {
            emergency_override_enabled: false,
            ..SchedulerConfig::default()
        },
        ConflictConfig::default(),
    );

    let err = scheduler
        .execute_immediate(1, 1, 1, true, JobMetadata::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("disabled"));
}

#[tokio::test]
async fn test_shutdown_reports_not_running() {
    let store = Arc::new(MemoryStore::new());
    seed_group_with_content(&store, 1, 1).await;
    let scheduler = build_scheduler(
        store,
        SchedulerConfig::default(),
        ConflictConfig::default(),
    );
    scheduler.start().await;

    assert!(scheduler.status().await.unwrap().is_running);
    scheduler.shutdown().await;
    assert!(!scheduler.status().await.unwrap().is_running);
}
