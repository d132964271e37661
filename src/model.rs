//! Domain types shared across the scheduler, conflict, and selection modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type GroupId = i64;
pub type AccountId = i64;
pub type ActorId = i64;
pub type ContentId = i64;
pub type SprintId = i64;

/// Lifecycle status of a maintenance job.
///
/// Terminal statuses (`Completed`, `Failed`, `Cancelled`) never transition
/// further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
    Postponed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Whether the dispatcher may pick this job up for execution.
    pub fn is_executable(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Retrying)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Scheduled,
    Emergency,
    Manual,
    Optimization,
    ConflictResolution,
}

/// Metadata attached to a job.
///
/// Known fields are typed; anything else a caller attaches survives
/// round-trips through the flattened `extra` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default)]
    pub override_conflicts: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postpone_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_schedule: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A unit of scheduled maintenance work against one group/account pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceJob {
    pub id: String,
    pub group_id: GroupId,
    pub account_id: AccountId,
    pub actor_id: ActorId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Higher priority is dequeued sooner. Must be >= 1.
    pub priority: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub metadata: JobMetadata,
    pub result: Option<ExecutionReport>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one pipeline execution for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub job_id: String,
    pub group_id: GroupId,
    pub account_id: AccountId,
    pub executed_at: DateTime<Utc>,
    pub content_updated: usize,
    pub positions_changed: usize,
    pub conflicts_resolved: usize,
    pub errors: Vec<String>,
    pub next_scheduled_at: Option<DateTime<Utc>>,
}

impl ExecutionReport {
    pub fn empty(job: &MaintenanceJob, executed_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            job_id: job.id.clone(),
            group_id: job.group_id,
            account_id: job.account_id,
            executed_at,
            content_updated: 0,
            positions_changed: 0,
            conflicts_resolved: 0,
            errors: Vec::new(),
            next_scheduled_at: None,
        }
    }
}

/// A highlight group: the externally-owned collection of content this
/// system rotates on a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentGroup {
    pub id: GroupId,
    pub account_id: AccountId,
    pub owner_id: ActorId,
    pub name: String,
    /// Display slot the group currently occupies on the account.
    pub current_position: u32,
    pub is_active: bool,
    pub maintenance_frequency_weeks: u32,
    /// Number of items swapped in per maintenance run.
    #[serde(default = "default_maintenance_content_count")]
    pub maintenance_content_count: usize,
    pub next_maintenance_date: Option<DateTime<Utc>>,
    pub last_maintenance_date: Option<DateTime<Utc>>,
    /// Groups whose maintenance this group explicitly blocks.
    #[serde(default)]
    pub blocks: Vec<GroupId>,
}

fn default_maintenance_content_count() -> usize {
    3
}

/// An externally-scheduled campaign that may overlap a maintenance window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: SprintId,
    pub account_id: AccountId,
    pub sprint_type: String,
    pub priority: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Ordinal conflict urgency. Ordering is derived from variant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    SprintOverlap,
    BlockedGroup,
    PositionCollision,
    Saturation,
}

/// Rule-specific context for a detected conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ConflictDetails {
    Sprint {
        sprint_id: SprintId,
        sprint_type: String,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        priority: i32,
    },
    BlockedGroup {
        group_id: GroupId,
        name: String,
        next_maintenance: Option<DateTime<Utc>>,
    },
    Position {
        position: u32,
        group_ids: Vec<GroupId>,
    },
    Saturation {
        job_count: usize,
        job_ids: Vec<String>,
    },
}

/// A detected scheduling hazard. Built fresh on every detection pass and
/// consumed immediately by the resolver; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub kind: ConflictKind,
    pub severity: Severity,
    pub group_id: GroupId,
    pub account_id: AccountId,
    pub conflicting_id: Option<i64>,
    pub detected_at: DateTime<Utc>,
    pub details: ConflictDetails,
}

/// Coarse media category of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub engagement_rate: f64,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

/// A piece of content eligible for selection into a group's rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentCandidate {
    pub id: ContentId,
    pub group_id: GroupId,
    pub kind: MediaKind,
    pub uploaded_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u32,
    /// Externally supplied quality rating, 0-10.
    pub base_quality: f64,
    /// Derived score, 0-10. Overwritten on every scoring pass.
    #[serde(default)]
    pub computed_score: f64,
    pub mood: Option<String>,
    pub location: Option<String>,
    /// Months (1-12) the item is relevant in; empty means always eligible.
    #[serde(default)]
    pub seasonal_months: Vec<u32>,
    pub performance: Option<PerformanceStats>,
}

/// Live scheduler gauges plus today's store-derived totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationStatus {
    pub is_running: bool,
    pub active_jobs: usize,
    pub queued_jobs: usize,
    pub total_jobs_today: usize,
    pub success_rate: f64,
}
