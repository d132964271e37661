//! Persistence seam consumed by the scheduler and conflict detector.
//!
//! The core never deletes jobs; retention is a store concern. Two
//! implementations ship with the crate: [`MemoryStore`] for tests and
//! embedded use, and [`FjallStore`] for durable single-node deployments.

mod fjall;
mod memory;

pub use self::fjall::FjallStore;
pub use self::memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    AccountId, ContentCandidate, ContentGroup, ContentId, GroupId, JobStatus, MaintenanceJob,
    Sprint,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fjall error: {0}")]
    Fjall(#[from] ::fjall::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("group not found: {0}")]
    GroupNotFound(GroupId),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Query filter for [`Store::find_jobs`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub statuses: Vec<JobStatus>,
    pub account_id: Option<AccountId>,
    pub scheduled_before: Option<DateTime<Utc>>,
    pub scheduled_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
}

impl JobFilter {
    pub fn with_statuses(statuses: &[JobStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn matches(&self, job: &MaintenanceJob) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&job.status) {
            return false;
        }
        if let Some(account_id) = self.account_id {
            if job.account_id != account_id {
                return false;
            }
        }
        if let Some(before) = self.scheduled_before {
            if job.scheduled_for >= before {
                return false;
            }
        }
        if let Some(after) = self.scheduled_after {
            if job.scheduled_for <= after {
                return false;
            }
        }
        if let Some(before) = self.started_before {
            match job.started_at {
                Some(started) if started < before => {}
                _ => return false,
            }
        }
        if let Some(after) = self.created_after {
            if job.created_at < after {
                return false;
            }
        }
        true
    }
}

/// Retrieval-level filter for [`ContentCatalog::list_content_for_group`].
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub uploaded_after: Option<DateTime<Utc>>,
    pub exclude_ids: Vec<ContentId>,
    pub min_quality: Option<f64>,
}

impl ContentFilter {
    pub fn matches(&self, item: &ContentCandidate) -> bool {
        if let Some(cutoff) = self.uploaded_after {
            if item.uploaded_at < cutoff {
                return false;
            }
        }
        if self.exclude_ids.contains(&item.id) {
            return false;
        }
        if let Some(min) = self.min_quality {
            if item.base_quality < min {
                return false;
            }
        }
        true
    }
}

/// CRUD and query operations the core depends on.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put_job(&self, job: &MaintenanceJob) -> Result<()>;

    async fn get_job(&self, id: &str) -> Result<Option<MaintenanceJob>>;

    async fn find_jobs(&self, filter: &JobFilter) -> Result<Vec<MaintenanceJob>>;

    async fn put_group(&self, group: &ContentGroup) -> Result<()>;

    async fn get_group(&self, id: GroupId) -> Result<Option<ContentGroup>>;

    async fn find_groups_by_ids(&self, ids: &[GroupId]) -> Result<Vec<ContentGroup>>;

    /// Active groups on `account_id` occupying `position`, excluding `exclude`.
    async fn find_groups_at_position(
        &self,
        account_id: AccountId,
        position: u32,
        exclude: GroupId,
    ) -> Result<Vec<ContentGroup>>;

    async fn put_sprint(&self, sprint: &Sprint) -> Result<()>;

    /// Active sprints on `account_id` whose `[starts_at, ends_at]` interval
    /// intersects `[from, to]`.
    async fn find_overlapping_sprints(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sprint>>;
}

/// Content lookup seam consumed by the selector.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn list_content_for_group(
        &self,
        group_id: GroupId,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentCandidate>>;

    async fn put_content(&self, item: &ContentCandidate) -> Result<()>;
}
