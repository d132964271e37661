//! External collaborator seams the pipeline delegates to.
//!
//! The scheduler core only ever sees these traits; the platform-facing
//! implementations (the ones that actually push content to the network)
//! live outside this crate. The no-op implementations here are used by the
//! server wiring and by tests.

mod noop;

pub use noop::{NoopContentUpdater, NoopPerformanceRecorder, NoopPositionManager};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AccountId, ContentId, GroupId};

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("position update failed: {0}")]
    PositionUpdate(String),

    #[error("performance recording failed: {0}")]
    PerformanceRecording(String),
}

/// Result of swapping a group's content set.
///
/// Partial failures are reported through `errors` rather than an `Err`;
/// the pipeline folds them into the job's error list.
#[derive(Debug, Clone, Default)]
pub struct ContentUpdateOutcome {
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Result of re-sequencing group positions after maintenance.
#[derive(Debug, Clone, Default)]
pub struct PositionUpdateOutcome {
    pub positions_changed: usize,
    pub errors: Vec<String>,
}

/// Metrics handed to the performance recorder after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceMetrics {
    pub content_updated: usize,
    pub conflicts_resolved: usize,
    pub executed_at: DateTime<Utc>,
}

/// Phase 3 collaborator: replaces the live content set of a group.
#[async_trait]
pub trait ContentUpdater: Send + Sync {
    async fn replace_group_content(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        content_ids: &[ContentId],
    ) -> ContentUpdateOutcome;
}

/// Phase 4 collaborator: re-sequences group display positions.
#[async_trait]
pub trait PositionManager: Send + Sync {
    async fn update_position_after_maintenance(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        current_position: u32,
    ) -> PositionUpdateOutcome;
}

/// Phase 5 collaborator: fire-and-forget performance bookkeeping.
/// Errors are logged by the caller and never fail the job.
#[async_trait]
pub trait PerformanceRecorder: Send + Sync {
    async fn record_maintenance_performance(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        metrics: &MaintenanceMetrics,
    ) -> Result<(), CollaboratorError>;
}
