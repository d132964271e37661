//! Pass-through collaborator implementations.

use async_trait::async_trait;
use tracing::debug;

use super::{
    CollaboratorError, ContentUpdateOutcome, ContentUpdater, MaintenanceMetrics,
    PerformanceRecorder, PositionManager, PositionUpdateOutcome,
};
use crate::model::{AccountId, ContentId, GroupId};

/// Acknowledges every content swap without touching the platform.
#[derive(Debug, Default)]
pub struct NoopContentUpdater;

#[async_trait]
impl ContentUpdater for NoopContentUpdater {
    async fn replace_group_content(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        content_ids: &[ContentId],
    ) -> ContentUpdateOutcome {
        debug!(group_id, account_id, count = content_ids.len(), "Content swap acknowledged");
        ContentUpdateOutcome {
            updated: content_ids.len(),
            errors: Vec::new(),
        }
    }
}

/// Leaves positions untouched.
#[derive(Debug, Default)]
pub struct NoopPositionManager;

#[async_trait]
impl PositionManager for NoopPositionManager {
    async fn update_position_after_maintenance(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        current_position: u32,
    ) -> PositionUpdateOutcome {
        debug!(group_id, account_id, current_position, "Position update acknowledged");
        PositionUpdateOutcome::default()
    }
}

/// Drops performance metrics on the floor.
#[derive(Debug, Default)]
pub struct NoopPerformanceRecorder;

#[async_trait]
impl PerformanceRecorder for NoopPerformanceRecorder {
    async fn record_maintenance_performance(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        metrics: &MaintenanceMetrics,
    ) -> Result<(), CollaboratorError> {
        debug!(
            group_id,
            account_id,
            content_updated = metrics.content_updated,
            "Performance metrics recorded"
        );
        Ok(())
    }
}
