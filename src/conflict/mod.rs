//! Scheduling-conflict detection and auto-resolution.
//!
//! Detection runs four independent rules (sprint overlap, blocked groups,
//! position collision, account saturation) and finishes with a severity
//! escalation pass. Conflicts are built fresh each pass and handed straight
//! to the resolver.

mod resolution;

pub use resolution::{ConflictResolver, ResolutionOutcome, StrategyKind};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ConflictConfig;
use crate::model::{
    AccountId, Conflict, ConflictDetails, ConflictKind, GroupId, JobStatus, Severity, Sprint,
};
use crate::store::{JobFilter, Result, Store};

/// Default length of a maintenance window in minutes.
pub const DEFAULT_MAINTENANCE_MINUTES: i64 = 30;

/// Maximum pending/running jobs per account inside the saturation window
/// before a saturation conflict is raised.
const SATURATION_ALLOWANCE: usize = 2;

#[derive(Clone)]
pub struct ConflictDetector {
    store: Arc<dyn Store>,
    config: ConflictConfig,
}

impl ConflictDetector {
    pub fn new(store: Arc<dyn Store>, config: ConflictConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ConflictConfig {
        &self.config
    }

    /// Detect conflicts for maintaining `group_id` at `scheduled_time`.
    ///
    /// Store failures propagate; "no conflicts" is an empty Vec, never an
    /// error. A missing group skips the group-dependent rules; the
    /// safe-window probe relies on this by passing a sentinel group id.
    pub async fn detect(
        &self,
        group_id: GroupId,
        account_id: AccountId,
        scheduled_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<Vec<Conflict>> {
        let end_time = scheduled_time + Duration::minutes(duration_minutes);

        debug!(group_id, account_id, %scheduled_time, duration_minutes, "Starting conflict detection");

        let mut conflicts = Vec::new();

        conflicts.extend(
            self.sprint_overlaps(account_id, scheduled_time, end_time)
                .await?,
        );

        let group = self.store.get_group(group_id).await?;
        if let Some(group) = &group {
            conflicts.extend(
                self.blocked_group_conflicts(group, account_id, scheduled_time, end_time)
                    .await?,
            );
            conflicts.extend(self.position_collisions(group, account_id).await?);
        }

        conflicts.extend(
            self.saturation(account_id, scheduled_time, end_time)
                .await?,
        );

        escalate(&mut conflicts, group_id, account_id);

        if !conflicts.is_empty() {
            info!(
                group_id,
                account_id,
                total = conflicts.len(),
                "Conflict detection completed"
            );
        }

        Ok(conflicts)
    }

    /// Active sprints on the account whose interval intersects the window.
    async fn sprint_overlaps(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Conflict>> {
        let sprints = self
            .store
            .find_overlapping_sprints(account_id, start, end)
            .await?;

        Ok(sprints
            .into_iter()
            .map(|sprint| Conflict {
                id: Uuid::now_v7().to_string(),
                kind: ConflictKind::SprintOverlap,
                severity: sprint_severity(&sprint),
                group_id: 0, // stamped by the escalation pass
                account_id,
                conflicting_id: Some(sprint.id),
                detected_at: Utc::now(),
                details: ConflictDetails::Sprint {
                    sprint_id: sprint.id,
                    sprint_type: sprint.sprint_type,
                    starts_at: sprint.starts_at,
                    ends_at: sprint.ends_at,
                    priority: sprint.priority,
                },
            })
            .collect())
    }

    /// Groups this group explicitly blocks whose own maintenance lands
    /// within an hour of the window.
    async fn blocked_group_conflicts(
        &self,
        group: &crate::model::ContentGroup,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Conflict>> {
        if group.blocks.is_empty() {
            return Ok(Vec::new());
        }

        let window_start = start - Duration::hours(1);
        let window_end = end + Duration::hours(1);

        let blocked = self.store.find_groups_by_ids(&group.blocks).await?;

        Ok(blocked
            .into_iter()
            .filter(|g| {
                g.account_id == account_id
                    && g.next_maintenance_date
                        .map(|next| next >= window_start && next <= window_end)
                        .unwrap_or(false)
            })
            .map(|g| Conflict {
                id: Uuid::now_v7().to_string(),
                kind: ConflictKind::BlockedGroup,
                severity: Severity::Medium,
                group_id: group.id,
                account_id,
                conflicting_id: Some(g.id),
                detected_at: Utc::now(),
                details: ConflictDetails::BlockedGroup {
                    group_id: g.id,
                    name: g.name,
                    next_maintenance: g.next_maintenance_date,
                },
            })
            .collect())
    }

    /// Other active groups sharing this group's display position.
    async fn position_collisions(
        &self,
        group: &crate::model::ContentGroup,
        account_id: AccountId,
    ) -> Result<Vec<Conflict>> {
        let colliding = self
            .store
            .find_groups_at_position(account_id, group.current_position, group.id)
            .await?;

        if colliding.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![Conflict {
            id: Uuid::now_v7().to_string(),
            kind: ConflictKind::PositionCollision,
            severity: Severity::High,
            group_id: group.id,
            account_id,
            conflicting_id: Some(colliding[0].id),
            detected_at: Utc::now(),
            details: ConflictDetails::Position {
                position: group.current_position,
                group_ids: colliding.iter().map(|g| g.id).collect(),
            },
        }])
    }

    /// More than [`SATURATION_ALLOWANCE`] pending/running jobs around the
    /// window saturate the account.
    async fn saturation(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Conflict>> {
        let filter = JobFilter {
            statuses: vec![JobStatus::Pending, JobStatus::Running],
            account_id: Some(account_id),
            scheduled_after: Some(start - Duration::minutes(30)),
            scheduled_before: Some(end + Duration::minutes(30)),
            ..JobFilter::default()
        };

        let concurrent = self.store.find_jobs(&filter).await?;

        if concurrent.len() <= SATURATION_ALLOWANCE {
            return Ok(Vec::new());
        }

        Ok(vec![Conflict {
            id: Uuid::now_v7().to_string(),
            kind: ConflictKind::Saturation,
            severity: Severity::Medium,
            group_id: 0, // stamped by the escalation pass
            account_id,
            conflicting_id: Some(account_id),
            detected_at: Utc::now(),
            details: ConflictDetails::Saturation {
                job_count: concurrent.len(),
                job_ids: concurrent.into_iter().map(|j| j.id).collect(),
            },
        }])
    }
}

/// Severity of a sprint overlap before escalation.
fn sprint_severity(sprint: &Sprint) -> Severity {
    let sprint_type = sprint.sprint_type.to_lowercase();

    if sprint.priority >= 9 || sprint_type.contains("emergency") {
        Severity::Critical
    } else if sprint.priority >= 7 || sprint_type.contains("vacation") {
        Severity::High
    } else if sprint.priority >= 5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Stamp every conflict with the caller's group/account and escalate
/// severities using rule-specific context.
fn escalate(conflicts: &mut [Conflict], group_id: GroupId, account_id: AccountId) {
    for conflict in conflicts.iter_mut() {
        conflict.group_id = group_id;
        conflict.account_id = account_id;

        match &conflict.details {
            ConflictDetails::Sprint { priority, .. } => {
                if *priority > 8 {
                    conflict.severity = Severity::Critical;
                } else if *priority > 5 {
                    conflict.severity = conflict.severity.max(Severity::High);
                }
            }
            ConflictDetails::Position { position, .. } => {
                // Top three display slots are always critical.
                if *position <= 3 {
                    conflict.severity = Severity::Critical;
                }
            }
            _ => {}
        }
    }
}
