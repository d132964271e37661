//! Strategy-based conflict auto-resolution.
//!
//! Strategies are a closed set of tagged variants tried in descending
//! priority order; a strategy that errors is logged and the next one is
//! tried. Resolution is advisory: outcomes carry the proposed reschedule
//! time or position, and the scheduler decides what to do with unresolved
//! conflicts.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ConflictDetector, DEFAULT_MAINTENANCE_MINUTES};
use crate::config::ConflictConfig;
use crate::model::{AccountId, Conflict, ConflictDetails, ConflictKind, Severity};
use crate::store::{Result, Store};

/// Group id used when probing candidate windows; account-level rules still
/// run, group-dependent rules are skipped.
const PROBE_GROUP_ID: i64 = 0;

/// Position slots never exceed this bound during collision repair.
const MAX_POSITION: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RescheduleToSafeWindow,
    AdjustPositionSequence,
    PostponeMaintenance,
    StaggerConcurrentOperations,
}

impl StrategyKind {
    /// All strategies, in descending priority order.
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::RescheduleToSafeWindow,
        StrategyKind::AdjustPositionSequence,
        StrategyKind::PostponeMaintenance,
        StrategyKind::StaggerConcurrentOperations,
    ];

    pub fn priority(self) -> u8 {
        match self {
            StrategyKind::RescheduleToSafeWindow => 5,
            StrategyKind::AdjustPositionSequence => 4,
            StrategyKind::PostponeMaintenance => 3,
            StrategyKind::StaggerConcurrentOperations => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::RescheduleToSafeWindow => "reschedule_to_safe_window",
            StrategyKind::AdjustPositionSequence => "adjust_position_sequence",
            StrategyKind::PostponeMaintenance => "postpone_maintenance",
            StrategyKind::StaggerConcurrentOperations => "stagger_concurrent_operations",
        }
    }

    fn applies_to(self, conflict: &Conflict) -> bool {
        match self {
            StrategyKind::RescheduleToSafeWindow => matches!(
                conflict.kind,
                ConflictKind::SprintOverlap | ConflictKind::BlockedGroup
            ),
            StrategyKind::AdjustPositionSequence => {
                conflict.kind == ConflictKind::PositionCollision
            }
            StrategyKind::PostponeMaintenance => {
                conflict.kind == ConflictKind::SprintOverlap
                    && conflict.severity < Severity::Critical
            }
            StrategyKind::StaggerConcurrentOperations => {
                conflict.kind == ConflictKind::Saturation
            }
        }
    }
}

/// Outcome of one resolution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub conflict_id: String,
    pub resolved: bool,
    pub strategy: Option<StrategyKind>,
    pub actions: Vec<String>,
    pub errors: Vec<String>,
    pub rescheduled_to: Option<DateTime<Utc>>,
    pub new_position: Option<u32>,
}

impl ResolutionOutcome {
    fn unresolved(conflict_id: &str, error: &str) -> Self {
        Self {
            conflict_id: conflict_id.to_string(),
            resolved: false,
            strategy: None,
            actions: Vec::new(),
            errors: vec![error.to_string()],
            rescheduled_to: None,
            new_position: None,
        }
    }
}

pub struct ConflictResolver {
    store: Arc<dyn Store>,
    detector: ConflictDetector,
    config: ConflictConfig,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn Store>, detector: ConflictDetector) -> Self {
        let config = detector.config().clone();
        Self {
            store,
            detector,
            config,
        }
    }

    /// Attempt resolution for every conflict at or above the configured
    /// severity threshold. Conflicts below the threshold are skipped
    /// silently; disabled auto-resolution returns an empty Vec.
    pub async fn resolve_all(
        &self,
        conflicts: &[Conflict],
        now: DateTime<Utc>,
    ) -> Vec<ResolutionOutcome> {
        if !self.config.auto_resolution_enabled {
            info!("Auto-resolution disabled, skipping conflict resolution");
            return Vec::new();
        }

        let mut results = Vec::new();
        for conflict in conflicts {
            if conflict.severity < self.config.severity_threshold {
                debug!(
                    conflict_id = %conflict.id,
                    severity = ?conflict.severity,
                    threshold = ?self.config.severity_threshold,
                    "Skipping resolution below severity threshold"
                );
                continue;
            }
            results.push(self.resolve_one(conflict, now).await);
        }
        results
    }

    async fn resolve_one(&self, conflict: &Conflict, now: DateTime<Utc>) -> ResolutionOutcome {
        let mut applicable: Vec<StrategyKind> = StrategyKind::ALL
            .into_iter()
            .filter(|s| s.applies_to(conflict))
            .collect();
        applicable.sort_by_key(|s| std::cmp::Reverse(s.priority()));

        if applicable.is_empty() {
            return ResolutionOutcome::unresolved(
                &conflict.id,
                "no applicable resolution strategy found",
            );
        }

        for strategy in applicable {
            debug!(conflict_id = %conflict.id, strategy = strategy.as_str(), "Attempting conflict resolution");

            match self.apply(strategy, conflict, now).await {
                Ok(outcome) if outcome.resolved => {
                    info!(
                        conflict_id = %conflict.id,
                        strategy = strategy.as_str(),
                        actions = ?outcome.actions,
                        "Conflict resolved"
                    );
                    return outcome;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        conflict_id = %conflict.id,
                        strategy = strategy.as_str(),
                        error = %e,
                        "Resolution strategy failed"
                    );
                }
            }
        }

        ResolutionOutcome::unresolved(&conflict.id, "all resolution strategies failed")
    }

    async fn apply(
        &self,
        strategy: StrategyKind,
        conflict: &Conflict,
        now: DateTime<Utc>,
    ) -> Result<ResolutionOutcome> {
        let mut outcome = ResolutionOutcome {
            conflict_id: conflict.id.clone(),
            resolved: false,
            strategy: Some(strategy),
            actions: Vec::new(),
            errors: Vec::new(),
            rescheduled_to: None,
            new_position: None,
        };

        match strategy {
            StrategyKind::RescheduleToSafeWindow => {
                match self
                    .find_safe_window(conflict.account_id, now, DEFAULT_MAINTENANCE_MINUTES)
                    .await?
                {
                    Some(window) => {
                        outcome.resolved = true;
                        outcome.rescheduled_to = Some(window);
                        outcome
                            .actions
                            .push(format!("rescheduled to safe window: {}", window.to_rfc3339()));
                    }
                    None => {
                        outcome
                            .errors
                            .push("no safe window found within lookahead period".to_string());
                    }
                }
            }
            StrategyKind::AdjustPositionSequence => {
                let start = match &conflict.details {
                    ConflictDetails::Position { position, .. } => *position,
                    _ => 1,
                };
                let new_position = self.next_free_position(conflict.account_id, start).await?;
                outcome.resolved = true;
                outcome.new_position = Some(new_position);
                outcome
                    .actions
                    .push(format!("adjusted position to {new_position}"));
            }
            StrategyKind::PostponeMaintenance => {
                let hours = postpone_hours(conflict, now);
                outcome.resolved = true;
                outcome.rescheduled_to = Some(now + Duration::hours(hours));
                outcome
                    .actions
                    .push(format!("postponed maintenance by {hours} hours"));
            }
            StrategyKind::StaggerConcurrentOperations => {
                let stagger_minutes = 15;
                outcome.resolved = true;
                outcome.rescheduled_to = Some(now + Duration::minutes(stagger_minutes));
                outcome
                    .actions
                    .push(format!("staggered operation by {stagger_minutes} minutes"));
            }
        }

        Ok(outcome)
    }

    /// Probe hour-by-hour for the first slot with zero detected conflicts.
    ///
    /// A bounded loop, not recursion: at most `lookahead_days * 24` probes,
    /// each synchronously re-running detection.
    async fn find_safe_window(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<Option<DateTime<Utc>>> {
        let max_probes = i64::from(self.config.lookahead_days) * 24;

        for hours in 1..=max_probes {
            let candidate = from + Duration::hours(hours);
            let conflicts = self
                .detector
                .detect(PROBE_GROUP_ID, account_id, candidate, duration_minutes)
                .await?;
            if conflicts.is_empty() {
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    /// Linear scan for the next unoccupied position slot.
    async fn next_free_position(&self, account_id: AccountId, start: u32) -> Result<u32> {
        for position in start + 1..=MAX_POSITION {
            let occupants = self
                .store
                .find_groups_at_position(account_id, position, 0)
                .await?;
            if occupants.is_empty() {
                return Ok(position);
            }
        }
        Ok(start + 1) // fallback
    }
}

/// Postponement period in hours: two hours past the sprint end when known,
/// a flat 24 otherwise.
fn postpone_hours(conflict: &Conflict, now: DateTime<Utc>) -> i64 {
    if let ConflictDetails::Sprint { ends_at, .. } = &conflict.details {
        // Ceil division by the positive divisor 3600 (stable equivalent of
        // the unstable signed `i64::div_ceil`).
        let secs = (*ends_at - now).num_seconds();
        let hours_until_end = {
            let q = secs / 3600;
            if secs % 3600 > 0 { q + 1 } else { q }
        };
        return (hours_until_end + 2).max(1);
    }
    24
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentGroup, Sprint};
    use crate::store::{MemoryStore, Store};
    use uuid::Uuid;

    fn overlap_conflict(severity: Severity, ends_in_hours: i64, now: DateTime<Utc>) -> Conflict {
        Conflict {
            id: Uuid::now_v7().to_string(),
            kind: ConflictKind::SprintOverlap,
            severity,
            group_id: 1,
            account_id: 1,
            conflicting_id: Some(1),
            detected_at: now,
            details: ConflictDetails::Sprint {
                sprint_id: 1,
                sprint_type: "standard".to_string(),
                starts_at: now - Duration::hours(1),
                ends_at: now + Duration::hours(ends_in_hours),
                priority: 5,
            },
        }
    }

    fn resolver_with(store: Arc<MemoryStore>, config: ConflictConfig) -> ConflictResolver {
        let detector = ConflictDetector::new(store.clone(), config);
        ConflictResolver::new(store, detector)
    }

    #[tokio::test]
    async fn test_disabled_auto_resolution_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver_with(
            store,
            ConflictConfig {
                auto_resolution_enabled: false,
                ..ConflictConfig::default()
            },
        );

        let now = Utc::now();
        let results = resolver
            .resolve_all(&[overlap_conflict(Severity::High, 3, now)], now)
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_skipped_silently() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver_with(store, ConflictConfig::default());

        let now = Utc::now();
        let results = resolver
            .resolve_all(&[overlap_conflict(Severity::Low, 3, now)], now)
            .await;
        // Below-threshold conflicts produce no outcome at all.
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_safe_window_found_after_sprint() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        // Sprint active for the next 3 hours; hour 4 is the first free probe.
        store
            .put_sprint(&Sprint {
                id: 1,
                account_id: 1,
                sprint_type: "standard".to_string(),
                priority: 5,
                starts_at: now - Duration::hours(1),
                ends_at: now + Duration::hours(3),
                is_active: true,
            })
            .await
            .unwrap();

        let resolver = resolver_with(store, ConflictConfig::default());
        let conflict = overlap_conflict(Severity::High, 3, now);

        let results = resolver.resolve_all(&[conflict], now).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].resolved);
        assert_eq!(results[0].strategy, Some(StrategyKind::RescheduleToSafeWindow));
        let window = results[0].rescheduled_to.unwrap();
        assert!(window > now + Duration::hours(3));
    }

    #[tokio::test]
    async fn test_postpone_period_from_sprint_end() {
        // Sprint blankets the whole lookahead window so the safe-window
        // probe fails and postponement takes over.
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .put_sprint(&Sprint {
                id: 1,
                account_id: 1,
                sprint_type: "standard".to_string(),
                priority: 5,
                starts_at: now - Duration::hours(1),
                ends_at: now + Duration::days(30),
                is_active: true,
            })
            .await
            .unwrap();

        let resolver = resolver_with(
            store,
            ConflictConfig {
                lookahead_days: 1,
                ..ConflictConfig::default()
            },
        );

        // Conflict metadata says the sprint ends in 3 hours: postponement is
        // ceil(3) + 2 = 5 hours.
        let conflict = overlap_conflict(Severity::High, 3, now);
        let results = resolver.resolve_all(&[conflict], now).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].resolved);
        assert_eq!(results[0].strategy, Some(StrategyKind::PostponeMaintenance));
        assert_eq!(results[0].rescheduled_to.unwrap(), now + Duration::hours(5));
    }

    #[tokio::test]
    async fn test_critical_overlap_cannot_postpone() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        // Saturate every probe so reschedule fails too.
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

        let resolver = resolver_with(
            store,
            ConflictConfig {
                lookahead_days: 1,
                ..ConflictConfig::default()
            },
        );

        let conflict = overlap_conflict(Severity::Critical, 3, now);
        let results = resolver.resolve_all(&[conflict], now).await;

        assert_eq!(results.len(), 1);
        assert!(!results[0].resolved);
        assert_eq!(results[0].errors, vec!["all resolution strategies failed"]);
    }

    #[tokio::test]
    async fn test_position_adjustment_finds_free_slot() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        // Positions 2 and 3 occupied; 4 is free.
        for (id, position) in [(1, 2), (2, 3)] {
            store
                .put_group(&ContentGroup {
                    id,
                    account_id: 1,
                    owner_id: 1,
                    name: format!("group-{id}"),
                    current_position: position,
                    is_active: true,
                    maintenance_frequency_weeks: 2,
                    maintenance_content_count: 3,
                    next_maintenance_date: None,
                    last_maintenance_date: None,
                    blocks: vec![],
                })
                .await
                .unwrap();
        }

        let resolver = resolver_with(store, ConflictConfig::default());
        let conflict = Conflict {
            id: Uuid::now_v7().to_string(),
            kind: ConflictKind::PositionCollision,
            severity: Severity::Critical,
            group_id: 1,
            account_id: 1,
            conflicting_id: Some(2),
            detected_at: now,
            details: ConflictDetails::Position {
                position: 2,
                group_ids: vec![2],
            },
        };

        let results = resolver.resolve_all(&[conflict], now).await;
        assert!(results[0].resolved);
        assert_eq!(results[0].strategy, Some(StrategyKind::AdjustPositionSequence));
        assert_eq!(results[0].new_position, Some(4));
    }

    #[tokio::test]
    async fn test_saturation_staggers_by_fifteen_minutes() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let resolver = resolver_with(store, ConflictConfig::default());

        let conflict = Conflict {
            id: Uuid::now_v7().to_string(),
            kind: ConflictKind::Saturation,
            severity: Severity::Medium,
            group_id: 1,
            account_id: 1,
            conflicting_id: Some(1),
            detected_at: now,
            details: ConflictDetails::Saturation {
                job_count: 3,
                job_ids: vec!["a".into(), "b".into(), "c".into()],
            },
        };

        let results = resolver.resolve_all(&[conflict], now).await;
        assert!(results[0].resolved);
        assert_eq!(results[0].rescheduled_to.unwrap(), now + Duration::minutes(15));
    }
}
