//! The five-phase maintenance pipeline executed per job.
//!
//! Phase order: conflict handling, content selection, content update,
//! position update, performance recording. A hard failure in phases 2-4
//! aborts the remaining phases while keeping the partial results already
//! recorded; phase 5 failures are logged and never fail the job.

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use super::{DEFAULT_PRIORITY, MaintenanceScheduler, Result};
use crate::collaborators::MaintenanceMetrics;
use crate::conflict::DEFAULT_MAINTENANCE_MINUTES;
use crate::model::{ExecutionReport, JobKind, JobMetadata, JobStatus, MaintenanceJob};
use crate::selection::SelectionOptions;
use crate::store::StoreError;

/// Delay applied when unresolved conflicts force a postponement.
const POSTPONE_DELAY_HOURS: i64 = 1;

pub(crate) struct PipelineOutcome {
    pub report: ExecutionReport,
    pub postponed: bool,
}

impl PipelineOutcome {
    fn finished(mut report: ExecutionReport) -> Self {
        report.success = report.errors.is_empty();
        Self {
            report,
            postponed: false,
        }
    }

    fn parked(mut report: ExecutionReport) -> Self {
        report.success = false;
        Self {
            report,
            postponed: true,
        }
    }
}

impl MaintenanceScheduler {
    pub(crate) async fn run_pipeline(&self, job: &mut MaintenanceJob) -> Result<PipelineOutcome> {
        let now = Utc::now();
        let group = self
            .inner
            .store
            .get_group(job.group_id)
            .await?
            .ok_or(StoreError::GroupNotFound(job.group_id))?;

        let mut report = ExecutionReport::empty(job, now);

        // Phase 1: conflict detection and resolution
        if self.inner.config.conflict_detection_enabled && !job.metadata.override_conflicts {
            debug!(job_id = %job.id, "Phase 1: conflict detection");

            let conflicts = self
                .inner
                .detector
                .detect(job.group_id, job.account_id, now, DEFAULT_MAINTENANCE_MINUTES)
                .await?;

            if !conflicts.is_empty() {
                self.inner.metrics.conflicts_detected(conflicts.len() as u64);

                let outcomes = self.inner.resolver.resolve_all(&conflicts, now).await;
                let resolved = outcomes.iter().filter(|o| o.resolved).count();
                report.conflicts_resolved = resolved;
                self.inner.metrics.conflicts_resolved(resolved as u64);

                if resolved < conflicts.len() {
                    report.errors.push(format!(
                        "unable to resolve {} conflicts",
                        conflicts.len() - resolved
                    ));

                    // Emergency jobs push through unresolved conflicts;
                    // everything else steps aside for an hour.
                    if job.kind != JobKind::Emergency {
                        self.postpone_job(job, "conflicts detected").await?;
                        return Ok(PipelineOutcome::parked(report));
                    }
                }
            }
        }

        // Phase 2: content selection
        debug!(job_id = %job.id, "Phase 2: content selection");
        let options = SelectionOptions {
            respect_seasonal: true,
            avoid_recent: true,
            optimize_for_performance: self.inner.config.performance_optimization_enabled,
            ..SelectionOptions::default()
        };
        let selected = self
            .inner
            .selector
            .select(job.group_id, group.maintenance_content_count, &options)
            .await?;

        if selected.is_empty() {
            // Terminal for this execution, not a retryable error.
            report
                .errors
                .push("no suitable content available for maintenance".to_string());
            return Ok(PipelineOutcome::finished(report));
        }

        // Phase 3: content-set update
        debug!(job_id = %job.id, "Phase 3: content update");
        let update = self
            .inner
            .updater
            .replace_group_content(job.group_id, job.account_id, &selected)
            .await;
        report.content_updated = update.updated;
        if !update.errors.is_empty() {
            report.errors.extend(update.errors);
            return Ok(PipelineOutcome::finished(report));
        }

        // Phase 4: position management
        debug!(job_id = %job.id, "Phase 4: position management");
        let positions = self
            .inner
            .positions
            .update_position_after_maintenance(job.group_id, job.account_id, group.current_position)
            .await;
        report.positions_changed = positions.positions_changed;
        if !positions.errors.is_empty() {
            report.errors.extend(positions.errors);
            return Ok(PipelineOutcome::finished(report));
        }

        // Phase 5: performance recording (fire-and-forget)
        if self.inner.config.performance_optimization_enabled {
            debug!(job_id = %job.id, "Phase 5: performance recording");
            let metrics = MaintenanceMetrics {
                content_updated: report.content_updated,
                conflicts_resolved: report.conflicts_resolved,
                executed_at: now,
            };
            if let Err(e) = self
                .inner
                .recorder
                .record_maintenance_performance(job.group_id, job.account_id, &metrics)
                .await
            {
                warn!(job_id = %job.id, error = %e, "Performance recording failed");
            }
        }

        // Schedule the next occurrence.
        let next = now + Duration::weeks(i64::from(group.maintenance_frequency_weeks));
        let mut group = group;
        group.next_maintenance_date = Some(next);
        group.last_maintenance_date = Some(now);
        self.inner.store.put_group(&group).await?;

        self.schedule_maintenance(
            job.group_id,
            job.account_id,
            job.actor_id,
            next,
            JobKind::Scheduled,
            DEFAULT_PRIORITY,
            JobMetadata::default(),
        )
        .await?;
        report.next_scheduled_at = Some(next);

        Ok(PipelineOutcome::finished(report))
    }

    /// Park a job for an hour with the reason recorded in its metadata.
    async fn postpone_job(&self, job: &mut MaintenanceJob, reason: &str) -> Result<()> {
        let now = Utc::now();
        let until = now + Duration::hours(POSTPONE_DELAY_HOURS);

        job.metadata.postpone_reason = Some(reason.to_string());
        job.metadata.original_schedule = Some(job.scheduled_for);
        job.status = JobStatus::Postponed;
        job.scheduled_for = until;
        job.updated_at = now;
        self.inner.store.put_job(job).await?;

        info!(job_id = %job.id, reason, postponed_until = %until, "Job postponed");
        Ok(())
    }
}
