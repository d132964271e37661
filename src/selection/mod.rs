//! Weighted multi-factor content selection.
//!
//! Selection runs in three steps: candidate retrieval through the
//! [`ContentCatalog`], a weighted scoring pass, and a diversity-aware
//! pick of the final set. Scores are derived fresh on every pass.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::SelectionConfig;
use crate::model::{ContentCandidate, ContentId, GroupId, MediaKind};
use crate::store::{ContentCatalog, ContentFilter, Result};

/// Days an item counts as "recently used" for the avoid-recent filter.
const RECENT_USE_DAYS: i64 = 7;

/// Per-call selection options. Unset filter fields fall back to the
/// configured defaults.
#[derive(Debug, Clone, Default)]
pub struct SelectionOptions {
    pub respect_seasonal: bool,
    pub avoid_recent: bool,
    pub optimize_for_performance: bool,
    pub exclude_ids: Vec<ContentId>,
    pub max_age_days: Option<i64>,
    pub min_quality: Option<f64>,
}

/// Detailed selection result with scoring context and a human-readable
/// rationale.
#[derive(Debug, Clone)]
pub struct SelectionReport {
    pub content_ids: Vec<ContentId>,
    pub average_score: f64,
    pub alternative_ids: Vec<ContentId>,
    pub reason: String,
}

pub struct ContentSelector {
    catalog: Arc<dyn ContentCatalog>,
    config: SelectionConfig,
}

impl ContentSelector {
    pub fn new(catalog: Arc<dyn ContentCatalog>, config: SelectionConfig) -> Self {
        Self { catalog, config }
    }

    /// Select up to `target_count` content ids for a group.
    ///
    /// Returns `min(target_count, eligible pool size)` ids; an empty pool is
    /// a valid outcome, not an error.
    pub async fn select(
        &self,
        group_id: GroupId,
        target_count: usize,
        options: &SelectionOptions,
    ) -> Result<Vec<ContentId>> {
        self.select_at(group_id, target_count, options, Utc::now()).await
    }

    /// Clock-injected variant of [`select`](Self::select).
    pub async fn select_at(
        &self,
        group_id: GroupId,
        target_count: usize,
        options: &SelectionOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentId>> {
        let chosen = self.pick(group_id, target_count, options, now).await?;
        Ok(chosen.iter().map(|item| item.id).collect())
    }

    /// Detailed variant returning scores, alternatives, and a rationale.
    pub async fn select_detailed(
        &self,
        group_id: GroupId,
        target_count: usize,
        options: &SelectionOptions,
    ) -> Result<SelectionReport> {
        self.select_detailed_at(group_id, target_count, options, Utc::now())
            .await
    }

    pub async fn select_detailed_at(
        &self,
        group_id: GroupId,
        target_count: usize,
        options: &SelectionOptions,
        now: DateTime<Utc>,
    ) -> Result<SelectionReport> {
        let mut pool = self.eligible(group_id, options, now).await?;
        let available = pool.len();
        self.score_pool(&mut pool, options, now);

        let chosen = self.choose(pool.clone(), target_count);
        let average_score = if chosen.is_empty() {
            0.0
        } else {
            chosen.iter().map(|c| c.computed_score).sum::<f64>() / chosen.len() as f64
        };

        let alternative_ids: Vec<ContentId> = pool
            .iter()
            .filter(|item| !chosen.iter().any(|c| c.id == item.id))
            .take(5.min(target_count))
            .map(|item| item.id)
            .collect();

        let reason = selection_reason(available, chosen.len(), target_count, options);

        Ok(SelectionReport {
            content_ids: chosen.iter().map(|c| c.id).collect(),
            average_score,
            alternative_ids,
            reason,
        })
    }

    async fn pick(
        &self,
        group_id: GroupId,
        target_count: usize,
        options: &SelectionOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentCandidate>> {
        debug!(group_id, target_count, "Starting content selection");

        let mut pool = self.eligible(group_id, options, now).await?;
        if pool.is_empty() {
            warn!(group_id, "No eligible content found");
            return Ok(Vec::new());
        }

        self.score_pool(&mut pool, options, now);
        let chosen = self.choose(pool, target_count);

        info!(
            group_id,
            selected = chosen.len(),
            target_count,
            "Content selection completed"
        );

        Ok(chosen)
    }

    /// Retrieve the eligible candidate pool.
    ///
    /// Seasonal filtering takes precedence: when `respect_seasonal` is set,
    /// the avoid-recent filter is not applied.
    async fn eligible(
        &self,
        group_id: GroupId,
        options: &SelectionOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentCandidate>> {
        let max_age = options.max_age_days.unwrap_or(self.config.max_age_days);
        let filter = ContentFilter {
            uploaded_after: Some(now - Duration::days(max_age)),
            exclude_ids: options.exclude_ids.clone(),
            min_quality: Some(options.min_quality.unwrap_or(self.config.min_quality)),
        };

        let mut pool = self.catalog.list_content_for_group(group_id, &filter).await?;

        if options.respect_seasonal {
            let month = now.month();
            pool.retain(|item| {
                item.seasonal_months.is_empty() || item.seasonal_months.contains(&month)
            });
        } else if options.avoid_recent {
            let cutoff = now - Duration::days(RECENT_USE_DAYS);
            pool.retain(|item| match item.last_used_at {
                Some(used) => used < cutoff,
                None => true,
            });
        }

        Ok(pool)
    }

    /// Score every candidate and sort the pool best-first.
    fn score_pool(
        &self,
        pool: &mut [ContentCandidate],
        options: &SelectionOptions,
        now: DateTime<Utc>,
    ) {
        let max_age = options.max_age_days.unwrap_or(self.config.max_age_days) as f64;
        let max_usage = pool.iter().map(|item| item.usage_count).max().unwrap_or(0);
        let month = now.month();

        for item in pool.iter_mut() {
            let mut score = 0.0;

            score += (item.base_quality / 10.0) * self.config.quality_weight;

            let days_since_upload = (now - item.uploaded_at).num_days() as f64;
            let recency = (1.0 - days_since_upload / max_age).max(0.0);
            score += recency * self.config.recency_weight;

            let seasonal = if options.respect_seasonal {
                if item.seasonal_months.is_empty() {
                    0.8
                } else if item.seasonal_months.contains(&month) {
                    1.0
                } else {
                    0.3
                }
            } else {
                0.8 // neutral
            };
            score += seasonal * self.config.seasonal_weight;

            let usage = if max_usage > 0 {
                1.0 - item.usage_count as f64 / max_usage as f64
            } else {
                1.0
            };
            score += usage * self.config.diversity_weight;

            let performance = match (&item.performance, options.optimize_for_performance) {
                (Some(stats), true) => (stats.engagement_rate / 100.0).min(1.0),
                _ => 0.5, // neutral
            };
            score += performance * self.config.performance_weight;

            item.computed_score = (score * 10.0).min(10.0);
        }

        pool.sort_by(|a, b| {
            b.computed_score
                .partial_cmp(&a.computed_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Pick the final set from a score-sorted pool.
    fn choose(
        &self,
        scored: Vec<ContentCandidate>,
        target_count: usize,
    ) -> Vec<ContentCandidate> {
        if scored.len() <= target_count {
            return scored;
        }

        let distinct_kinds: std::collections::HashSet<MediaKind> =
            scored.iter().map(|item| item.kind).collect();
        let kind_slots = distinct_kinds.len().min(target_count);

        // One best-scored representative per media kind first.
        let mut chosen: Vec<ContentCandidate> = Vec::with_capacity(target_count);
        let mut seen_kinds = std::collections::HashSet::new();
        for item in &scored {
            if chosen.len() >= kind_slots {
                break;
            }
            if seen_kinds.insert(item.kind) {
                chosen.push(item.clone());
            }
        }

        // Fill remaining slots with the next highest-scored items overall.
        for item in &scored {
            if chosen.len() >= target_count {
                break;
            }
            if !chosen.iter().any(|c| c.id == item.id) {
                chosen.push(item.clone());
            }
        }

        if chosen.len() == target_count {
            repair_diversity(&mut chosen, &scored);
        }

        chosen.truncate(target_count);
        chosen
    }
}

/// Reduce over-representation of mood/location attributes among the chosen
/// set. A single left-to-right scan, not a global optimum: ties and
/// no-alternative cases leave the original item in place.
fn repair_diversity(chosen: &mut [ContentCandidate], pool: &[ContentCandidate]) {
    let mut mood_counts: HashMap<String, usize> = HashMap::new();
    let mut location_counts: HashMap<String, usize> = HashMap::new();

    for item in chosen.iter() {
        if let Some(mood) = &item.mood {
            *mood_counts.entry(mood.clone()).or_default() += 1;
        }
        if let Some(location) = &item.location {
            *location_counts.entry(location.clone()).or_default() += 1;
        }
    }

    for i in 0..chosen.len() {
        let current = chosen[i].clone();
        let mood_count = current
            .mood
            .as_ref()
            .and_then(|m| mood_counts.get(m).copied())
            .unwrap_or(0);
        let location_count = current
            .location
            .as_ref()
            .and_then(|l| location_counts.get(l).copied())
            .unwrap_or(0);

        if mood_count <= 2 && location_count <= 2 {
            continue;
        }

        // Pool is score-sorted, so the first acceptable alternative is the
        // best one within the 20% score band.
        let replacement = pool.iter().find(|alt| {
            !chosen.iter().any(|c| c.id == alt.id)
                && alt.computed_score >= current.computed_score * 0.8
                && alt
                    .mood
                    .as_ref()
                    .map(|m| mood_counts.get(m).copied().unwrap_or(0) < mood_count)
                    .unwrap_or(true)
                && alt
                    .location
                    .as_ref()
                    .map(|l| location_counts.get(l).copied().unwrap_or(0) < location_count)
                    .unwrap_or(true)
        });

        if let Some(alt) = replacement {
            let alt = alt.clone();
            if let Some(mood) = &current.mood {
                if let Some(count) = mood_counts.get_mut(mood) {
                    *count -= 1;
                }
            }
            if let Some(location) = &current.location {
                if let Some(count) = location_counts.get_mut(location) {
                    *count -= 1;
                }
            }
            if let Some(mood) = &alt.mood {
                *mood_counts.entry(mood.clone()).or_default() += 1;
            }
            if let Some(location) = &alt.location {
                *location_counts.entry(location.clone()).or_default() += 1;
            }
            chosen[i] = alt;
        }
    }
}

fn selection_reason(
    available: usize,
    selected: usize,
    target_count: usize,
    options: &SelectionOptions,
) -> String {
    let mut reasons = Vec::new();

    if selected < target_count {
        reasons.push(format!(
            "selected {selected}/{target_count} items (limited by availability)"
        ));
    } else {
        reasons.push(format!("selected {selected} items from {available} available"));
    }

    if options.respect_seasonal {
        reasons.push("seasonal relevance considered".to_string());
    }
    if options.avoid_recent {
        reasons.push("recently used content avoided".to_string());
    }
    if options.optimize_for_performance {
        reasons.push("performance metrics optimized".to_string());
    }

    format!("content selection: {}", reasons.join(", "))
}
