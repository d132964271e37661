use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::model::Severity;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            store_path: default_store_path(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/store")
}

/// Scheduler configuration: queue, retry, health loop, shutdown behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential retry backoff.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_true")]
    pub conflict_detection_enabled: bool,
    #[serde(default = "default_true")]
    pub performance_optimization_enabled: bool,
    #[serde(default = "default_true")]
    pub emergency_override_enabled: bool,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Running jobs older than this are failed by the health check.
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,
    /// Re-drain interval while the queue is non-empty.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            conflict_detection_enabled: true,
            performance_optimization_enabled: true,
            emergency_override_enabled: true,
            health_check_interval_ms: default_health_check_interval_ms(),
            job_timeout_ms: default_job_timeout_ms(),
            drain_interval_ms: default_drain_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_max_concurrent_jobs() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_health_check_interval_ms() -> u64 {
    60_000 // 1 minute
}

fn default_job_timeout_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_drain_interval_ms() -> u64 {
    1_000
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

/// Conflict detection and auto-resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConflictConfig {
    /// How far ahead the safe-window search may probe.
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,
    #[serde(default = "default_true")]
    pub auto_resolution_enabled: bool,
    /// Conflicts below this severity are not auto-resolved.
    #[serde(default = "default_severity_threshold")]
    pub severity_threshold: Severity,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            lookahead_days: default_lookahead_days(),
            auto_resolution_enabled: true,
            severity_threshold: default_severity_threshold(),
        }
    }
}

fn default_lookahead_days() -> u32 {
    7
}

fn default_severity_threshold() -> Severity {
    Severity::Medium
}

/// Content scoring weights and candidate filters.
///
/// Weights are applied as-is, without renormalization; each scoring
/// component stays within [0, 1] before weighting.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_seasonal_weight")]
    pub seasonal_weight: f64,
    #[serde(default = "default_diversity_weight")]
    pub diversity_weight: f64,
    #[serde(default = "default_performance_weight")]
    pub performance_weight: f64,
    /// Candidates uploaded more than this many days ago are excluded.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    #[serde(default = "default_min_quality")]
    pub min_quality: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            quality_weight: default_quality_weight(),
            recency_weight: default_recency_weight(),
            seasonal_weight: default_seasonal_weight(),
            diversity_weight: default_diversity_weight(),
            performance_weight: default_performance_weight(),
            max_age_days: default_max_age_days(),
            min_quality: default_min_quality(),
        }
    }
}

impl SelectionConfig {
    pub fn weights(&self) -> [(&'static str, f64); 5] {
        [
            ("quality", self.quality_weight),
            ("recency", self.recency_weight),
            ("seasonal", self.seasonal_weight),
            ("diversity", self.diversity_weight),
            ("performance", self.performance_weight),
        ]
    }
}

fn default_quality_weight() -> f64 {
    0.30
}

fn default_recency_weight() -> f64 {
    0.20
}

fn default_seasonal_weight() -> f64 {
    0.25
}

fn default_diversity_weight() -> f64 {
    0.15
}

fn default_performance_weight() -> f64 {
    0.10
}

fn default_max_age_days() -> i64 {
    90 // 3 months
}

fn default_min_quality() -> f64 {
    6.0
}
