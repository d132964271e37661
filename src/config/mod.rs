//! Configuration management for Rotabox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use rotabox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `ROTABOX__<section>__<key>`
//!
//! Examples:
//! - `ROTABOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `ROTABOX__SCHEDULER__MAX_CONCURRENT_JOBS=8`
//! - `ROTABOX__CONFLICT__SEVERITY_THRESHOLD=high`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/rotabox.toml`.
//! This can be overridden using the `ROTABOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{Config, ConflictConfig, SchedulerConfig, SelectionConfig, ServerConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`ROTABOX__*`)
    /// 2. TOML file (default: `config/rotabox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation
    /// fails (weight ranges, zero concurrency, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[scheduler]
max_retries = 5
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.scheduler.max_retries, 5);
        assert_eq!(config.scheduler.max_concurrent_jobs, 5);
    }

    #[test]
    fn test_validation_catches_bad_weights() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[selection]
quality_weight = 1.5
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::WeightOutOfRange { .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
store_path = "data/store"

[scheduler]
max_retries = 3
retry_delay_ms = 5000
max_concurrent_jobs = 5
conflict_detection_enabled = true
performance_optimization_enabled = true
emergency_override_enabled = true
health_check_interval_ms = 60000
job_timeout_ms = 300000

[conflict]
lookahead_days = 7
auto_resolution_enabled = true
severity_threshold = "medium"

[selection]
quality_weight = 0.30
recency_weight = 0.20
seasonal_weight = 0.25
diversity_weight = 0.15
performance_weight = 0.10
max_age_days = 90
min_quality = 6.0
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.server.store_path.to_str().unwrap(), "data/store");
        assert_eq!(config.scheduler.retry_delay_ms, 5000);
        assert!(config.conflict.auto_resolution_enabled);
        assert!((config.selection.diversity_weight - 0.15).abs() < f64::EPSILON);
    }
}
