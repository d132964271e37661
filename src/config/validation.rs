use thiserror::Error;

use super::models::Config;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("selection weight '{name}' out of range: {value} (expected 0.0..=1.0)")]
    WeightOutOfRange { name: &'static str, value: f64 },

    #[error("selection weights sum to {0}, which exceeds 1.0")]
    WeightSumTooLarge(f64),

    #[error("scheduler.max_concurrent_jobs must be at least 1")]
    ZeroConcurrency,

    #[error("conflict.lookahead_days must be at least 1")]
    ZeroLookahead,

    #[error("selection.max_age_days must be positive, got {0}")]
    NonPositiveMaxAge(i64),

    #[error("selection.min_quality out of range: {0} (expected 0.0..=10.0)")]
    MinQualityOutOfRange(f64),
}

/// Validate cross-field constraints the serde layer cannot express.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    let mut sum = 0.0;
    for (name, value) in config.selection.weights() {
        if !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::WeightOutOfRange { name, value });
        }
        sum += value;
    }
    if sum > 1.0 + 1e-9 {
        return Err(ValidationError::WeightSumTooLarge(sum));
    }

    if config.scheduler.max_concurrent_jobs == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }

    if config.conflict.lookahead_days == 0 {
        return Err(ValidationError::ZeroLookahead);
    }

    if config.selection.max_age_days <= 0 {
        return Err(ValidationError::NonPositiveMaxAge(config.selection.max_age_days));
    }

    if !(0.0..=10.0).contains(&config.selection.min_quality) {
        return Err(ValidationError::MinQualityOutOfRange(config.selection.min_quality));
    }

    Ok(())
}
