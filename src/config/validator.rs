//! Configuration validation.

use super::types::{ExplainConfig, MemoryBudgetConfig, RuntimeConfig, SchedulerConfig, TelemetryConfig};

/// Static-method validator, one function per section plus a `validate_all`
/// composition — mirrors the shape used elsewhere in this crate's config
/// loading path.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_scheduler(config: &SchedulerConfig) -> Result<(), String> {
        if config.max_batch_size == 0 {
            return Err("max_batch_size must be greater than 0".to_string());
        }
        if config.max_total_queued == 0 {
            return Err("max_total_queued must be greater than 0".to_string());
        }
        if config.max_total_queued < config.max_batch_size {
            return Err("max_total_queued must be >= max_batch_size".to_string());
        }
        Ok(())
    }

    pub fn validate_telemetry(config: &TelemetryConfig) -> Result<(), String> {
        if config.percentile_window == 0 {
            return Err("percentile_window must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn validate_explain(config: &ExplainConfig) -> Result<(), String> {
        if config.max_steps == 0 {
            return Err("max_steps must be greater than 0".to_string());
        }
        if config.top_k == 0 || config.top_k > 50 {
            return Err("top_k must be between 1 and 50".to_string());
        }
        if !(0.0..=1.0).contains(&config.low_confidence_threshold) {
            return Err("low_confidence_threshold must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }

    pub fn validate_memory_budget(config: &MemoryBudgetConfig) -> Result<(), String> {
        if config.available_bytes == 0 {
            return Err("available_bytes must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn validate_all(config: &RuntimeConfig) -> Result<(), String> {
        Self::validate_scheduler(&config.scheduler)?;
        Self::validate_telemetry(&config.telemetry)?;
        Self::validate_explain(&config.explain)?;
        Self::validate_memory_budget(&config.memory_budget)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::RuntimeConfig;

    #[test]
    fn validate_scheduler_valid() {
        let config = SchedulerConfig::default();
        assert!(ConfigValidator::validate_scheduler(&config).is_ok());
    }

    #[test]
    fn validate_scheduler_zero_batch_size() {
        let config = SchedulerConfig {
            max_batch_size: 0,
            ..SchedulerConfig::default()
        };
        assert!(ConfigValidator::validate_scheduler(&config).is_err());
    }

    #[test]
    fn validate_scheduler_queue_smaller_than_batch() {
        let config = SchedulerConfig {
            max_batch_size: 16,
            max_total_queued: 4,
            ..SchedulerConfig::default()
        };
        assert!(ConfigValidator::validate_scheduler(&config).is_err());
    }

    #[test]
    fn validate_explain_top_k_out_of_range() {
        let config = ExplainConfig {
            top_k: 51,
            ..ExplainConfig::default()
        };
        assert!(ConfigValidator::validate_explain(&config).is_err());
    }

    #[test]
    fn validate_memory_budget_zero_available() {
        let config = MemoryBudgetConfig {
            available_bytes: 0,
            ..MemoryBudgetConfig::default()
        };
        assert!(ConfigValidator::validate_memory_budget(&config).is_err());
    }

    #[test]
    fn validate_all_defaults() {
        let config = RuntimeConfig::default();
        assert!(ConfigValidator::validate_all(&config).is_ok());
    }
}
