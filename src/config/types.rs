//! Configuration types and structures.

use serde::{Deserialize, Serialize};

/// Configuration source priority (higher = more important). This crate
/// implements the `Default` and `File` layers itself; `Environment` and
/// `CommandLine` layering is the external binder's job (argument parsing is
/// out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ConfigSource {
    #[default]
    Default = 0,
    File = 1,
    Environment = 2,
    CommandLine = 3,
}

/// Batch scheduler limits and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub max_batch_size: usize,
    pub max_total_queued: usize,
    pub max_batch_wait_ms: u64,
    pub deterministic: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 8,
            max_total_queued: 256,
            max_batch_wait_ms: 100,
            deterministic: false,
        }
    }
}

/// Telemetry percentile-window sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub percentile_window: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            percentile_window: 50,
        }
    }
}

/// Explainability capture caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainConfig {
    pub top_k: usize,
    pub max_steps: usize,
    pub low_confidence_threshold: f32,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_steps: 256,
            low_confidence_threshold: 0.15,
        }
    }
}

/// Inputs to the pre-flight memory budget check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBudgetConfig {
    pub available_bytes: u64,
    pub activation_overhead_bytes: u64,
}

impl Default for MemoryBudgetConfig {
    fn default() -> Self {
        Self {
            available_bytes: 8 * 1024 * 1024 * 1024,
            activation_overhead_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub scheduler: SchedulerConfig,
    pub telemetry: TelemetryConfig,
    pub explain: ExplainConfig,
    pub memory_budget: MemoryBudgetConfig,
    #[serde(skip)]
    pub source: ConfigSource,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            telemetry: TelemetryConfig::default(),
            explain: ExplainConfig::default(),
            memory_budget: MemoryBudgetConfig::default(),
            source: ConfigSource::Default,
        }
    }
}
