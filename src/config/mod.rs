//! # Configuration System
//!
//! YAML-backed configuration for the mining core with environment-specific
//! sections and process environment overrides.
//!
//! ## Resolution order
//!
//! 1. Built-in defaults (every field has one)
//! 2. `config/affinity.yaml` base values
//! 3. The section named after the current environment (`development`, `test`, `production`)
//! 4. Process environment variables (`MIN_SUPPORT`, `DATABASE_URL`, ...)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use affinity_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().mining.pipeline_timeout();
//! let strategy = manager.config().scoring.strategy()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::mining::temporal::TimeSegmentation;
use crate::scoring::{ScoringStrategy, ScoringWeights, TemporalWeights};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring affinity.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AffinityConfig {
    /// Mining thresholds and pipeline budget
    pub mining: MiningConfig,

    /// Composite scoring strategy and weights
    pub scoring: ScoringConfig,

    /// Temporal signal computation
    pub temporal: TemporalConfig,

    /// Order source and recommendation sink
    pub database: DatabaseConfig,

    /// Task registry housekeeping
    pub tasks: TaskConfig,
}

impl AffinityConfig {
    /// Validate every section, failing on the first bad value
    pub fn validate(&self) -> ConfigResult<()> {
        self.mining.validate()?;
        self.scoring.strategy()?;
        self.temporal.segmentation()?;
        self.tasks.validate()?;
        Ok(())
    }
}

/// Mining thresholds and pipeline budget
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Baseline minimum support before adaptive adjustment
    pub min_support: f64,
    pub min_confidence: f64,
    /// Minimum lift passed to rule derivation
    pub min_lift: f64,
    /// Maximum recommendations kept per main item
    pub max_recommendations: usize,
    /// Exponential decay rate per day for recency weights
    pub decay_rate: f64,
    /// Whole-pipeline wall-clock budget
    pub pipeline_timeout_seconds: u64,
    /// How often the supervisor wakes to log a still-running primitive
    pub poll_interval_ms: u64,
    /// Rows included in the display payload of a finished task
    pub display_limit: usize,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            min_support: 0.45,
            min_confidence: 0.4,
            min_lift: 1.0,
            max_recommendations: 3,
            decay_rate: 0.05,
            pipeline_timeout_seconds: 300,
            poll_interval_ms: 5_000,
            display_limit: 100,
        }
    }
}

impl MiningConfig {
    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.min_support > 0.0 && self.min_support <= 1.0) {
            return Err(ConfigurationError::invalid_value(
                "mining.min_support",
                self.min_support.to_string(),
                "support must be in (0, 1]",
            ));
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigurationError::invalid_value(
                "mining.min_confidence",
                self.min_confidence.to_string(),
                "confidence must be in [0, 1]",
            ));
        }

        if self.min_lift.is_nan() || self.min_lift < 0.0 {
            return Err(ConfigurationError::invalid_value(
                "mining.min_lift",
                self.min_lift.to_string(),
                "lift threshold cannot be negative",
            ));
        }

        if self.max_recommendations == 0 {
            return Err(ConfigurationError::invalid_value(
                "mining.max_recommendations",
                "0",
                "at least one recommendation per item is required",
            ));
        }

        if self.decay_rate.is_nan() || self.decay_rate < 0.0 {
            return Err(ConfigurationError::invalid_value(
                "mining.decay_rate",
                self.decay_rate.to_string(),
                "decay rate cannot be negative",
            ));
        }

        if self.pipeline_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "mining.pipeline_timeout_seconds",
                "0",
                "pipeline timeout must be greater than 0",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "mining.poll_interval_ms",
                "0",
                "poll interval must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Composite scoring strategy and weights
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Strategy name; `None` keeps the plain `confidence * lift` score
    pub method: Option<String>,
    pub weights: ScoringWeights,
    pub temporal_weights: TemporalWeights,
}

impl ScoringConfig {
    /// Resolve the configured strategy with the configured weights applied
    pub fn strategy(&self) -> ConfigResult<Option<ScoringStrategy>> {
        self.method
            .as_deref()
            .map(|name| {
                name.parse::<ScoringStrategy>()
                    .map(|s| s.with_weights(self.weights, self.temporal_weights))
            })
            .transpose()
    }
}

/// Temporal signal computation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Compute stability/trend per rule instead of the neutral defaults
    pub enabled: bool,
    /// `daily`, `weekly` or `monthly`
    pub segmentation: String,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            segmentation: "weekly".to_string(),
        }
    }
}

impl TemporalConfig {
    pub fn segmentation(&self) -> ConfigResult<TimeSegmentation> {
        self.segmentation.parse()
    }
}

/// Order source and recommendation sink
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    /// Source table holding one row per order line
    pub order_table: String,
    /// Item master table providing display names
    pub item_master_table: String,
    /// Output table for recommendations
    pub recommendations_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            order_table: "order_lines".to_string(),
            item_master_table: "item_master".to_string(),
            recommendations_table: "item_recommendations".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Database URL, falling back to a local development database
    pub fn database_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| "postgresql://localhost/affinity_development".to_string())
    }
}

/// Task registry housekeeping
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskConfig {
    pub cleanup_interval_seconds: u64,
    pub max_age_hours: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: 3_600,
            max_age_hours: 24,
        }
    }
}

impl TaskConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 3_600)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.cleanup_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "tasks.cleanup_interval_seconds",
                "0",
                "cleanup interval must be greater than 0",
            ));
        }
        Ok(())
    }
}
