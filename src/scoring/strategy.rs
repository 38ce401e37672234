//! Composite scoring strategies.

use super::normalize::min_max_scale;
use crate::config::ConfigurationError;
use crate::constants::{NEUTRAL_TEMPORAL_STABILITY, NEUTRAL_TEMPORAL_TREND};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Trend bonus multiplier used by [`ScoringStrategy::TemporalTrendFocused`]
const TREND_BONUS_FACTOR: f64 = 0.5;

/// Fixed weights of [`ScoringStrategy::TemporalStabilityFocused`]
const STABILITY_FOCUSED_WEIGHTS: TemporalWeights = TemporalWeights {
    confidence: 0.3,
    lift: 0.3,
    support: 0.2,
    stability: 0.2,
    trend: 0.0,
};

/// One row of the rule table a strategy scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleMetrics {
    pub confidence: f64,
    pub lift: f64,
    pub support: f64,
    /// Temporal stability in [0, 1]
    pub stability: f64,
    /// Temporal trend in [-1, 1]
    pub trend: f64,
}

impl RuleMetrics {
    /// Metrics without a temporal signal (neutral stability and trend)
    pub fn new(confidence: f64, lift: f64, support: f64) -> Self {
        Self {
            confidence,
            lift,
            support,
            stability: NEUTRAL_TEMPORAL_STABILITY,
            trend: NEUTRAL_TEMPORAL_TREND,
        }
    }

    pub fn with_temporal(mut self, stability: f64, trend: f64) -> Self {
        self.stability = stability;
        self.trend = trend;
        self
    }
}

/// Weights for the confidence / lift / support strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub confidence: f64,
    pub lift: f64,
    pub support: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            lift: 0.4,
            support: 0.2,
        }
    }
}

/// Weights for [`ScoringStrategy::TemporalWeighted`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalWeights {
    pub confidence: f64,
    pub lift: f64,
    pub support: f64,
    pub stability: f64,
    pub trend: f64,
}

impl Default for TemporalWeights {
    fn default() -> Self {
        Self {
            confidence: 0.25,
            lift: 0.25,
            support: 0.15,
            stability: 0.20,
            trend: 0.15,
        }
    }
}

/// Which recommendation column a strategy writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTarget {
    CompositeScore,
    TemporalCompositeScore,
}

/// Closed set of scoring strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ScoringStrategy {
    WeightedProduct(ScoringWeights),
    WeightedSum(ScoringWeights),
    NormalizedProduct,
    TemporalWeighted(TemporalWeights),
    TemporalTrendFocused,
    TemporalStabilityFocused,
}

impl ScoringStrategy {
    pub const ALL_NAMES: &'static [&'static str] = &[
        "weighted_product",
        "weighted_sum",
        "normalized_product",
        "temporal_weighted",
        "temporal_trend_focused",
        "temporal_stability_focused",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::WeightedProduct(_) => "weighted_product",
            Self::WeightedSum(_) => "weighted_sum",
            Self::NormalizedProduct => "normalized_product",
            Self::TemporalWeighted(_) => "temporal_weighted",
            Self::TemporalTrendFocused => "temporal_trend_focused",
            Self::TemporalStabilityFocused => "temporal_stability_focused",
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::TemporalWeighted(_) | Self::TemporalTrendFocused | Self::TemporalStabilityFocused
        )
    }

    pub fn target(&self) -> ScoreTarget {
        if self.is_temporal() {
            ScoreTarget::TemporalCompositeScore
        } else {
            ScoreTarget::CompositeScore
        }
    }

    /// Replace the default weights of weighted strategies with configured ones
    pub fn with_weights(self, weights: ScoringWeights, temporal: TemporalWeights) -> Self {
        match self {
            Self::WeightedProduct(_) => Self::WeightedProduct(weights),
            Self::WeightedSum(_) => Self::WeightedSum(weights),
            Self::TemporalWeighted(_) => Self::TemporalWeighted(temporal),
            other => other,
        }
    }

    /// Score every row; output is index-aligned with `rows`
    pub fn score(&self, rows: &[RuleMetrics]) -> Vec<f64> {
        if rows.is_empty() {
            return Vec::new();
        }

        let scores = match self {
            Self::WeightedProduct(w) => rows
                .iter()
                .map(|r| {
                    r.confidence.powf(w.confidence)
                        * r.lift.powf(w.lift)
                        * r.support.powf(w.support)
                })
                .collect(),
            Self::WeightedSum(w) => {
                let table = NormalizedTable::build(rows, false);
                (0..rows.len())
                    .map(|i| {
                        table.confidence[i] * w.confidence
                            + table.lift[i] * w.lift
                            + table.support[i] * w.support
                    })
                    .collect()
            }
            Self::NormalizedProduct => {
                let table = NormalizedTable::build(rows, false);
                (0..rows.len()).map(|i| table.base_product(i)).collect()
            }
            Self::TemporalWeighted(w) => {
                let table = NormalizedTable::build(rows, true);
                rows.iter()
                    .enumerate()
                    .map(|(i, r)| table.temporal_sum(i, w) + (r.trend + 1.0) / 2.0 * w.trend)
                    .collect()
            }
            Self::TemporalTrendFocused => {
                let table = NormalizedTable::build(rows, false);
                rows.iter()
                    .enumerate()
                    .map(|(i, r)| table.base_product(i) + r.trend.max(0.0) * TREND_BONUS_FACTOR)
                    .collect()
            }
            Self::TemporalStabilityFocused => {
                let table = NormalizedTable::build(rows, true);
                (0..rows.len())
                    .map(|i| table.temporal_sum(i, &STABILITY_FOCUSED_WEIGHTS))
                    .collect()
            }
        };

        debug!(strategy = self.name(), rows = rows.len(), "Applied scoring strategy");
        scores
    }
}

impl fmt::Display for ScoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoringStrategy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted_product" => Ok(Self::WeightedProduct(ScoringWeights::default())),
            "weighted_sum" => Ok(Self::WeightedSum(ScoringWeights::default())),
            "normalized_product" => Ok(Self::NormalizedProduct),
            "temporal_weighted" => Ok(Self::TemporalWeighted(TemporalWeights::default())),
            "temporal_trend_focused" => Ok(Self::TemporalTrendFocused),
            "temporal_stability_focused" => Ok(Self::TemporalStabilityFocused),
            _ => Err(ConfigurationError::unknown_strategy("scoring method", s)),
        }
    }
}

/// Min-max normalized columns of a rule table
struct NormalizedTable {
    confidence: Vec<f64>,
    lift: Vec<f64>,
    support: Vec<f64>,
    stability: Vec<f64>,
}

impl NormalizedTable {
    fn build(rows: &[RuleMetrics], include_stability: bool) -> Self {
        let column = |f: fn(&RuleMetrics) -> f64| -> Vec<f64> {
            min_max_scale(&rows.iter().map(f).collect::<Vec<_>>())
        };

        Self {
            confidence: column(|r| r.confidence),
            lift: column(|r| r.lift),
            support: column(|r| r.support),
            stability: if include_stability {
                column(|r| r.stability)
            } else {
                Vec::new()
            },
        }
    }

    fn base_product(&self, i: usize) -> f64 {
        self.confidence[i] * self.lift[i] * self.support[i]
    }

    fn temporal_sum(&self, i: usize, w: &TemporalWeights) -> f64 {
        self.confidence[i] * w.confidence
            + self.lift[i] * w.lift
            + self.support[i] * w.support
            + self.stability[i] * w.stability
    }
}
