//! Adaptive minimum-support selection.
//!
//! Wide item sets make frequent-itemset mining explode combinatorially, so
//! the configured baseline is raised for large catalogs and never allowed to
//! drop below a floor.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Which rule of the selection policy produced the support value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportTier {
    /// More than 400 distinct items
    PerformanceProtection,
    /// More than 200 distinct items
    PerformanceOptimization,
    /// Baseline below 2%
    MinimumFloor,
    Baseline,
}

impl SupportTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerformanceProtection => "performance_protection",
            Self::PerformanceOptimization => "performance_optimization",
            Self::MinimumFloor => "minimum_floor",
            Self::Baseline => "baseline",
        }
    }
}

impl fmt::Display for SupportTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selected support value and the tier that selected it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSupport {
    pub min_support: f64,
    pub tier: SupportTier,
}

/// Pick the minimum support for a matrix of `num_items` columns and
/// `num_transactions` rows. First matching rule wins.
pub fn select_support(num_items: usize, num_transactions: usize, baseline: f64) -> AdaptiveSupport {
    let transactions = num_transactions.max(1) as f64;

    let (min_support, tier) = if num_items > 400 {
        (0.20f64.max(30.0 / transactions), SupportTier::PerformanceProtection)
    } else if num_items > 200 {
        (0.10f64.max(15.0 / transactions), SupportTier::PerformanceOptimization)
    } else if baseline < 0.02 {
        (0.02f64.max(5.0 / transactions), SupportTier::MinimumFloor)
    } else {
        (baseline, SupportTier::Baseline)
    };

    if tier != SupportTier::Baseline {
        warn!(
            tier = %tier,
            num_items = num_items,
            num_transactions = num_transactions,
            baseline = baseline,
            min_support = min_support,
            "⚠️ Adjusted minimum support"
        );
    }

    AdaptiveSupport { min_support, tier }
}
