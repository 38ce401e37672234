//! # Temporal Analyzer
//!
//! Measures how steady and in which direction the co-occurrence of a rule's
//! items moves over time. Transactions are bucketed into calendar segments;
//! for each rule the weighted support of its full itemset is computed per
//! segment, then summarized as:
//!
//! - **stability** `1 / (1 + cv)` with `cv` the coefficient of variation of
//!   the segment supports, in (0, 1]
//! - **trend** least-squares slope of the segment supports divided by their
//!   mean, clamped to [-1, 1]
//!
//! With fewer than two segments, or a zero mean, the neutral values
//! (stability 0.5, trend 0.0) are used.

use super::primitives::AssociationRule;
use super::transactions::Transaction;
use crate::config::ConfigurationError;
use crate::constants::{NEUTRAL_TEMPORAL_STABILITY, NEUTRAL_TEMPORAL_TREND};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Calendar bucket size for temporal analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSegmentation {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl TimeSegmentation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Sortable key of the segment containing `date`.
    ///
    /// Weeks start on Monday.
    pub fn segment_key(&self, date: NaiveDate) -> i64 {
        match self {
            Self::Daily => i64::from(date.num_days_from_ce()),
            Self::Weekly => {
                i64::from(date.num_days_from_ce())
                    - i64::from(date.weekday().num_days_from_monday())
            }
            Self::Monthly => i64::from(date.year()) * 12 + i64::from(date.month0()),
        }
    }
}

impl fmt::Display for TimeSegmentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeSegmentation {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(ConfigurationError::unknown_strategy("time segmentation", s)),
        }
    }
}

/// Stability and trend of one rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalSignal {
    pub stability: f64,
    pub trend: f64,
}

impl Default for TemporalSignal {
    fn default() -> Self {
        Self {
            stability: NEUTRAL_TEMPORAL_STABILITY,
            trend: NEUTRAL_TEMPORAL_TREND,
        }
    }
}

impl TemporalSignal {
    /// Summarize a chronological series of per-segment supports
    pub fn from_series(supports: &[f64]) -> Self {
        if supports.len() < 2 {
            return Self::default();
        }

        let n = supports.len() as f64;
        let mean = supports.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return Self::default();
        }

        let variance = supports.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let cv = variance.sqrt() / mean;

        let x_mean = (n - 1.0) / 2.0;
        let (covariance, x_variance) = supports.iter().enumerate().fold(
            (0.0, 0.0),
            |(cov, var), (i, s)| {
                let dx = i as f64 - x_mean;
                (cov + dx * (s - mean), var + dx * dx)
            },
        );
        let slope = covariance / x_variance;

        Self {
            stability: 1.0 / (1.0 + cv),
            trend: (slope / mean).clamp(-1.0, 1.0),
        }
    }
}

struct Segment {
    total_weight: f64,
    baskets: Vec<(HashSet<String>, f64)>,
}

/// Attaches a [`TemporalSignal`] to association rules
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalAnalyzer {
    segmentation: TimeSegmentation,
}

impl TemporalAnalyzer {
    pub fn new(segmentation: TimeSegmentation) -> Self {
        Self { segmentation }
    }

    pub fn segmentation(&self) -> TimeSegmentation {
        self.segmentation
    }

    /// Compute and attach a signal to every rule
    pub fn annotate(&self, rules: &mut [AssociationRule], transactions: &[Transaction]) {
        let segments = self.segment(transactions);

        for rule in rules.iter_mut() {
            let itemset = rule.itemset();
            let series: Vec<f64> = segments
                .values()
                .map(|segment| Self::weighted_support(segment, &itemset))
                .collect();
            rule.temporal = Some(TemporalSignal::from_series(&series));
        }

        info!(
            segmentation = %self.segmentation,
            segments = segments.len(),
            rules = rules.len(),
            "📈 Computed temporal signals"
        );
    }

    fn segment(&self, transactions: &[Transaction]) -> BTreeMap<i64, Segment> {
        let mut segments: BTreeMap<i64, Segment> = BTreeMap::new();
        for transaction in transactions {
            let weight = transaction.weight();
            let segment = segments
                .entry(self.segmentation.segment_key(transaction.observed_on))
                .or_insert_with(|| Segment {
                    total_weight: 0.0,
                    baskets: Vec::new(),
                });
            segment.total_weight += weight;
            segment
                .baskets
                .push((transaction.items.iter().cloned().collect(), weight));
        }
        segments
    }

    fn weighted_support(segment: &Segment, itemset: &[&str]) -> f64 {
        if segment.total_weight <= 0.0 {
            return 0.0;
        }
        let hits: f64 = segment
            .baskets
            .iter()
            .filter(|(items, _)| itemset.iter().all(|item| items.contains(*item)))
            .map(|(_, weight)| weight)
            .sum();
        hits / segment.total_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn transaction(id: &str, items: &[&str], on: NaiveDate) -> Transaction {
        Transaction {
            order_id: id.to_string(),
            items: items.iter().map(|s| s.to_string()).collect(),
            item_weights: vec![1.0; items.len()],
            observed_on: on,
        }
    }

    #[test]
    fn test_segmentation_parsing() {
        assert_eq!("daily".parse::<TimeSegmentation>().unwrap(), TimeSegmentation::Daily);
        assert_eq!(TimeSegmentation::Monthly.to_string(), "monthly");
        assert!(matches!(
            "hourly".parse::<TimeSegmentation>(),
            Err(ConfigurationError::UnknownStrategy { .. })
        ));
    }

    #[test]
    fn test_weekly_key_groups_monday_to_sunday() {
        let weekly = TimeSegmentation::Weekly;
        // 2024-03-04 is a Monday
        assert_eq!(
            weekly.segment_key(date(2024, 3, 4)),
            weekly.segment_key(date(2024, 3, 10))
        );
        assert_ne!(
            weekly.segment_key(date(2024, 3, 10)),
            weekly.segment_key(date(2024, 3, 11))
        );
    }

    #[test]
    fn test_monthly_key_orders_across_years() {
        let monthly = TimeSegmentation::Monthly;
        assert!(monthly.segment_key(date(2023, 12, 31)) < monthly.segment_key(date(2024, 1, 1)));
        assert_eq!(
            monthly.segment_key(date(2024, 2, 1)),
            monthly.segment_key(date(2024, 2, 29))
        );
    }

    #[test]
    fn test_neutral_signal_for_short_or_zero_series() {
        assert_eq!(TemporalSignal::from_series(&[]), TemporalSignal::default());
        assert_eq!(TemporalSignal::from_series(&[0.4]), TemporalSignal::default());
        assert_eq!(TemporalSignal::from_series(&[0.0, 0.0]), TemporalSignal::default());
    }

    #[test]
    fn test_constant_series_is_fully_stable() {
        let signal = TemporalSignal::from_series(&[0.3, 0.3, 0.3]);
        assert!((signal.stability - 1.0).abs() < 1e-12);
        assert!(signal.trend.abs() < 1e-12);
    }

    #[test]
    fn test_rising_series_has_positive_trend() {
        let signal = TemporalSignal::from_series(&[0.1, 0.2, 0.3]);
        // slope 0.1, mean 0.2
        assert!((signal.trend - 0.5).abs() < 1e-9);
        assert!(signal.stability < 1.0 && signal.stability > 0.0);

        let falling = TemporalSignal::from_series(&[0.9, 0.0]);
        assert_eq!(falling.trend, -1.0);
    }

    #[test]
    fn test_annotate_rules() {
        let transactions = vec![
            transaction("1", &["a", "b"], date(2024, 3, 4)),
            transaction("2", &["a"], date(2024, 3, 5)),
            transaction("3", &["a", "b"], date(2024, 3, 11)),
            transaction("4", &["a", "b"], date(2024, 3, 12)),
        ];
        let mut rules = vec![AssociationRule::new(["a"], ["b"], 0.75, 0.75, 1.0)];

        TemporalAnalyzer::new(TimeSegmentation::Weekly).annotate(&mut rules, &transactions);

        let signal = rules[0].temporal.unwrap();
        // weekly supports [0.5, 1.0]
        assert!(signal.trend > 0.0);
        assert!((signal.stability - 1.0 / (1.0 + 0.25 / 0.75)).abs() < 1e-9);
    }
}
