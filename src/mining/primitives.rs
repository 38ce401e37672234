//! Contracts for the external mining capability.
//!
//! The crate does not implement frequent-itemset mining or rule derivation.
//! Callers plug in implementations of [`FrequentItemsetMiner`] and
//! [`RuleDeriver`]; the supervisor runs them on worker threads under a
//! wall-clock budget.

use super::matrix::BasketMatrix;
use super::temporal::TemporalSignal;
use crate::config::ConfigurationError;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Item set whose support met the mining threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequentItemset {
    pub items: Vec<String>,
    pub support: f64,
}

impl FrequentItemset {
    pub fn new<I, S>(items: I, support: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
            support,
        }
    }
}

/// `antecedents → consequents` with its statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationRule {
    pub antecedents: Vec<String>,
    pub consequents: Vec<String>,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    /// Attached by the temporal analyzer when it runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalSignal>,
}

impl AssociationRule {
    pub fn new<A, C, S>(
        antecedents: A,
        consequents: C,
        support: f64,
        confidence: f64,
        lift: f64,
    ) -> Self
    where
        A: IntoIterator<Item = S>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            antecedents: antecedents.into_iter().map(Into::into).collect(),
            consequents: consequents.into_iter().map(Into::into).collect(),
            support,
            confidence,
            lift,
            temporal: None,
        }
    }

    /// Antecedents followed by consequents
    pub fn itemset(&self) -> Vec<&str> {
        self.antecedents
            .iter()
            .chain(self.consequents.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn metric(&self, metric: RuleMetric) -> f64 {
        match metric {
            RuleMetric::Lift => self.lift,
            RuleMetric::Confidence => self.confidence,
            RuleMetric::Support => self.support,
        }
    }
}

/// Metric the rule-derivation primitive thresholds on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMetric {
    #[default]
    Lift,
    Confidence,
    Support,
}

impl RuleMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lift => "lift",
            Self::Confidence => "confidence",
            Self::Support => "support",
        }
    }
}

impl fmt::Display for RuleMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleMetric {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "lift" => Ok(Self::Lift),
            "confidence" => Ok(Self::Confidence),
            "support" => Ok(Self::Support),
            _ => Err(ConfigurationError::unknown_strategy("rule metric", s)),
        }
    }
}

/// Cooperative stop signal shared between the supervisor and a primitive.
///
/// Raised when the budget runs out. Primitives that never check it are
/// abandoned instead.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Frequent-itemset mining capability
pub trait FrequentItemsetMiner: Send + Sync {
    fn name(&self) -> &str {
        "frequent_itemsets"
    }

    fn mine(
        &self,
        matrix: &BasketMatrix,
        min_support: f64,
        cancel: &CancellationFlag,
    ) -> Result<Vec<FrequentItemset>>;
}

/// Association-rule derivation capability
pub trait RuleDeriver: Send + Sync {
    fn name(&self) -> &str {
        "association_rules"
    }

    fn derive(
        &self,
        itemsets: &[FrequentItemset],
        metric: RuleMetric,
        min_threshold: f64,
        cancel: &CancellationFlag,
    ) -> Result<Vec<AssociationRule>>;
}
