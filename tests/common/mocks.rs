//! Stand-ins for the external mining capability and storage.

use affinity_core::error::{MiningError, Result};
use affinity_core::mining::{
    AssociationRule, BasketMatrix, CancellationFlag, FrequentItemset, FrequentItemsetMiner,
    OrderLine, RuleDeriver, RuleMetric,
};
use affinity_core::storage::{
    OrderSource, RecommendationSink, ScoredPair, StorageError, StoredRecommendation,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Exhaustive 1- and 2-itemset miner, good enough for tiny fixtures
#[derive(Debug, Default)]
pub struct PairMiner {
    calls: AtomicUsize,
}

impl PairMiner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrequentItemsetMiner for PairMiner {
    fn name(&self) -> &str {
        "pair_miner"
    }

    fn mine(
        &self,
        matrix: &BasketMatrix,
        min_support: f64,
        _cancel: &CancellationFlag,
    ) -> Result<Vec<FrequentItemset>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let columns = matrix.columns();
        let mut itemsets = Vec::new();

        for (i, a) in columns.iter().enumerate() {
            let support = matrix.support_of(&[a]);
            if support >= min_support {
                itemsets.push(FrequentItemset::new([a.as_str()], support));
            }
            for b in &columns[i + 1..] {
                let support = matrix.support_of(&[a, b]);
                if support >= min_support {
                    itemsets.push(FrequentItemset::new([a.as_str(), b.as_str()], support));
                }
            }
        }
        Ok(itemsets)
    }
}

/// Derives `a -> b` and `b -> a` from every frequent pair
#[derive(Debug, Default)]
pub struct PairRuleDeriver;

impl RuleDeriver for PairRuleDeriver {
    fn derive(
        &self,
        itemsets: &[FrequentItemset],
        metric: RuleMetric,
        min_threshold: f64,
        _cancel: &CancellationFlag,
    ) -> Result<Vec<AssociationRule>> {
        let single = |item: &str| {
            itemsets
                .iter()
                .find(|s| s.items.len() == 1 && s.items[0] == item)
                .map(|s| s.support)
        };

        let mut rules = Vec::new();
        for pair in itemsets.iter().filter(|s| s.items.len() == 2) {
            let (a, b) = (&pair.items[0], &pair.items[1]);
            let (Some(support_a), Some(support_b)) = (single(a), single(b)) else {
                continue;
            };
            for (from, to, from_support, to_support) in
                [(a, b, support_a, support_b), (b, a, support_b, support_a)]
            {
                let confidence = pair.support / from_support;
                let rule = AssociationRule::new(
                    [from.as_str()],
                    [to.as_str()],
                    pair.support,
                    confidence,
                    confidence / to_support,
                );
                if rule.metric(metric) >= min_threshold {
                    rules.push(rule);
                }
            }
        }
        Ok(rules)
    }
}

/// Hands back a fixed rule set regardless of input
#[derive(Debug, Clone)]
pub struct FixedRules(pub Vec<AssociationRule>);

impl FrequentItemsetMiner for FixedRules {
    fn mine(
        &self,
        _matrix: &BasketMatrix,
        _min_support: f64,
        _cancel: &CancellationFlag,
    ) -> Result<Vec<FrequentItemset>> {
        Ok(vec![FrequentItemset::new(["placeholder"], 1.0)])
    }
}

impl RuleDeriver for FixedRules {
    fn derive(
        &self,
        _itemsets: &[FrequentItemset],
        _metric: RuleMetric,
        _min_threshold: f64,
        _cancel: &CancellationFlag,
    ) -> Result<Vec<AssociationRule>> {
        Ok(self.0.clone())
    }
}

/// Never returns and ignores cancellation
#[derive(Debug, Default)]
pub struct HangingMiner;

impl FrequentItemsetMiner for HangingMiner {
    fn name(&self) -> &str {
        "hanging_miner"
    }

    fn mine(
        &self,
        _matrix: &BasketMatrix,
        _min_support: f64,
        _cancel: &CancellationFlag,
    ) -> Result<Vec<FrequentItemset>> {
        loop {
            thread::park();
        }
    }
}

/// Always fails
#[derive(Debug, Default)]
pub struct FailingMiner;

impl FrequentItemsetMiner for FailingMiner {
    fn name(&self) -> &str {
        "failing_miner"
    }

    fn mine(
        &self,
        _matrix: &BasketMatrix,
        _min_support: f64,
        _cancel: &CancellationFlag,
    ) -> Result<Vec<FrequentItemset>> {
        Err(MiningError::primitive("failing_miner", "out of memory"))
    }
}

/// Source whose reads always fail
#[derive(Debug, Default)]
pub struct FailingOrderSource;

#[async_trait]
impl OrderSource for FailingOrderSource {
    async fn fetch_order_lines(
        &self,
        _days_back: Option<u32>,
    ) -> std::result::Result<Vec<OrderLine>, StorageError> {
        Err(StorageError::Connection("connection refused".to_string()))
    }
}

/// Sink whose writes always fail
#[derive(Debug, Default)]
pub struct FailingSink;

#[async_trait]
impl RecommendationSink for FailingSink {
    async fn replace_all(
        &self,
        _pairs: &[ScoredPair],
    ) -> std::result::Result<u64, StorageError> {
        Err(StorageError::Unavailable("read-only replica".to_string()))
    }

    async fn recommendations_for(
        &self,
        _main_item_id: &str,
        _limit: usize,
    ) -> std::result::Result<Vec<StoredRecommendation>, StorageError> {
        Err(StorageError::Unavailable("read-only replica".to_string()))
    }
}
