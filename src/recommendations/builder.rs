use super::Recommendation;
use crate::mining::{AssociationRule, ItemCatalog};
use crate::scoring::{RuleMetrics, ScoreTarget, ScoringStrategy};
use std::collections::BTreeMap;
use tracing::info;

/// Expands rules into ranked item pairs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendationBuilder {
    max_recommendations: usize,
    strategy: Option<ScoringStrategy>,
}

impl RecommendationBuilder {
    pub fn new(max_recommendations: usize) -> Self {
        Self {
            max_recommendations,
            strategy: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Option<ScoringStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Column that ranks the output
    pub fn score_target(&self) -> ScoreTarget {
        self.strategy
            .map(|s| s.target())
            .unwrap_or(ScoreTarget::CompositeScore)
    }

    /// Emit one recommendation per (antecedent, consequent) pair of every
    /// rule, then dense-rank per main item and keep `rank <= max`.
    pub fn build(&self, rules: &[AssociationRule], catalog: &ItemCatalog) -> Vec<Recommendation> {
        let strategy_scores = self.strategy.map(|strategy| {
            let rows: Vec<RuleMetrics> = rules.iter().map(rule_metrics).collect();
            strategy.score(&rows)
        });
        let target = self.score_target();

        let mut emitted = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            let base_score = rule.confidence * rule.lift;
            let signal = rule.temporal.unwrap_or_default();
            let (composite_score, temporal_composite_score) =
                match (strategy_scores.as_ref(), target) {
                    (Some(scores), ScoreTarget::CompositeScore) => (scores[index], base_score),
                    (Some(scores), ScoreTarget::TemporalCompositeScore) => {
                        (base_score, scores[index])
                    }
                    (None, _) => (base_score, base_score),
                };

            for antecedent in &rule.antecedents {
                for consequent in &rule.consequents {
                    emitted.push(Recommendation {
                        main_item_id: catalog.id_for(antecedent).to_string(),
                        main_item_name: antecedent.clone(),
                        recommended_item_id: catalog.id_for(consequent).to_string(),
                        recommended_item_name: consequent.clone(),
                        confidence: rule.confidence,
                        lift: rule.lift,
                        support: rule.support,
                        composite_score,
                        temporal_stability: signal.stability,
                        temporal_trend: signal.trend,
                        temporal_composite_score,
                        rank: 0,
                    });
                }
            }
        }

        let emitted_count = emitted.len();
        let ranked = rank_and_truncate(emitted, target, self.max_recommendations);

        info!(
            rules = rules.len(),
            emitted = emitted_count,
            kept = ranked.len(),
            strategy = self.strategy.map(|s| s.name()).unwrap_or("confidence_lift"),
            "Created recommendations"
        );
        ranked
    }
}

fn rule_metrics(rule: &AssociationRule) -> RuleMetrics {
    let metrics = RuleMetrics::new(rule.confidence, rule.lift, rule.support);
    match rule.temporal {
        Some(signal) => metrics.with_temporal(signal.stability, signal.trend),
        None => metrics,
    }
}

/// Dense ranks (1, 1, 2, ...) for `scores` in descending order.
///
/// Output is index-aligned with the input; equal scores share a rank.
pub fn dense_rank(scores: &[f64]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut ranks = vec![0; scores.len()];
    let mut rank = 0;
    let mut previous: Option<f64> = None;
    for index in order {
        if previous != Some(scores[index]) {
            rank += 1;
            previous = Some(scores[index]);
        }
        ranks[index] = rank;
    }
    ranks
}

/// Group by main item, dense-rank each group and drop ranks above `max`
fn rank_and_truncate(
    recommendations: Vec<Recommendation>,
    target: ScoreTarget,
    max: usize,
) -> Vec<Recommendation> {
    let mut groups: BTreeMap<String, Vec<Recommendation>> = BTreeMap::new();
    for recommendation in recommendations {
        groups
            .entry(recommendation.main_item_id.clone())
            .or_default()
            .push(recommendation);
    }

    let mut ranked = Vec::new();
    for (_, mut group) in groups {
        let scores: Vec<f64> = group.iter().map(|r| r.ranking_score(target)).collect();
        for (recommendation, rank) in group.iter_mut().zip(dense_rank(&scores)) {
            recommendation.rank = rank;
        }
        group.retain(|r| r.rank as usize <= max);
        group.sort_by_key(|r| r.rank);
        ranked.extend(group);
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::{OrderLine, TemporalSignal};
    use chrono::Utc;
    use proptest::prelude::*;

    fn catalog() -> ItemCatalog {
        let now = Utc::now();
        ItemCatalog::from_lines(&[
            OrderLine::new("1", "100", "coffee", now),
            OrderLine::new("1", "200", "milk", now),
            OrderLine::new("1", "300", "sugar", now),
        ])
    }

    #[test]
    fn test_dense_rank_ties_share_rank() {
        assert_eq!(dense_rank(&[0.9, 0.9, 0.5]), vec![1, 1, 2]);
        assert_eq!(dense_rank(&[0.1, 0.7, 0.7, 0.3]), vec![3, 1, 1, 2]);
        assert!(dense_rank(&[]).is_empty());
    }

    #[test]
    fn test_pairs_expanded_with_catalog_ids() {
        let rules = vec![AssociationRule::new(
            ["coffee", "sugar"],
            ["milk", "cream"],
            0.2,
            0.5,
            2.0,
        )];
        let recs = RecommendationBuilder::new(10).build(&rules, &catalog());

        assert_eq!(recs.len(), 4);
        let coffee: Vec<_> = recs.iter().filter(|r| r.main_item_id == "100").collect();
        assert_eq!(coffee.len(), 2);
        // Unknown names fall back to themselves
        assert!(coffee.iter().any(|r| r.recommended_item_id == "cream"));
        assert!(recs.iter().all(|r| r.composite_score == 1.0));
        assert!(recs.iter().all(|r| r.temporal_composite_score == 1.0));
        assert!(recs.iter().all(|r| r.temporal_stability == 0.5 && r.temporal_trend == 0.0));
        assert!(recs.iter().all(|r| r.rank == 1));
    }

    #[test]
    fn test_ranking_and_truncation_per_main_item() {
        let rules = vec![
            AssociationRule::new(["coffee"], ["milk"], 0.3, 0.9, 1.0),
            AssociationRule::new(["coffee"], ["sugar"], 0.3, 0.9, 1.0),
            AssociationRule::new(["coffee"], ["cream"], 0.3, 0.5, 1.0),
            AssociationRule::new(["coffee"], ["cake"], 0.3, 0.4, 1.0),
            AssociationRule::new(["milk"], ["coffee"], 0.3, 0.6, 1.0),
        ];
        let recs = RecommendationBuilder::new(2).build(&rules, &catalog());

        let coffee: Vec<(&str, u32)> = recs
            .iter()
            .filter(|r| r.main_item_name == "coffee")
            .map(|r| (r.recommended_item_name.as_str(), r.rank))
            .collect();
        assert_eq!(coffee, vec![("milk", 1), ("sugar", 1), ("cream", 2)]);

        // Output is grouped by main item id, then rank
        assert_eq!(recs[0].main_item_id, "100");
        assert_eq!(recs.last().unwrap().main_item_id, "200");
    }

    #[test]
    fn test_strategy_overrides_composite_score() {
        let rules = vec![
            AssociationRule::new(["coffee"], ["milk"], 0.1, 0.9, 1.0),
            AssociationRule::new(["coffee"], ["sugar"], 0.4, 0.5, 1.5),
        ];
        let builder = RecommendationBuilder::new(5)
            .with_strategy(Some(ScoringStrategy::WeightedProduct(Default::default())));
        let recs = builder.build(&rules, &catalog());

        let expected = 0.5f64.powf(0.4) * 1.5f64.powf(0.4) * 0.4f64.powf(0.2);
        let sugar = recs.iter().find(|r| r.recommended_item_name == "sugar").unwrap();
        assert!((sugar.composite_score - expected).abs() < 1e-12);
        assert!((sugar.temporal_composite_score - 0.75).abs() < 1e-12);
        assert_eq!(sugar.rank, 1);
    }

    #[test]
    fn test_temporal_strategy_ranks_by_temporal_score() {
        let mut rising = AssociationRule::new(["coffee"], ["milk"], 0.2, 0.5, 1.0);
        rising.temporal = Some(TemporalSignal {
            stability: 0.5,
            trend: 0.8,
        });
        let mut flat = AssociationRule::new(["coffee"], ["sugar"], 0.2, 0.5, 1.0);
        flat.temporal = Some(TemporalSignal {
            stability: 0.5,
            trend: 0.0,
        });

        let builder = RecommendationBuilder::new(5)
            .with_strategy(Some(ScoringStrategy::TemporalTrendFocused));
        assert_eq!(builder.score_target(), ScoreTarget::TemporalCompositeScore);

        let recs = builder.build(&[flat, rising], &catalog());
        assert_eq!(recs[0].recommended_item_name, "milk");
        assert_eq!(recs[0].rank, 1);
        assert_eq!(recs[1].rank, 2);
        assert_eq!(recs[0].temporal_trend, 0.8);
        // Standard column keeps confidence * lift
        assert_eq!(recs[0].composite_score, 0.5);
    }

    proptest! {
        #[test]
        fn prop_dense_ranks_are_contiguous(scores in prop::collection::vec(0.0f64..10.0, 1..40)) {
            let ranks = dense_rank(&scores);
            let max_rank = *ranks.iter().max().unwrap();
            for expected in 1..=max_rank {
                prop_assert!(ranks.contains(&expected));
            }
            for i in 0..scores.len() {
                for j in 0..scores.len() {
                    if scores[i] > scores[j] {
                        prop_assert!(ranks[i] < ranks[j]);
                    } else if scores[i] == scores[j] {
                        prop_assert_eq!(ranks[i], ranks[j]);
                    }
                }
            }
        }
    }
}
