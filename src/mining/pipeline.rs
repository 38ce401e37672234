//! # Mining Pipeline
//!
//! Single entry point a background producer calls: order lines in, ranked
//! recommendations out.
//!
//! ```text
//! order lines ─▶ TransactionBuilder ─▶ BasketMatrix ─▶ select_support
//!                                                         │
//!            RecommendationBuilder ◀─ TemporalAnalyzer ◀─ TimeoutSupervisedMiner
//! ```
//!
//! Empty intermediate results end the run early with an [`EmptyReason`]
//! rather than an error.

use super::matrix::BasketMatrix;
use super::primitives::{FrequentItemsetMiner, RuleDeriver};
use super::support::{select_support, AdaptiveSupport};
use super::supervisor::{MiningThresholds, TimeoutSupervisedMiner};
use super::temporal::{TemporalAnalyzer, TimeSegmentation};
use super::transactions::{OrderLine, TransactionBuilder};
use crate::config::{AffinityConfig, MiningConfig};
use crate::constants::progress;
use crate::error::Result;
use crate::logging::log_pipeline_stage;
use crate::recommendations::{Recommendation, RecommendationBuilder};
use crate::scoring::ScoringStrategy;
use crate::tasks::TaskRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Why a run produced no recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    NoTransactions,
    NoItemsets,
    NoRules,
    BelowConfidence,
    TimedOut,
}

impl EmptyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTransactions => "no_transactions",
            Self::NoItemsets => "no_itemsets",
            Self::NoRules => "no_rules",
            Self::BelowConfidence => "below_confidence",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub min_support: f64,
    pub min_confidence: f64,
    pub min_lift: f64,
    pub max_recommendations: usize,
    pub decay_rate: f64,
    /// `None` ranks by `confidence * lift`
    pub scoring: Option<ScoringStrategy>,
    /// `None` skips the temporal analyzer and uses neutral signals
    pub temporal: Option<TimeSegmentation>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let mining = MiningConfig::default();
        Self {
            min_support: mining.min_support,
            min_confidence: mining.min_confidence,
            min_lift: mining.min_lift,
            max_recommendations: mining.max_recommendations,
            decay_rate: mining.decay_rate,
            scoring: None,
            temporal: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AffinityConfig) -> Result<Self> {
        let temporal = if config.temporal.enabled {
            Some(config.temporal.segmentation()?)
        } else {
            None
        };

        Ok(Self {
            min_support: config.mining.min_support,
            min_confidence: config.mining.min_confidence,
            min_lift: config.mining.min_lift,
            max_recommendations: config.mining.max_recommendations,
            decay_rate: config.mining.decay_rate,
            scoring: config.scoring.strategy()?,
            temporal,
        })
    }
}

/// Progress sink for one task, or nothing when run outside a task
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    target: Option<(Arc<TaskRegistry>, String)>,
}

impl ProgressReporter {
    pub fn for_task(registry: Arc<TaskRegistry>, task_id: impl Into<String>) -> Self {
        Self {
            target: Some((registry, task_id.into())),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.target.as_ref().map(|(_, id)| id.as_str())
    }

    pub fn report(&self, progress: f64, message: &str) {
        if let Some((registry, task_id)) = &self.target {
            registry.update_progress(task_id, progress, message);
        }
    }
}

/// Counters describing a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub order_lines: usize,
    pub total_orders: usize,
    pub transactions: usize,
    pub distinct_items: usize,
    pub support: Option<AdaptiveSupport>,
    pub itemsets: usize,
    pub rules: usize,
    pub elapsed_ms: u64,
}

/// Result of [`MiningPipeline::run`]
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    /// Ordered by main item then rank
    pub recommendations: Vec<Recommendation>,
    pub stats: PipelineStats,
    pub empty_reason: Option<EmptyReason>,
}

impl PipelineOutcome {
    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }
}

/// Orders to ranked recommendations under a time budget
#[derive(Debug, Clone)]
pub struct MiningPipeline {
    settings: PipelineSettings,
    miner: TimeoutSupervisedMiner,
}

impl MiningPipeline {
    pub fn new(
        settings: PipelineSettings,
        miner: Arc<dyn FrequentItemsetMiner>,
        deriver: Arc<dyn RuleDeriver>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            settings,
            miner: TimeoutSupervisedMiner::new(miner, deriver, poll_interval),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Same primitives, different parameters
    pub fn with_settings(&self, settings: PipelineSettings) -> Self {
        Self {
            settings,
            miner: self.miner.clone(),
        }
    }

    pub async fn run(
        &self,
        lines: &[OrderLine],
        timeout: Duration,
        reporter: &ProgressReporter,
    ) -> Result<PipelineOutcome> {
        let started = Instant::now();
        let task_id = reporter.task_id();
        let mut stats = PipelineStats {
            order_lines: lines.len(),
            ..PipelineStats::default()
        };

        info!(
            task_id = task_id,
            order_lines = lines.len(),
            timeout_secs = timeout.as_secs(),
            "🚀 Starting mining pipeline"
        );
        reporter.report(progress::PIPELINE_STARTED, "Starting mining pipeline");

        reporter.report(progress::TIME_WEIGHTING, "Applying time weighting");
        let transaction_set = TransactionBuilder::new(self.settings.decay_rate).build(lines);
        stats.total_orders = transaction_set.total_orders;
        stats.transactions = transaction_set.len();
        stats.distinct_items = transaction_set.distinct_items;

        reporter.report(progress::BUILDING_TRANSACTIONS, "Creating transactions");
        log_pipeline_stage(
            "transactions",
            task_id,
            started.elapsed().as_millis(),
            Some(format!("{} transactions", transaction_set.len()).as_str()),
        );
        if transaction_set.is_empty() {
            warn!(task_id = task_id, "No transactions created");
            return Ok(Self::finish_empty(EmptyReason::NoTransactions, stats, started));
        }

        let matrix = Arc::new(BasketMatrix::from_transactions(&transaction_set.transactions));
        let support = select_support(
            matrix.num_items(),
            matrix.num_transactions(),
            self.settings.min_support,
        );
        stats.support = Some(support);

        reporter.report(progress::MINING_RULES, "Mining association rules");
        let remaining = timeout.saturating_sub(started.elapsed());
        let report = self
            .miner
            .mine(
                matrix,
                MiningThresholds {
                    min_support: support.min_support,
                    min_lift: self.settings.min_lift,
                    min_confidence: self.settings.min_confidence,
                },
                remaining,
            )
            .await?;
        stats.itemsets = report.itemset_count;
        log_pipeline_stage(
            "mining",
            task_id,
            started.elapsed().as_millis(),
            Some(
                format!(
                    "{} itemsets, {} rules kept",
                    report.itemset_count,
                    report.rules.len()
                )
                .as_str(),
            ),
        );

        if let Some(reason) = report.empty_reason {
            warn!(task_id = task_id, reason = %reason, "Mining produced no rules");
            return Ok(Self::finish_empty(reason, stats, started));
        }

        let mut rules = report.rules;
        stats.rules = rules.len();

        if let Some(segmentation) = self.settings.temporal {
            reporter.report(progress::TEMPORAL_SIGNALS, "Computing temporal signals");
            TemporalAnalyzer::new(segmentation).annotate(&mut rules, &transaction_set.transactions);
        }

        reporter.report(progress::BUILDING_RECOMMENDATIONS, "Creating recommendations");
        let recommendations = RecommendationBuilder::new(self.settings.max_recommendations)
            .with_strategy(self.settings.scoring)
            .build(&rules, &transaction_set.catalog);

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            task_id = task_id,
            rules = rules.len(),
            recommendations = recommendations.len(),
            elapsed_ms = stats.elapsed_ms,
            "✅ Mining pipeline completed"
        );

        Ok(PipelineOutcome {
            empty_reason: recommendations.is_empty().then_some(EmptyReason::NoRules),
            recommendations,
            stats,
        })
    }

    fn finish_empty(
        reason: EmptyReason,
        mut stats: PipelineStats,
        started: Instant,
    ) -> PipelineOutcome {
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        PipelineOutcome {
            recommendations: Vec::new(),
            stats,
            empty_reason: Some(reason),
        }
    }
}
