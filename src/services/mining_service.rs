use crate::config::AffinityConfig;
use crate::constants::{messages, progress, task_types};
use crate::error::{MiningError, Result};
use crate::logging::log_error;
use crate::mining::{
    EmptyReason, FrequentItemsetMiner, MiningPipeline, PipelineOutcome, PipelineSettings,
    ProgressReporter, RuleDeriver, SupportTier, TimeSegmentation,
};
use crate::recommendations::Recommendation;
use crate::scoring::{normalize_for_persistence, ScoreRange, ScoreTarget, ScoringStrategy};
use crate::storage::{scored_pairs, OrderSource, RecommendationSink};
use crate::tasks::TaskRegistry;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Per-request overrides of the configured mining parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningRequest {
    /// Only mine orders from the last N days
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_back: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_support: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_segmentation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_temporal_signals: Option<bool>,
}

/// One row of the display payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRow {
    pub main_item_id: String,
    pub main_item_name: String,
    pub recommended_item_id: String,
    pub recommended_item_name: String,
    pub confidence: f64,
    pub lift: f64,
    pub support: f64,
    pub temporal_stability: f64,
    pub temporal_trend: f64,
    /// Normalized into `[0.001, 0.999]`, same value the sink stored
    pub score: f64,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningStats {
    /// Rows included in `rules`
    pub total_rules: usize,
    pub distinct_items: usize,
    pub total_orders: usize,
    pub score_range: ScoreRange,
    pub database_saved: bool,
    pub min_support: Option<f64>,
    pub support_tier: Option<SupportTier>,
    pub elapsed_ms: u64,
}

/// Result payload stored on a completed mining task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningSummary {
    pub recommendations_count: usize,
    pub mining_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_segmentation: Option<String>,
    pub stats: MiningStats,
    /// Best first, capped at the configured display limit
    pub rules: Vec<DisplayRow>,
}

impl MiningSummary {
    fn build(
        outcome: &PipelineOutcome,
        settings: &PipelineSettings,
        database_saved: bool,
        display_limit: usize,
    ) -> Self {
        let target = score_target(settings);
        let mut sorted: Vec<&Recommendation> = outcome.recommendations.iter().collect();
        sorted.sort_by(|a, b| b.ranking_score(target).total_cmp(&a.ranking_score(target)));

        let raw: Vec<f64> = sorted.iter().map(|r| r.ranking_score(target)).collect();
        let rules: Vec<DisplayRow> = sorted
            .iter()
            .zip(normalize_for_persistence(&raw))
            .take(display_limit)
            .map(|(r, score)| DisplayRow {
                main_item_id: r.main_item_id.clone(),
                main_item_name: r.main_item_name.clone(),
                recommended_item_id: r.recommended_item_id.clone(),
                recommended_item_name: r.recommended_item_name.clone(),
                confidence: r.confidence,
                lift: r.lift,
                support: r.support,
                temporal_stability: r.temporal_stability,
                temporal_trend: r.temporal_trend,
                score,
                rank: r.rank,
            })
            .collect();

        let displayed: Vec<f64> = rules.iter().map(|row| row.score).collect();
        Self {
            recommendations_count: outcome.recommendations.len(),
            mining_method: settings
                .scoring
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| "standard".to_string()),
            time_segmentation: settings.temporal.map(|s| s.to_string()),
            stats: MiningStats {
                total_rules: rules.len(),
                distinct_items: outcome.stats.distinct_items,
                total_orders: outcome.stats.total_orders,
                score_range: ScoreRange::of(&displayed).unwrap_or_default(),
                database_saved,
                min_support: outcome.stats.support.map(|s| s.min_support),
                support_tier: outcome.stats.support.map(|s| s.tier),
                elapsed_ms: outcome.stats.elapsed_ms,
            },
            rules,
        }
    }
}

fn score_target(settings: &PipelineSettings) -> ScoreTarget {
    settings
        .scoring
        .map(|s| s.target())
        .unwrap_or(ScoreTarget::CompositeScore)
}

/// Background producer: source, pipeline and sink driven on a tracked task
#[derive(Clone)]
pub struct MiningService {
    config: AffinityConfig,
    registry: Arc<TaskRegistry>,
    source: Arc<dyn OrderSource>,
    sink: Arc<dyn RecommendationSink>,
    pipeline: MiningPipeline,
}

impl std::fmt::Debug for MiningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiningService")
            .field("pipeline", &self.pipeline)
            .field("tasks", &self.registry.len())
            .finish()
    }
}

impl MiningService {
    pub fn new(
        config: AffinityConfig,
        registry: Arc<TaskRegistry>,
        source: Arc<dyn OrderSource>,
        sink: Arc<dyn RecommendationSink>,
        miner: Arc<dyn FrequentItemsetMiner>,
        deriver: Arc<dyn RuleDeriver>,
    ) -> Result<Self> {
        config.validate()?;
        let settings = PipelineSettings::from_config(&config)?;
        let pipeline = MiningPipeline::new(settings, miner, deriver, config.mining.poll_interval());

        Ok(Self {
            config,
            registry,
            source,
            sink,
            pipeline,
        })
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AffinityConfig {
        &self.config
    }

    /// Configured settings with the request's overrides applied
    pub fn settings_for(&self, request: &MiningRequest) -> Result<PipelineSettings> {
        let mut settings = self.pipeline.settings().clone();

        if let Some(min_support) = request.min_support {
            if !(min_support > 0.0 && min_support <= 1.0) {
                return Err(MiningError::InvalidInput(format!(
                    "min_support must be in (0, 1], got {min_support}"
                )));
            }
            settings.min_support = min_support;
        }
        if let Some(min_confidence) = request.min_confidence {
            if !(0.0..=1.0).contains(&min_confidence) {
                return Err(MiningError::InvalidInput(format!(
                    "min_confidence must be in [0, 1], got {min_confidence}"
                )));
            }
            settings.min_confidence = min_confidence;
        }
        if let Some(method) = &request.scoring_method {
            let strategy: ScoringStrategy = method.parse()?;
            settings.scoring = Some(strategy.with_weights(
                self.config.scoring.weights,
                self.config.scoring.temporal_weights,
            ));
        }

        let segmentation = match &request.time_segmentation {
            Some(name) => Some(name.parse::<TimeSegmentation>()?),
            None => None,
        };
        match request.use_temporal_signals {
            Some(false) => settings.temporal = None,
            Some(true) => {
                settings.temporal = Some(
                    segmentation
                        .or(settings.temporal)
                        .unwrap_or(self.config.temporal.segmentation()?),
                )
            }
            None => {
                if settings.temporal.is_some() {
                    settings.temporal = segmentation.or(settings.temporal);
                }
            }
        }

        Ok(settings)
    }

    /// Create a mining task and run it in the background; returns its id.
    ///
    /// Invalid overrides are rejected here, before any task is created.
    pub fn submit(&self, request: MiningRequest) -> Result<String> {
        self.submit_with_handle(request).map(|(task_id, _)| task_id)
    }

    /// Like [`submit`](Self::submit), also returning the producer's handle
    pub fn submit_with_handle(&self, request: MiningRequest) -> Result<(String, JoinHandle<()>)> {
        self.settings_for(&request)?;

        let metadata = match serde_json::to_value(&request)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let task_id = self
            .registry
            .create(task_types::ASSOCIATION_MINING, metadata);

        let service = self.clone();
        let producer_task_id = task_id.clone();
        let handle = tokio::spawn(async move {
            service.run_task(&producer_task_id, &request).await;
        });

        Ok((task_id, handle))
    }

    /// Run one mining task to a terminal state.
    ///
    /// Never returns an error: every failure is recorded on the task.
    pub async fn run_task(&self, task_id: &str, request: &MiningRequest) {
        self.registry.start(task_id, messages::MINING_INITIALIZING);

        if let Err(e) = self.execute(task_id, request).await {
            let error = format!("Error in mining task: {e:#}");
            log_error("mining_service", "run_task", &error, Some(task_id));
            self.registry.fail(task_id, &error, messages::TASK_FAILED);
        }
    }

    async fn execute(&self, task_id: &str, request: &MiningRequest) -> anyhow::Result<()> {
        let settings = self.settings_for(request)?;
        let reporter = ProgressReporter::for_task(Arc::clone(&self.registry), task_id);

        reporter.report(progress::FETCHING_ORDERS, messages::FETCHING_ORDERS);
        let lines = self
            .source
            .fetch_order_lines(request.days_back)
            .await
            .context("failed to fetch order lines")?;

        if lines.is_empty() {
            warn!(task_id = %task_id, days_back = request.days_back, "No order data found");
        }

        let outcome = self
            .pipeline
            .with_settings(settings.clone())
            .run(&lines, self.timeout(), &reporter)
            .await?;

        reporter.report(progress::PROCESSING_RESULTS, messages::PROCESSING_RESULTS);

        if outcome.is_empty() {
            warn!(
                task_id = %task_id,
                reason = ?outcome.empty_reason,
                "No recommendations generated"
            );
            let message = match outcome.empty_reason {
                Some(EmptyReason::NoTransactions) => messages::NO_DATA,
                _ => messages::NO_RECOMMENDATIONS,
            };
            self.registry
                .complete(task_id, Some(json!({ "recommendations_count": 0 })), message);
            return Ok(());
        }

        reporter.report(progress::SAVING_RESULTS, messages::SAVING_RESULTS);
        let pairs = scored_pairs(&outcome.recommendations, score_target(&settings));
        let database_saved = match self.sink.replace_all(&pairs).await {
            Ok(inserted) => {
                info!(task_id = %task_id, inserted = inserted, "Recommendations saved");
                true
            }
            Err(e) => {
                log_error("mining_service", "replace_all", &e.to_string(), Some(task_id));
                false
            }
        };

        let summary = MiningSummary::build(
            &outcome,
            &settings,
            database_saved,
            self.config.mining.display_limit,
        );
        let count = summary.recommendations_count;
        let message = if database_saved {
            format!("Mining completed: {count} recommendations generated and saved to database")
        } else {
            warn!(
                task_id = %task_id,
                count = count,
                "Recommendations generated but database save failed"
            );
            format!("Mining completed: {count} recommendations generated (database save failed)")
        };

        self.registry
            .complete(task_id, Some(serde_json::to_value(&summary)?), &message);
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.config.mining.pipeline_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::{
        AssociationRule, BasketMatrix, CancellationFlag, FrequentItemset, RuleMetric,
    };
    use crate::storage::{MemoryOrderSource, MemoryRecommendationSink};

    struct NoItemsets;

    impl FrequentItemsetMiner for NoItemsets {
        fn mine(
            &self,
            _matrix: &BasketMatrix,
            _min_support: f64,
            _cancel: &CancellationFlag,
        ) -> Result<Vec<FrequentItemset>> {
            Ok(Vec::new())
        }
    }

    impl RuleDeriver for NoItemsets {
        fn derive(
            &self,
            _itemsets: &[FrequentItemset],
            _metric: RuleMetric,
            _min_threshold: f64,
            _cancel: &CancellationFlag,
        ) -> Result<Vec<AssociationRule>> {
            Ok(Vec::new())
        }
    }

    fn test_service(config: AffinityConfig) -> MiningService {
        MiningService::new(
            config,
            Arc::new(TaskRegistry::new()),
            Arc::new(MemoryOrderSource::default()),
            Arc::new(MemoryRecommendationSink::new()),
            Arc::new(NoItemsets),
            Arc::new(NoItemsets),
        )
        .unwrap()
    }

    #[test]
    fn test_request_overrides() {
        let service = test_service(AffinityConfig::default());
        let settings = service
            .settings_for(&MiningRequest {
                min_support: Some(0.1),
                scoring_method: Some("temporal_weighted".to_string()),
                use_temporal_signals: Some(true),
                time_segmentation: Some("monthly".to_string()),
                ..MiningRequest::default()
            })
            .unwrap();

        assert_eq!(settings.min_support, 0.1);
        assert_eq!(settings.min_confidence, 0.4);
        assert_eq!(settings.temporal, Some(TimeSegmentation::Monthly));
        assert_eq!(
            settings.scoring.map(|s| s.name()),
            Some("temporal_weighted")
        );
    }

    #[test]
    fn test_temporal_defaults_to_configured_segmentation() {
        let service = test_service(AffinityConfig::default());
        let settings = service
            .settings_for(&MiningRequest {
                use_temporal_signals: Some(true),
                ..MiningRequest::default()
            })
            .unwrap();
        assert_eq!(settings.temporal, Some(TimeSegmentation::Weekly));

        let mut config = AffinityConfig::default();
        config.temporal.enabled = true;
        let settings = test_service(config)
            .settings_for(&MiningRequest {
                use_temporal_signals: Some(false),
                ..MiningRequest::default()
            })
            .unwrap();
        assert_eq!(settings.temporal, None);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let service = test_service(AffinityConfig::default());
        let bad_method = MiningRequest {
            scoring_method: Some("magic".to_string()),
            ..MiningRequest::default()
        };
        assert!(matches!(
            service.settings_for(&bad_method),
            Err(MiningError::Configuration(_))
        ));

        let bad_support = MiningRequest {
            min_support: Some(1.5),
            ..MiningRequest::default()
        };
        assert!(matches!(
            service.settings_for(&bad_support),
            Err(MiningError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_request_metadata_omits_unset_fields() {
        let value = serde_json::to_value(MiningRequest {
            days_back: Some(30),
            ..MiningRequest::default()
        })
        .unwrap();
        assert_eq!(value, json!({ "days_back": 30 }));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = AffinityConfig::default();
        config.mining.max_recommendations = 0;
        let result = MiningService::new(
            config,
            Arc::new(TaskRegistry::new()),
            Arc::new(MemoryOrderSource::default()),
            Arc::new(MemoryRecommendationSink::new()),
            Arc::new(NoItemsets),
            Arc::new(NoItemsets),
        );
        assert!(matches!(result, Err(MiningError::Configuration(_))));
    }
}
