#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Affinity Core
//!
//! Background association-rule mining and scoring for item-to-item
//! recommendations ("customers buying A also buy B").
//!
//! ## Overview
//!
//! Historical order lines are turned into recency-weighted transactions,
//! mined for association rules under a wall-clock budget, scored, ranked per
//! item and written to a recommendation store. The whole run is tracked as a
//! background task that a caller can poll for progress.
//!
//! ## Module Organization
//!
//! - [`tasks`] - Task registry and lifecycle records
//! - [`mining`] - Transactions, adaptive support, supervised primitives, temporal signals
//! - [`recommendations`] - Pair expansion and dense ranking
//! - [`scoring`] - Composite scoring strategies and persistence normalization
//! - [`storage`] - Order source and recommendation sink contracts, PostgreSQL adapter
//! - [`services`] - The background mining producer
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - Structured console and JSON file logging
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use affinity_core::config::ConfigManager;
//! use affinity_core::mining::{FrequentItemsetMiner, RuleDeriver};
//! use affinity_core::services::{MiningRequest, MiningService};
//! use affinity_core::storage::{OrderSource, RecommendationSink};
//! use affinity_core::tasks::TaskRegistry;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     source: Arc<dyn OrderSource>,
//! #     sink: Arc<dyn RecommendationSink>,
//! #     miner: Arc<dyn FrequentItemsetMiner>,
//! #     deriver: Arc<dyn RuleDeriver>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! affinity_core::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//! let config = manager.config().clone();
//!
//! let registry = Arc::new(TaskRegistry::new());
//! let _cleanup = TaskRegistry::spawn_cleanup_loop(
//!     Arc::clone(&registry),
//!     config.tasks.cleanup_interval(),
//!     config.tasks.max_age(),
//! );
//!
//! let service = MiningService::new(config, Arc::clone(&registry), source, sink, miner, deriver)?;
//! let task_id = service.submit(MiningRequest {
//!     days_back: Some(90),
//!     ..MiningRequest::default()
//! })?;
//!
//! if let Some(record) = registry.get(&task_id) {
//!     println!("{} {:.0}% {}", record.status, record.progress * 100.0, record.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod mining;
pub mod recommendations;
pub mod scoring;
pub mod services;
pub mod storage;
pub mod tasks;

pub use config::{AffinityConfig, ConfigManager, ConfigurationError};
pub use error::{MiningError, Result};
pub use mining::{
    AssociationRule, CancellationFlag, EmptyReason, FrequentItemset, FrequentItemsetMiner,
    MiningPipeline, OrderLine, PipelineOutcome, PipelineSettings, ProgressReporter, RuleDeriver,
    RuleMetric, TimeSegmentation,
};
pub use recommendations::Recommendation;
pub use scoring::{normalize_for_persistence, ScoringStrategy};
pub use services::{MiningRequest, MiningService};
pub use storage::{OrderSource, RecommendationSink, ScoredPair, StorageError};
pub use tasks::{TaskError, TaskRecord, TaskRegistry, TaskStatus};
