//! # Mining
//!
//! Everything between raw order lines and association rules: transaction
//! building, adaptive support selection, the supervised primitive calls and
//! the temporal analysis that annotates the resulting rules.

pub mod matrix;
pub mod pipeline;
pub mod primitives;
pub mod supervisor;
pub mod support;
pub mod temporal;
pub mod transactions;

pub use matrix::BasketMatrix;
pub use pipeline::{
    EmptyReason, MiningPipeline, PipelineOutcome, PipelineSettings, PipelineStats, ProgressReporter,
};
pub use primitives::{
    AssociationRule, CancellationFlag, FrequentItemset, FrequentItemsetMiner, RuleDeriver,
    RuleMetric,
};
pub use supervisor::{MiningReport, MiningThresholds, TimeoutSupervisedMiner};
pub use support::{select_support, AdaptiveSupport, SupportTier};
pub use temporal::{TemporalAnalyzer, TemporalSignal, TimeSegmentation};
pub use transactions::{ItemCatalog, OrderLine, Transaction, TransactionBuilder, TransactionSet};
