//! # Storage
//!
//! Collaborator contracts for reading order lines and persisting finished
//! recommendations, with an in-memory implementation and, behind the
//! `postgres` feature, a `sqlx` one.
//!
//! Sinks have replace-all semantics: every write clears the previous batch
//! before inserting the new one.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::mining::OrderLine;
use crate::recommendations::Recommendation;
use crate::scoring::{normalize_for_persistence, ScoreTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{MemoryOrderSource, MemoryRecommendationSink};
#[cfg(feature = "postgres")]
pub use postgres::PgStorage;

/// Storage-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query failed during {operation}: {reason}")]
    Query { operation: String, reason: String },
    #[error("Invalid table name '{0}'")]
    InvalidIdentifier(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn query<O: Into<String>, R: std::fmt::Display>(operation: O, reason: R) -> Self {
        Self::Query {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Connection(error.to_string())
            }
            other => StorageError::query("database", other),
        }
    }
}

/// One persisted `(main item, recommended item, normalized score)` triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPair {
    pub main_item_id: String,
    pub recommended_item_id: String,
    /// In `[0.001, 0.999]`
    pub score: f64,
}

/// A stored recommendation as read back for one main item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecommendation {
    pub recommended_item_id: String,
    pub score: f64,
    /// Position by descending score, starting at 1
    pub rank: u32,
}

/// Normalize ranking scores and pair them up for the sink.
///
/// Output is sorted by descending score so a sink that ignores duplicate
/// pairs keeps the best-scored one.
pub fn scored_pairs(recommendations: &[Recommendation], target: ScoreTarget) -> Vec<ScoredPair> {
    let raw: Vec<f64> = recommendations
        .iter()
        .map(|r| r.ranking_score(target))
        .collect();
    let normalized = normalize_for_persistence(&raw);

    let mut pairs: Vec<ScoredPair> = recommendations
        .iter()
        .zip(normalized)
        .map(|(r, score)| ScoredPair {
            main_item_id: r.main_item_id.clone(),
            recommended_item_id: r.recommended_item_id.clone(),
            score,
        })
        .collect();
    pairs.sort_by(|a, b| b.score.total_cmp(&a.score));
    pairs
}

/// Source of raw order lines
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Order lines joined with item names, optionally limited to the last
    /// `days_back` days
    async fn fetch_order_lines(
        &self,
        days_back: Option<u32>,
    ) -> Result<Vec<OrderLine>, StorageError>;
}

/// Persistent destination for finished recommendations
#[async_trait]
pub trait RecommendationSink: Send + Sync {
    /// Clear previous recommendations and write `pairs`; returns rows inserted
    async fn replace_all(&self, pairs: &[ScoredPair]) -> Result<u64, StorageError>;

    /// Stored recommendations for one main item, best first
    async fn recommendations_for(
        &self,
        main_item_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecommendation>, StorageError>;
}
