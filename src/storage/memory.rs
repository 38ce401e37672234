//! In-process storage, for tests and database-less runs.
//!
//! ```rust
//! use affinity_core::storage::{MemoryRecommendationSink, RecommendationSink, ScoredPair};
//!
//! # tokio_test::block_on(async {
//! let sink = MemoryRecommendationSink::new();
//! let pairs = vec![
//!     ScoredPair { main_item_id: "a".into(), recommended_item_id: "b".into(), score: 0.999 },
//!     ScoredPair { main_item_id: "a".into(), recommended_item_id: "c".into(), score: 0.001 },
//! ];
//! assert_eq!(sink.replace_all(&pairs).await.unwrap(), 2);
//!
//! let top = sink.recommendations_for("a", 1).await.unwrap();
//! assert_eq!(top[0].recommended_item_id, "b");
//! assert_eq!(top[0].rank, 1);
//! # });
//! ```

use super::{OrderSource, RecommendationSink, ScoredPair, StorageError, StoredRecommendation};
use crate::mining::OrderLine;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Order source backed by a fixed list of lines
#[derive(Debug, Clone, Default)]
pub struct MemoryOrderSource {
    lines: Vec<OrderLine>,
}

impl MemoryOrderSource {
    pub fn new(lines: Vec<OrderLine>) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl OrderSource for MemoryOrderSource {
    async fn fetch_order_lines(
        &self,
        days_back: Option<u32>,
    ) -> Result<Vec<OrderLine>, StorageError> {
        let Some(days) = days_back else {
            return Ok(self.lines.clone());
        };

        let cutoff = Utc::now().date_naive() - Duration::days(i64::from(days));
        Ok(self
            .lines
            .iter()
            .filter(|line| line.observed_at.date_naive() >= cutoff)
            .cloned()
            .collect())
    }
}

/// Sink keeping the last written batch in memory
#[derive(Debug, Default)]
pub struct MemoryRecommendationSink {
    stored: Mutex<Vec<ScoredPair>>,
    writes: Mutex<usize>,
}

impl MemoryRecommendationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<ScoredPair> {
        self.stored.lock().clone()
    }

    /// Number of `replace_all` calls so far
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

#[async_trait]
impl RecommendationSink for MemoryRecommendationSink {
    async fn replace_all(&self, pairs: &[ScoredPair]) -> Result<u64, StorageError> {
        let mut seen = HashSet::new();
        let kept: Vec<ScoredPair> = pairs
            .iter()
            .filter(|p| seen.insert((p.main_item_id.clone(), p.recommended_item_id.clone())))
            .cloned()
            .collect();

        let inserted = kept.len() as u64;
        *self.stored.lock() = kept;
        *self.writes.lock() += 1;
        Ok(inserted)
    }

    async fn recommendations_for(
        &self,
        main_item_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecommendation>, StorageError> {
        let mut matches: Vec<ScoredPair> = self
            .stored
            .lock()
            .iter()
            .filter(|p| p.main_item_id == main_item_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(matches
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, p)| StoredRecommendation {
                recommended_item_id: p.recommended_item_id,
                score: p.score,
                rank: i as u32 + 1,
            })
            .collect())
    }
}
