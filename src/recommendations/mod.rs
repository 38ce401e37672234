//! # Recommendations
//!
//! Directed item pairs derived from association rules, scored and ranked per
//! main item.

pub mod builder;

use crate::scoring::ScoreTarget;
use serde::{Deserialize, Serialize};

pub use builder::{dense_rank, RecommendationBuilder};

/// "Customers buying `main_item` also buy `recommended_item`"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub main_item_id: String,
    pub main_item_name: String,
    pub recommended_item_id: String,
    pub recommended_item_name: String,
    pub confidence: f64,
    pub lift: f64,
    pub support: f64,
    /// Unnormalized score; `confidence * lift` unless a standard strategy ran
    pub composite_score: f64,
    pub temporal_stability: f64,
    pub temporal_trend: f64,
    /// Unnormalized score; `confidence * lift` unless a temporal strategy ran
    pub temporal_composite_score: f64,
    /// Dense rank within the main item, starting at 1
    pub rank: u32,
}

impl Recommendation {
    pub fn ranking_score(&self, target: ScoreTarget) -> f64 {
        match target {
            ScoreTarget::CompositeScore => self.composite_score,
            ScoreTarget::TemporalCompositeScore => self.temporal_composite_score,
        }
    }
}
