//! # Scoring Engine
//!
//! Turns the raw statistics of an association rule (support, confidence,
//! lift and, when available, temporal stability and trend) into one
//! comparable score, and rescales finished scores into the band used for
//! persistence and display.
//!
//! ## Strategies
//!
//! ```text
//! weighted_product            c^wc * l^wl * s^ws on raw values
//! weighted_sum                min-max(c, l, s) weighted sum
//! normalized_product          min-max(c, l, s) product
//! temporal_weighted           min-max(c, l, s, stability) + (trend+1)/2, weighted sum
//! temporal_trend_focused      min-max(c, l, s) product + max(0, trend) * 0.5
//! temporal_stability_focused  min-max(c, l, s, stability) with fixed weights
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use affinity_core::scoring::{normalize_for_persistence, RuleMetrics, ScoringStrategy};
//!
//! let strategy: ScoringStrategy = "weighted_sum".parse().unwrap();
//! let rows = vec![
//!     RuleMetrics::new(0.8, 2.0, 0.3),
//!     RuleMetrics::new(0.5, 1.2, 0.1),
//! ];
//! let raw = strategy.score(&rows);
//! let stored = normalize_for_persistence(&raw);
//! assert!((stored[0] - 0.999).abs() < 1e-12);
//! assert!((stored[1] - 0.001).abs() < 1e-12);
//! ```

pub mod normalize;
pub mod strategy;

pub use normalize::{
    min_max_scale, normalize_for_persistence, ScoreRange, PERSISTENCE_SCORE_CEILING,
    PERSISTENCE_SCORE_FLOOR, UNIFORM_SCORE,
};
pub use strategy::{RuleMetrics, ScoreTarget, ScoringStrategy, ScoringWeights, TemporalWeights};
