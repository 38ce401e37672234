//! Score normalization helpers.
//!
//! [`normalize_for_persistence`] is the only place the storage band is
//! computed. The sink and the display payload both call it so the scores a
//! caller sees are the scores that were written.

use serde::{Deserialize, Serialize};

/// Lowest score written to a permanent store.
pub const PERSISTENCE_SCORE_FLOOR: f64 = 0.001;

/// Highest score written to a permanent store.
pub const PERSISTENCE_SCORE_CEILING: f64 = 0.999;

/// Score assigned to every row of a batch whose raw scores are all equal.
pub const UNIFORM_SCORE: f64 = 0.5;

const PERSISTENCE_SCORE_SPAN: f64 = PERSISTENCE_SCORE_CEILING - PERSISTENCE_SCORE_FLOOR;

/// Min-max scale a column into [0, 1].
///
/// A constant column scales to all zeros rather than dividing by zero.
pub fn min_max_scale(values: &[f64]) -> Vec<f64> {
    let Some((min, max)) = bounds(values) else {
        return Vec::new();
    };

    let range = max - min;
    if range <= 0.0 {
        return vec![0.0; values.len()];
    }

    values.iter().map(|v| (v - min) / range).collect()
}

/// Rescale raw composite scores into `[0.001, 0.999]`.
///
/// `0.001 + (score - min) / (max - min) * 0.998`; when every score in the
/// batch is identical each one becomes [`UNIFORM_SCORE`].
pub fn normalize_for_persistence(scores: &[f64]) -> Vec<f64> {
    let Some((min, max)) = bounds(scores) else {
        return Vec::new();
    };

    if max <= min {
        return vec![UNIFORM_SCORE; scores.len()];
    }

    let range = max - min;
    scores
        .iter()
        .map(|score| PERSISTENCE_SCORE_FLOOR + (score - min) / range * PERSISTENCE_SCORE_SPAN)
        .collect()
}

/// Observed range of a batch of normalized scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    /// Range of `scores`, or `None` for an empty batch
    pub fn of(scores: &[f64]) -> Option<Self> {
        bounds(scores).map(|(min, max)| Self { min, max })
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self {
            min: PERSISTENCE_SCORE_FLOOR,
            max: PERSISTENCE_SCORE_CEILING,
        }
    }
}

fn bounds(values: &[f64]) -> Option<(f64, f64)> {
    let mut iter = values.iter().copied();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(min, max), v| (min.min(v), max.max(v))))
}
