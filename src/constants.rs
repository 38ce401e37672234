//! # System Constants
//!
//! Defaults, task type labels and progress checkpoints shared by the mining
//! pipeline and the background mining service.

/// Temporal stability used when no temporal signal was computed
pub const NEUTRAL_TEMPORAL_STABILITY: f64 = 0.5;

/// Temporal trend used when no temporal signal was computed
pub const NEUTRAL_TEMPORAL_TREND: f64 = 0.0;

/// Task type labels
pub mod task_types {
    pub const ASSOCIATION_MINING: &str = "association_mining";
}

/// Progress checkpoints reported on a mining task.
///
/// The service owns the outer checkpoints, the pipeline reports the ones in
/// between. Values only ever increase.
pub mod progress {
    pub const FETCHING_ORDERS: f64 = 0.1;
    pub const PIPELINE_STARTED: f64 = 0.2;
    pub const TIME_WEIGHTING: f64 = 0.25;
    pub const BUILDING_TRANSACTIONS: f64 = 0.3;
    pub const MINING_RULES: f64 = 0.4;
    pub const TEMPORAL_SIGNALS: f64 = 0.6;
    pub const BUILDING_RECOMMENDATIONS: f64 = 0.7;
    pub const PROCESSING_RESULTS: f64 = 0.8;
    pub const SAVING_RESULTS: f64 = 0.9;
}

/// Task messages visible to a polling caller
pub mod messages {
    pub const TASK_FAILED: &str = "Task failed";
    pub const TASK_CANCELLED: &str = "Task cancelled";
    pub const MINING_INITIALIZING: &str = "Initializing mining process...";
    pub const FETCHING_ORDERS: &str = "Fetching order data...";
    pub const NO_DATA: &str = "Mining completed: no order data found";
    pub const PROCESSING_RESULTS: &str = "Processing recommendations...";
    pub const SAVING_RESULTS: &str = "Saving recommendations to database...";
    pub const NO_RECOMMENDATIONS: &str = "Mining completed but no recommendations generated";
}
