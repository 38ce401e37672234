//! # Services
//!
//! Background producers that drive the task registry.

pub mod mining_service;

pub use mining_service::{DisplayRow, MiningRequest, MiningService, MiningStats, MiningSummary};
