//! Error types for the mining core.
//!

use crate::config::ConfigurationError;
use thiserror::Error;

/// Errors raised by the mining pipeline and scoring engine.
///
/// Empty inputs and mining timeouts are *not* errors; they surface as an
/// empty [`PipelineOutcome`](crate::mining::PipelineOutcome) instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MiningError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Mining primitive '{primitive}' failed: {reason}")]
    Primitive { primitive: String, reason: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MiningError {
    pub fn primitive<P: Into<String>, R: std::fmt::Display>(primitive: P, reason: R) -> Self {
        Self::Primitive {
            primitive: primitive.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ConfigurationError> for MiningError {
    fn from(error: ConfigurationError) -> Self {
        MiningError::Configuration(error.to_string())
    }
}

impl From<serde_json::Error> for MiningError {
    fn from(error: serde_json::Error) -> Self {
        MiningError::Internal(format!("JSON serialization error: {error}"))
    }
}

impl From<crate::storage::StorageError> for MiningError {
    fn from(error: crate::storage::StorageError) -> Self {
        MiningError::Storage(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MiningError>;
