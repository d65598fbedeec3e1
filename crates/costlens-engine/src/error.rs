//! Error types for the cost analytics engine.

use std::path::PathBuf;
use thiserror::Error;

/// Cost analytics engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A cost record is malformed (negative or non-finite cost, out of order)
    #[error("invalid record {resource_id}: {reason}")]
    InvalidRecord {
        /// Resource the record belongs to
        resource_id: String,
        /// What is wrong with it
        reason: String,
    },

    /// Too few usable feature columns to train the anomaly model
    #[error("insufficient features: {available} usable, {required} required")]
    InsufficientFeatures {
        /// Usable feature columns found
        available: usize,
        /// Minimum needed
        required: usize,
    },

    /// Too little history to train the forecaster
    #[error("insufficient history: {available} distinct days, need at least {required}")]
    InsufficientHistory {
        /// Distinct dates found
        available: usize,
        /// Minimum needed
        required: usize,
    },

    /// Inference requested before training
    #[error("{component} must be trained before {operation}")]
    NotTrained {
        /// Component name
        component: &'static str,
        /// Operation attempted
        operation: &'static str,
    },

    /// Forecast horizon beyond the configured maximum
    #[error("forecast horizon of {requested} days exceeds the maximum of {max}")]
    HorizonTooLong {
        /// Days requested
        requested: u32,
        /// Configured maximum
        max: u32,
    },

    /// Persisted model is missing
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    /// Numerical degeneracy during a fit
    #[error("computation failure: {0}")]
    ComputationFailure(String),

    /// IO error (model persistence, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (model persistence)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error (config, catalogs)
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Create an InvalidRecord error.
    pub fn invalid_record(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            resource_id: resource_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a ComputationFailure error.
    pub fn computation(message: impl Into<String>) -> Self {
        Self::ComputationFailure(message.into())
    }

    /// Check if this error is an unmet training/inference precondition.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientFeatures { .. }
                | EngineError::InsufficientHistory { .. }
                | EngineError::NotTrained { .. }
        )
    }

    /// Check if retrying the same call could succeed (transient IO).
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Create a user-friendly message for this error.
    pub fn friendly_message(&self) -> String {
        match self {
            EngineError::InsufficientHistory { available, required } => format!(
                "Only {} days of cost history available; forecasting needs {}.",
                available, required
            ),
            EngineError::NotTrained { component, .. } => {
                format!("The {} has not been trained yet. Train it first.", component)
            }
            EngineError::HorizonTooLong { max, .. } => {
                format!("Forecasts are limited to {} days ahead.", max)
            }
            EngineError::ModelNotFound(path) => {
                format!("No saved model at {}.", path.display())
            }
            _ => format!("Error: {}", self),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        let err = EngineError::NotTrained {
            component: "forecaster",
            operation: "predicting",
        };
        assert!(err.is_precondition());
        assert_eq!(err.to_string(), "forecaster must be trained before predicting");

        let err = EngineError::computation("singular matrix");
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_friendly_message() {
        let err = EngineError::InsufficientHistory {
            available: 5,
            required: 14,
        };
        assert!(err.friendly_message().contains("5 days"));

        let err = EngineError::ModelNotFound(PathBuf::from("/tmp/missing.json"));
        assert!(err.friendly_message().contains("/tmp/missing.json"));
    }

    #[test]
    fn test_io_recoverable() {
        let err = EngineError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(err.is_recoverable());
        let err = EngineError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!err.is_recoverable());
    }
}
