//! Error types shared by CostLens crates.
//!
//! [`CoreError`] covers the environment-level failures that happen before any
//! analysis runs: locating directories, creating log folders, finding config
//! files.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Environment and setup errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Pass --config with an existing YAML file or omit it to use defaults")
            }
            Self::DirectoryCreation { .. } => Some("Check permissions on the log directory"),
            Self::Internal { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_error() {
        let err = CoreError::config_not_found("/etc/costlens/engine.yaml");
        assert!(err.to_string().contains("Configuration not found"));
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_internal_has_no_guidance() {
        let err = CoreError::internal("bug");
        assert_eq!(err.to_string(), "Internal error: bug");
        assert!(err.guidance().is_none());
    }
}
