//! Engine configuration.
//!
//! Loaded from YAML. Every section is optional and falls back to its defaults:
//!
//! ```yaml
//! anomaly:
//!   contamination: 0.05
//!   features:
//!     rolling_window: 14
//! forecast:
//!   interval_width: 0.95
//! optimizer:
//!   max_clusters: 4
//! alerts:
//!   high_severity_cost: 2500
//! instance_catalog: /etc/costlens/instances.yaml
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::anomaly::{AlertThresholds, AnomalyConfig, CostAnomalyDetector};
use crate::error::{EngineError, Result};
use crate::forecast::{CostForecaster, ForecastConfig};
use crate::optimizer::{InstanceCatalog, OptimizerConfig, ResourceOptimizer, StoragePricing};

/// Aggregated configuration for all engine components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Anomaly detector, including feature derivation
    pub anomaly: AnomalyConfig,

    pub forecast: ForecastConfig,

    pub optimizer: OptimizerConfig,

    pub alerts: AlertThresholds,

    /// YAML instance catalog replacing the built-in tables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_catalog: Option<PathBuf>,

    /// YAML storage pricing replacing the built-in tables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_pricing: Option<PathBuf>,
}

impl EngineConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let contamination = self.anomaly.contamination;
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(EngineError::Config(format!(
                "anomaly.contamination must be in (0, 0.5], got {}",
                contamination
            )));
        }
        if self.anomaly.n_estimators == 0 {
            return Err(EngineError::Config(
                "anomaly.n_estimators must be at least 1".to_string(),
            ));
        }
        if self.anomaly.features.rolling_window == 0 {
            return Err(EngineError::Config(
                "anomaly.features.rolling_window must be at least 1".to_string(),
            ));
        }

        let width = self.forecast.interval_width;
        if !(width > 0.0 && width < 1.0) {
            return Err(EngineError::Config(format!(
                "forecast.interval_width must be in (0, 1), got {}",
                width
            )));
        }
        if !(0.0..=1.0).contains(&self.forecast.changepoint_range) {
            return Err(EngineError::Config(format!(
                "forecast.changepoint_range must be in [0, 1], got {}",
                self.forecast.changepoint_range
            )));
        }

        if self.optimizer.max_clusters == 0 {
            return Err(EngineError::Config(
                "optimizer.max_clusters must be at least 1".to_string(),
            ));
        }
        if self.optimizer.cpu_underutilized >= self.optimizer.cpu_overutilized {
            return Err(EngineError::Config(format!(
                "optimizer.cpu_underutilized ({}) must be below cpu_overutilized ({})",
                self.optimizer.cpu_underutilized, self.optimizer.cpu_overutilized
            )));
        }
        if self.optimizer.headroom < 1.0 {
            return Err(EngineError::Config(format!(
                "optimizer.headroom must be >= 1.0, got {}",
                self.optimizer.headroom
            )));
        }

        Ok(())
    }

    /// Untrained anomaly detector with this configuration.
    pub fn detector(&self) -> CostAnomalyDetector {
        CostAnomalyDetector::new(self.anomaly.clone())
    }

    /// Untrained forecaster with this configuration.
    pub fn forecaster(&self) -> CostForecaster {
        CostForecaster::new(self.forecast.clone())
    }

    /// Optimizer with the configured pricing files, or the built-in tables.
    pub fn optimizer(&self) -> Result<ResourceOptimizer> {
        let mut optimizer = ResourceOptimizer::new(self.optimizer.clone());
        if let Some(path) = &self.instance_catalog {
            optimizer = optimizer.with_catalog(InstanceCatalog::from_yaml_file(path)?);
        }
        if let Some(path) = &self.storage_pricing {
            optimizer = optimizer.with_storage_pricing(StoragePricing::from_yaml_file(path)?);
        }
        Ok(optimizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.anomaly.contamination, 0.1);
        assert_eq!(config.forecast.interval_width, 0.8);
        assert_eq!(config.optimizer.max_clusters, 5);
        assert_eq!(config.alerts.high_severity_cost, 1000.0);
        assert!(config.instance_catalog.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r#"
anomaly:
  contamination: 0.05
  features:
    rolling_window: 14
forecast:
  interval_width: 0.95
  yearly_seasonality: false
optimizer:
  max_clusters: 3
"#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.anomaly.contamination, 0.05);
        assert_eq!(config.anomaly.n_estimators, 100);
        assert_eq!(config.anomaly.features.rolling_window, 14);
        assert_eq!(config.forecast.interval_width, 0.95);
        assert!(!config.forecast.yearly_seasonality);
        assert!(config.forecast.weekly_seasonality);
        assert_eq!(config.optimizer.max_clusters, 3);
        assert_eq!(config.optimizer.headroom, 1.2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_yaml_str("anomaly:\n  contamination: 0.9\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = EngineConfig::from_yaml_str("forecast:\n  interval_width: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("interval_width"));

        let err = EngineConfig::from_yaml_str(
            "optimizer:\n  cpu_underutilized: 90\n  cpu_overutilized: 80\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("cpu_underutilized"));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = EngineConfig::from_yaml_str("anomaly: [not, a, map]").unwrap_err();
        assert!(matches!(err, EngineError::Yaml(_)));
    }

    #[test]
    fn test_missing_catalog_file() {
        let config = EngineConfig {
            instance_catalog: Some(PathBuf::from("/nonexistent/costlens/instances.yaml")),
            ..EngineConfig::default()
        };
        assert!(matches!(config.optimizer(), Err(EngineError::Io(_))));
    }
}
