//! # costlens-engine
//!
//! Cost analytics over cloud billing records.
//!
//! This crate provides:
//! - [`FeatureBuilder`] - Time, rolling-window and normalization features per record
//! - [`CostAnomalyDetector`] - Isolation-forest anomaly scoring with severity and alerts
//! - [`CostForecaster`] - Trend plus seasonal decomposition of daily spend
//! - [`ResourceOptimizer`] - Budget, clustering, rightsizing and storage rules
//!
//! Trained detector and forecaster state lives in immutable snapshots behind an
//! `Arc`. Retraining swaps the snapshot, so a clone of it can be read from any
//! number of threads while a new one is built.
//!
//! ## Example
//!
//! ```no_run
//! use chrono::{TimeZone, Utc};
//! use costlens_engine::{CostAnomalyDetector, CostForecaster, CostRecord};
//!
//! fn main() -> costlens_engine::Result<()> {
//!     let records: Vec<CostRecord> = (0..60)
//!         .map(|day| {
//!             let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
//!                 + chrono::Duration::days(day);
//!             CostRecord::new(ts, "aws", "ec2", "i-0123456789abcdef0", 120.0 + day as f64)
//!         })
//!         .collect();
//!
//!     let mut detector = CostAnomalyDetector::default();
//!     detector.train(&records)?;
//!     let anomalies = detector.detect(&records)?;
//!     println!("{:?}", CostAnomalyDetector::summarize(&anomalies));
//!
//!     let mut forecaster = CostForecaster::default();
//!     forecaster.train(&records)?;
//!     for point in forecaster.predict(7)? {
//!         println!("{} ${:.2}", point.date, point.predicted_cost);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod anomaly;
pub mod config;
pub mod error;
pub mod features;
pub mod forecast;
pub mod models;
pub mod optimizer;
pub mod stats;

// Re-export main types
pub use anomaly::{
    Alert, AlertThresholds, AnomalyConfig, AnomalyResult, AnomalySummary, CostAnomalyDetector,
    Severity, TrainedAnomalyModel,
};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use features::{FeatureBuilder, FeatureConfig, FeatureRow};
pub use forecast::{
    CostForecaster, ForecastConfig, ForecastPoint, TrainedForecastModel, TrendAnalysis,
    TrendDirection,
};
pub use models::{ComputeInstance, CostRecord, Provider, ResourceUtilization, StorageResource};
pub use optimizer::{
    BudgetCategory, BudgetOptimization, InstanceCatalog, OptimizationRecommendation,
    OptimizationReport, OptimizerConfig, RecommendationType, ResourceInventory, ResourceOptimizer,
    StoragePricing, UtilizationAnalysis,
};
