//! Unsupervised cost anomaly detection.
//!
//! [`CostAnomalyDetector`] moves one way from untrained to trained. Training
//! builds features, fixes the feature columns, fits a [`StandardScaler`] and an
//! [`IsolationForest`] and records baseline cost statistics, all inside an
//! immutable [`TrainedAnomalyModel`] snapshot. Retraining swaps in a new
//! snapshot; readers holding the old `Arc` keep a valid model.
//!
//! ## Severity
//!
//! | score `s`           | severity |
//! |---------------------|----------|
//! | `s < -0.5`          | high     |
//! | `-0.5 <= s < -0.2`  | medium   |
//! | `-0.2 <= s < 0`     | low      |
//! | otherwise           | normal   |
//!
//! A cost above twice the training p95 bumps low to medium and medium to high.
//!
//! ## Usage
//!
//! ```no_run
//! use costlens_engine::{AlertThresholds, AnomalyConfig, CostAnomalyDetector, CostRecord};
//!
//! fn run(history: &[CostRecord], today: &[CostRecord]) -> costlens_engine::Result<()> {
//!     let mut detector = CostAnomalyDetector::new(AnomalyConfig::default());
//!     detector.train(history)?;
//!
//!     let results = detector.detect(today)?;
//!     let summary = CostAnomalyDetector::summarize(&results);
//!     let alerts = CostAnomalyDetector::alert(&results, &AlertThresholds::default());
//!     println!("{} anomalies, {} alerts", summary.anomalies_detected, alerts.len());
//!     Ok(())
//! }
//! ```

mod isolation_forest;
mod scaler;

pub use isolation_forest::{ForestParams, IsolationForest};
pub use scaler::StandardScaler;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::features::{FeatureBuilder, FeatureConfig, FeatureRow};
use crate::models::{CostRecord, Provider};
use crate::stats;

/// Minimum usable feature columns for training.
pub const MIN_FEATURE_COLUMNS: usize = 3;

/// A numeric column the outlier model can consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    LogCost,
    Hour,
    DayOfWeek,
    DayOfMonth,
    Month,
    ProviderEncoded,
    CostZscore,
    UsageHoursNormalized,
}

impl FeatureColumn {
    /// Default candidate list, in model column order.
    pub const CANDIDATES: [FeatureColumn; 8] = [
        FeatureColumn::LogCost,
        FeatureColumn::Hour,
        FeatureColumn::DayOfWeek,
        FeatureColumn::DayOfMonth,
        FeatureColumn::Month,
        FeatureColumn::ProviderEncoded,
        FeatureColumn::CostZscore,
        FeatureColumn::UsageHoursNormalized,
    ];

    /// Whether the column carries data for this row.
    fn is_present(&self, row: &FeatureRow) -> bool {
        match self {
            FeatureColumn::UsageHoursNormalized => row.usage_hours_normalized.is_some(),
            _ => true,
        }
    }

    /// Column value; absent optional values are zero-filled.
    pub fn extract(&self, row: &FeatureRow) -> f64 {
        match self {
            FeatureColumn::LogCost => row.log_cost,
            FeatureColumn::Hour => f64::from(row.hour),
            FeatureColumn::DayOfWeek => f64::from(row.day_of_week),
            FeatureColumn::DayOfMonth => f64::from(row.day_of_month),
            FeatureColumn::Month => f64::from(row.month),
            FeatureColumn::ProviderEncoded => f64::from(row.provider_code),
            FeatureColumn::CostZscore => row.cost_zscore,
            FeatureColumn::UsageHoursNormalized => row.usage_hours_normalized.unwrap_or(0.0),
        }
    }

    /// Column name as it appears in logs.
    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::LogCost => "log_cost",
            FeatureColumn::Hour => "hour",
            FeatureColumn::DayOfWeek => "day_of_week",
            FeatureColumn::DayOfMonth => "day_of_month",
            FeatureColumn::Month => "month",
            FeatureColumn::ProviderEncoded => "provider_encoded",
            FeatureColumn::CostZscore => "cost_zscore",
            FeatureColumn::UsageHoursNormalized => "usage_hours_normalized",
        }
    }
}

/// The fixed column set chosen at training time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    /// Keep the candidates that carry data in at least one training row.
    pub fn intersect(candidates: &[FeatureColumn], rows: &[FeatureRow]) -> Result<Self> {
        let mut columns: Vec<FeatureColumn> = Vec::new();
        for candidate in candidates {
            if !columns.contains(candidate) && rows.iter().any(|r| candidate.is_present(r)) {
                columns.push(*candidate);
            }
        }

        if columns.len() < MIN_FEATURE_COLUMNS {
            return Err(EngineError::InsufficientFeatures {
                available: columns.len(),
                required: MIN_FEATURE_COLUMNS,
            });
        }
        Ok(Self { columns })
    }

    /// Columns in model order.
    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    fn matrix(&self, rows: &[FeatureRow]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| self.columns.iter().map(|c| c.extract(row)).collect())
            .collect()
    }
}

/// Configuration for the anomaly detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Expected share of anomalies in training data (default: 0.1)
    pub contamination: f64,

    /// Number of isolation trees (default: 100)
    pub n_estimators: usize,

    /// Subsample size per tree (default: 256)
    pub max_samples: usize,

    /// Random seed (default: 42)
    pub seed: u64,

    /// Feature columns to try, intersected with the training data
    pub candidate_features: Vec<FeatureColumn>,

    /// Feature derivation settings
    pub features: FeatureConfig,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
            candidate_features: FeatureColumn::CANDIDATES.to_vec(),
            features: FeatureConfig::default(),
        }
    }
}

impl AnomalyConfig {
    /// Set the expected anomaly fraction, clamped to (0, 0.5].
    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination.clamp(f64::EPSILON, 0.5);
        self
    }

    /// Set the candidate feature list.
    pub fn with_candidates(mut self, candidates: Vec<FeatureColumn>) -> Self {
        self.candidate_features = candidates;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Cost statistics of the training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    pub mean_cost: f64,
    pub std_cost: f64,
    pub median_cost: f64,
    pub p95_cost: f64,
    pub training_samples: usize,

    /// Most frequent provider in training (ties: first seen)
    pub reference_provider: Provider,
}

impl BaselineStats {
    fn from_rows(rows: &[FeatureRow]) -> Self {
        let costs: Vec<f64> = rows.iter().map(|r| r.record.cost).collect();

        let mut counts: HashMap<&Provider, (usize, usize)> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            counts.entry(&row.record.provider).or_insert((0, i)).0 += 1;
        }
        let reference_provider = counts
            .into_iter()
            .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))
            .map(|(p, _)| p.clone())
            .unwrap_or_default();

        Self {
            mean_cost: stats::mean(&costs),
            std_cost: stats::sample_std(&costs),
            median_cost: stats::median(&costs),
            p95_cost: stats::quantile(&costs, 0.95),
            training_samples: rows.len(),
            reference_provider,
        }
    }
}

/// Qualitative anomaly bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Low,
    Medium,
    High,
}

impl Severity {
    /// Bucket a decision score.
    pub fn from_score(score: f64) -> Self {
        if score < -0.5 {
            Severity::High
        } else if score < -0.2 {
            Severity::Medium
        } else if score < 0.0 {
            Severity::Low
        } else {
            Severity::Normal
        }
    }

    /// Bump one level for large costs. Never lowers severity.
    pub fn escalate(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            other => other,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Normal => write!(f, "normal"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Reason text for rows the model does not flag.
pub const NORMAL_REASON: &str = "Normal spending pattern";

/// Reason text when a flagged row matches no specific rule.
pub const FALLBACK_REASON: &str = "Multiple factors indicate anomalous pattern";

/// Anomaly verdict for one feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Source row
    pub row: FeatureRow,

    /// Decision score, lower is more anomalous, negative means flagged
    pub anomaly_score: f64,

    pub is_anomaly: bool,
    pub severity: Severity,
    pub reason: String,
}

/// Immutable fitted state produced by [`CostAnomalyDetector::train`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedAnomalyModel {
    schema: FeatureSchema,
    scaler: StandardScaler,
    forest: IsolationForest,
    baseline: BaselineStats,
    features: FeatureConfig,
    trained_at: DateTime<Utc>,
}

impl TrainedAnomalyModel {
    /// Fit a model on historical cost records.
    pub fn fit(config: &AnomalyConfig, records: &[CostRecord]) -> Result<Self> {
        let rows = FeatureBuilder::new(config.features.clone()).build(records)?;
        let schema = FeatureSchema::intersect(&config.candidate_features, &rows)?;

        let matrix = schema.matrix(&rows);
        let scaler = StandardScaler::fit(&matrix)?;
        let scaled = scaler.transform(&matrix)?;

        let forest = IsolationForest::fit(
            &scaled,
            ForestParams {
                n_estimators: config.n_estimators,
                max_samples: config.max_samples,
                contamination: config.contamination,
                seed: config.seed,
            },
        )?;

        let baseline = BaselineStats::from_rows(&rows);
        let feature_names: Vec<&str> = schema.columns().iter().map(|c| c.name()).collect();
        info!(
            samples = rows.len(),
            features = %feature_names.join(", "),
            mean_cost = baseline.mean_cost,
            std_cost = baseline.std_cost,
            p95_cost = baseline.p95_cost,
            "anomaly detector trained"
        );

        Ok(Self {
            schema,
            scaler,
            forest,
            baseline,
            features: config.features.clone(),
            trained_at: Utc::now(),
        })
    }

    /// Score new records against the training fit.
    pub fn detect(&self, records: &[CostRecord]) -> Result<Vec<AnomalyResult>> {
        let rows = FeatureBuilder::new(self.features.clone()).build(records)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let scaled = self.scaler.transform(&self.schema.matrix(&rows))?;
        let scores = self.forest.decision_function(&scaled)?;

        let results: Vec<AnomalyResult> = rows
            .into_iter()
            .zip(scores)
            .map(|(row, score)| {
                let is_anomaly = score < 0.0;
                let severity = self.severity(score, row.record.cost);
                let reason = self.reason(&row, is_anomaly);
                AnomalyResult {
                    row,
                    anomaly_score: score,
                    is_anomaly,
                    severity,
                    reason,
                }
            })
            .collect();

        debug!(
            rows = results.len(),
            flagged = results.iter().filter(|r| r.is_anomaly).count(),
            "anomaly detection complete"
        );
        Ok(results)
    }

    /// Score bucket plus the cost-magnitude escalation against training p95.
    pub fn severity(&self, score: f64, cost: f64) -> Severity {
        let severity = Severity::from_score(score);
        if cost > self.baseline.p95_cost * 2.0 {
            severity.escalate()
        } else {
            severity
        }
    }

    fn reason(&self, row: &FeatureRow, is_anomaly: bool) -> String {
        if !is_anomaly {
            return NORMAL_REASON.to_string();
        }

        let mut parts = Vec::new();
        if row.record.cost > self.baseline.p95_cost {
            parts.push(format!(
                "Cost ({:.2}) exceeds 95th percentile",
                row.record.cost
            ));
        }
        if row.hour < 6 || row.hour > 22 {
            parts.push("Unusual time of day".to_string());
        }
        if row.is_weekend() {
            parts.push("Weekend activity".to_string());
        }
        if row.record.provider != self.baseline.reference_provider {
            parts.push(format!("Unusual provider ({})", row.record.provider));
        }
        if row.cost_zscore.abs() > 2.0 {
            parts.push(format!(
                "Cost deviates significantly from trend (z-score: {:.2})",
                row.cost_zscore
            ));
        }

        if parts.is_empty() {
            FALLBACK_REASON.to_string()
        } else {
            parts.join("; ")
        }
    }

    /// Baseline statistics of the training set.
    pub fn baseline(&self) -> &BaselineStats {
        &self.baseline
    }

    /// Feature columns fixed at training time.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// When the model was fitted.
    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}

/// Covered date range of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Aggregate view of a detection run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_records: usize,
    pub anomalies_detected: usize,

    /// Percentage of records flagged, 2 decimals
    pub anomaly_rate: f64,

    /// Severity counts over flagged records
    pub severity_breakdown: BTreeMap<Severity, usize>,

    pub total_anomaly_cost: f64,
    pub avg_anomaly_cost: f64,

    /// None for empty input
    pub date_range: Option<DateRange>,
}

/// Thresholds for [`CostAnomalyDetector::alert`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Alert on high-severity anomalies above this cost (default: $1000)
    pub high_severity_cost: f64,

    /// Alert on medium-severity anomalies above this cost (default: $5000)
    pub medium_severity_cost: f64,

    /// Alert when the anomaly rate exceeds this percentage (default: 20)
    pub anomaly_rate_pct: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            high_severity_cost: 1000.0,
            medium_severity_cost: 5000.0,
            anomaly_rate_pct: 20.0,
        }
    }
}

/// Kind of alert raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighCostAnomaly,
    MediumCostAnomaly,
    HighAnomalyRate,
}

/// Alert urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    Warning,
}

/// An alert derived from detection results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub recommended_action: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<usize>,
}

impl Alert {
    fn for_anomaly(result: &AnomalyResult, alert_type: AlertType) -> Self {
        let record = &result.row.record;
        let (severity, label, action) = match alert_type {
            AlertType::HighCostAnomaly => (
                AlertSeverity::Critical,
                "High",
                "Investigate immediately and verify legitimacy",
            ),
            _ => (
                AlertSeverity::Warning,
                "Medium",
                "Review and validate spending pattern",
            ),
        };
        Self {
            alert_type,
            severity,
            message: format!("{}-cost anomaly detected: ${:.2}", label, record.cost),
            recommended_action: action.to_string(),
            resource_id: Some(record.resource_id.clone()),
            provider: Some(record.provider.clone()),
            cost: Some(record.cost),
            timestamp: Some(record.timestamp),
            reason: Some(result.reason.clone()),
            anomaly_count: None,
            total_records: None,
        }
    }
}

/// Anomaly detector owning at most one trained snapshot.
#[derive(Debug, Clone, Default)]
pub struct CostAnomalyDetector {
    config: AnomalyConfig,
    model: Option<Arc<TrainedAnomalyModel>>,
}

impl CostAnomalyDetector {
    /// Create an untrained detector.
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Train on history, replacing any previous snapshot.
    pub fn train(&mut self, records: &[CostRecord]) -> Result<Arc<TrainedAnomalyModel>> {
        let model = Arc::new(TrainedAnomalyModel::fit(&self.config, records)?);
        costlens_core::log_analysis_event!(
            component = "anomaly_detector",
            samples = model.baseline().training_samples,
            features = model.schema().columns().len()
        );
        self.model = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Score records with the current snapshot.
    pub fn detect(&self, records: &[CostRecord]) -> Result<Vec<AnomalyResult>> {
        self.model()?.detect(records)
    }

    /// Whether a snapshot exists.
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// The current snapshot, for sharing across threads.
    pub fn model(&self) -> Result<Arc<TrainedAnomalyModel>> {
        self.model.clone().ok_or(EngineError::NotTrained {
            component: "anomaly detector",
            operation: "detecting anomalies",
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Summarize a detection run. Empty input yields an all-zero summary.
    pub fn summarize(results: &[AnomalyResult]) -> AnomalySummary {
        if results.is_empty() {
            return AnomalySummary::default();
        }

        let anomalies: Vec<&AnomalyResult> = results.iter().filter(|r| r.is_anomaly).collect();

        let mut severity_breakdown = BTreeMap::new();
        for anomaly in &anomalies {
            *severity_breakdown.entry(anomaly.severity).or_insert(0) += 1;
        }

        let total_anomaly_cost: f64 = anomalies.iter().map(|a| a.row.record.cost).sum();
        let avg_anomaly_cost = if anomalies.is_empty() {
            0.0
        } else {
            total_anomaly_cost / anomalies.len() as f64
        };

        let dates = results.iter().map(|r| r.row.record.timestamp.date_naive());
        let start = dates.clone().min();
        let end = dates.max();

        AnomalySummary {
            total_records: results.len(),
            anomalies_detected: anomalies.len(),
            anomaly_rate: stats::round2(anomalies.len() as f64 / results.len() as f64 * 100.0),
            severity_breakdown,
            total_anomaly_cost: stats::round2(total_anomaly_cost),
            avg_anomaly_cost: stats::round2(avg_anomaly_cost),
            date_range: start.zip(end).map(|(start, end)| DateRange { start, end }),
        }
    }

    /// Raise alerts: high-cost anomalies, then medium-cost, then the rate alert.
    pub fn alert(results: &[AnomalyResult], thresholds: &AlertThresholds) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = results
            .iter()
            .filter(|r| {
                r.is_anomaly
                    && r.severity == Severity::High
                    && r.row.record.cost > thresholds.high_severity_cost
            })
            .map(|r| Alert::for_anomaly(r, AlertType::HighCostAnomaly))
            .collect();

        alerts.extend(
            results
                .iter()
                .filter(|r| {
                    r.is_anomaly
                        && r.severity == Severity::Medium
                        && r.row.record.cost > thresholds.medium_severity_cost
                })
                .map(|r| Alert::for_anomaly(r, AlertType::MediumCostAnomaly)),
        );

        let summary = Self::summarize(results);
        if summary.anomaly_rate > thresholds.anomaly_rate_pct {
            alerts.push(Alert {
                alert_type: AlertType::HighAnomalyRate,
                severity: AlertSeverity::Warning,
                message: format!("High anomaly rate detected: {:.1}%", summary.anomaly_rate),
                recommended_action: "Review spending patterns and optimization opportunities"
                    .to_string(),
                resource_id: None,
                provider: None,
                cost: None,
                timestamp: None,
                reason: None,
                anomaly_count: Some(summary.anomalies_detected),
                total_records: Some(summary.total_records),
            });
        }

        alerts
    }
}
