//! Feature derivation from raw cost records.
//!
//! [`FeatureBuilder`] turns an ascending, timestamp-ordered slice of
//! [`CostRecord`]s into one [`FeatureRow`] per record:
//!
//! - calendar features (hour, day of week, day of month, month)
//! - `ln(1 + cost)`
//! - provider code (aws=0, azure=1, onpremises=2, anything else=3)
//! - trailing rolling mean/std/median of cost and the z-score against them
//! - normalized usage hours and cost per resource when those fields exist
//!
//! Rolling windows look only backwards. Series shorter than the window fall
//! back to whole-series statistics and every row is marked
//! `reduced_confidence`.
//!
//! ## Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use costlens_engine::{CostRecord, FeatureBuilder};
//!
//! let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
//! let records = vec![CostRecord::new(ts, "aws", "ec2", "i-001", 120.0)];
//! let rows = FeatureBuilder::default().build(&records).unwrap();
//! assert_eq!(rows[0].hour, 12);
//! assert!(rows[0].reduced_confidence);
//! ```

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::models::CostRecord;
use crate::stats;

/// Offset added to the rolling std before dividing.
pub const ZSCORE_EPSILON: f64 = 1e-8;

/// Configuration for feature derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Trailing window length, inclusive of the current record (default: 7)
    pub rolling_window: usize,

    /// Divisor turning usage hours into a monthly fraction (default: 744)
    pub usage_hours_normalizer: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rolling_window: 7,
            usage_hours_normalizer: 744.0,
        }
    }
}

impl FeatureConfig {
    /// Set the rolling window length (at least 1).
    pub fn with_rolling_window(mut self, window: usize) -> Self {
        self.rolling_window = window.max(1);
        self
    }
}

/// A cost record enriched with derived features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Source record
    pub record: CostRecord,

    /// Hour of day (0-23)
    pub hour: u32,

    /// Day of week, Monday = 0
    pub day_of_week: u32,

    /// Day of month (1-31)
    pub day_of_month: u32,

    /// Month (1-12)
    pub month: u32,

    /// ln(1 + cost)
    pub log_cost: f64,

    /// Provider categorical code
    pub provider_code: u8,

    pub rolling_mean: f64,
    pub rolling_std: f64,
    pub rolling_median: f64,

    /// (cost - rolling_mean) / (rolling_std + epsilon)
    pub cost_zscore: f64,

    /// usage_hours / normalizer, when usage hours were reported
    pub usage_hours_normalized: Option<f64>,

    /// cost / (resource_count + 1), when a resource count was reported
    pub cost_per_resource: Option<f64>,

    /// True when whole-series statistics replaced the rolling window
    pub reduced_confidence: bool,
}

impl FeatureRow {
    /// Weekend check (Saturday or Sunday).
    pub fn is_weekend(&self) -> bool {
        self.day_of_week >= 5
    }
}

/// Builds [`FeatureRow`]s from cost records.
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    /// Create a builder with a custom configuration.
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Derive one feature row per record.
    ///
    /// Records must be sorted ascending by timestamp. Negative or non-finite
    /// costs and out-of-order timestamps fail with
    /// [`EngineError::InvalidRecord`].
    pub fn build(&self, records: &[CostRecord]) -> Result<Vec<FeatureRow>> {
        validate(records)?;

        let costs: Vec<f64> = records.iter().map(|r| r.cost).collect();
        let window = self.config.rolling_window.max(1);
        let reduced_confidence = records.len() < window;

        // Whole-series statistics are only needed for the short-series fallback
        let whole_series = reduced_confidence.then(|| {
            (
                stats::mean(&costs),
                stats::sample_std(&costs),
                stats::median(&costs),
            )
        });

        debug!(
            records = records.len(),
            window, reduced_confidence, "building cost features"
        );

        let rows = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let (rolling_mean, rolling_std, rolling_median) = match whole_series {
                    Some(series) => series,
                    None => {
                        let start = (i + 1).saturating_sub(window);
                        let slice = &costs[start..=i];
                        (
                            stats::mean(slice),
                            stats::sample_std(slice),
                            stats::median(slice),
                        )
                    }
                };

                let ts = record.timestamp;
                FeatureRow {
                    hour: ts.hour(),
                    day_of_week: ts.weekday().num_days_from_monday(),
                    day_of_month: ts.day(),
                    month: ts.month(),
                    log_cost: record.cost.ln_1p(),
                    provider_code: record.provider.code(),
                    rolling_mean,
                    rolling_std,
                    rolling_median,
                    cost_zscore: (record.cost - rolling_mean) / (rolling_std + ZSCORE_EPSILON),
                    usage_hours_normalized: record
                        .usage_hours
                        .map(|h| h / self.config.usage_hours_normalizer),
                    cost_per_resource: record
                        .resource_count
                        .map(|c| record.cost / (f64::from(c) + 1.0)),
                    reduced_confidence,
                    record: record.clone(),
                }
            })
            .collect();

        Ok(rows)
    }
}

fn validate(records: &[CostRecord]) -> Result<()> {
    for (i, record) in records.iter().enumerate() {
        if !record.cost.is_finite() || record.cost < 0.0 {
            return Err(EngineError::invalid_record(
                &record.resource_id,
                format!("cost must be a non-negative number, got {}", record.cost),
            ));
        }
        if let Some(hours) = record.usage_hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(EngineError::invalid_record(
                    &record.resource_id,
                    format!("usage_hours must be non-negative, got {}", hours),
                ));
            }
        }
        if i > 0 && record.timestamp < records[i - 1].timestamp {
            return Err(EngineError::invalid_record(
                &record.resource_id,
                "records must be sorted ascending by timestamp",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(costs: &[f64]) -> Vec<CostRecord> {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(); // a Monday
        costs
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                CostRecord::new(start + Duration::days(i as i64), "aws", "ec2", "i-001", c)
            })
            .collect()
    }

    #[test]
    fn test_calendar_and_log_features() {
        let rows = FeatureBuilder::default().build(&series(&[0.0, 9.0])).unwrap();

        assert_eq!(rows[0].hour, 9);
        assert_eq!(rows[0].day_of_week, 0);
        assert_eq!(rows[1].day_of_week, 1);
        assert_eq!(rows[0].day_of_month, 3);
        assert_eq!(rows[0].month, 6);
        assert_eq!(rows[0].log_cost, 0.0);
        assert!((rows[1].log_cost - 10.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_negative_cost_rejected() {
        let err = FeatureBuilder::default()
            .build(&series(&[10.0, -1.0]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord { .. }));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut records = series(&[10.0, 11.0]);
        records.swap(0, 1);
        let err = FeatureBuilder::default().build(&records).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord { .. }));
    }

    #[test]
    fn test_rolling_window_has_no_look_ahead() {
        let costs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 100.0];
        let rows = FeatureBuilder::default().build(&series(&costs)).unwrap();

        // First row only sees itself
        assert_eq!(rows[0].rolling_mean, 1.0);
        assert_eq!(rows[0].rolling_std, 0.0);
        assert_eq!(rows[0].cost_zscore, 0.0);

        // Row 6 sees 1..=7, unaffected by the spike that follows
        assert_eq!(rows[6].rolling_mean, 4.0);
        assert_eq!(rows[6].rolling_median, 4.0);

        // Row 7 window is 2..=7 plus 100
        let expected = (2.0 + 3.0 + 4.0 + 5.0 + 6.0 + 7.0 + 100.0) / 7.0;
        assert!((rows[7].rolling_mean - expected).abs() < 1e-12);
        assert!(rows[7].cost_zscore > 2.0);
        assert!(rows.iter().all(|r| !r.reduced_confidence));
    }

    #[test]
    fn test_short_series_falls_back_to_whole_series() {
        let rows = FeatureBuilder::default()
            .build(&series(&[10.0, 20.0, 30.0]))
            .unwrap();

        assert!(rows.iter().all(|r| r.reduced_confidence));
        assert!(rows.iter().all(|r| r.rolling_mean == 20.0));
        assert!(rows.iter().all(|r| r.rolling_median == 20.0));
        assert!((rows[0].rolling_std - 10.0).abs() < 1e-12);
        assert!((rows[2].cost_zscore - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_optional_fields() {
        let mut records = series(&[10.0, 20.0]);
        records[0] = records[0].clone().with_usage_hours(372.0).with_resource_count(4);

        let rows = FeatureBuilder::default().build(&records).unwrap();

        assert_eq!(rows[0].usage_hours_normalized, Some(0.5));
        assert_eq!(rows[0].cost_per_resource, Some(2.0));
        assert_eq!(rows[1].usage_hours_normalized, None);
        assert_eq!(rows[1].cost_per_resource, None);
    }

    #[test]
    fn test_unknown_provider_gets_sentinel() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let records = vec![CostRecord::new(ts, "gcp", "gce", "vm-1", 5.0)];
        let rows = FeatureBuilder::default().build(&records).unwrap();
        assert_eq!(rows[0].provider_code, 3);
        assert!(rows[0].is_weekend()); // 2024-06-01 is a Saturday
    }
}
