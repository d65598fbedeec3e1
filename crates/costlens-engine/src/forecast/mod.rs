//! Daily cost forecasting.
//!
//! [`CostForecaster`] aggregates cost records into a daily series, fits an
//! additive [`Decomposition`] (piecewise-linear trend plus weekly, yearly and
//! monthly Fourier terms) and produces day-by-day predictions with interval
//! bounds. Training also estimates accuracy as `1 - MAPE`, from a chronological
//! holdout on short series or from rolling-origin cross-validation on longer
//! ones.
//!
//! ## Usage
//!
//! ```no_run
//! use costlens_engine::{CostForecaster, CostRecord, ForecastConfig};
//!
//! fn run(history: &[CostRecord]) -> costlens_engine::Result<()> {
//!     let mut forecaster = CostForecaster::new(ForecastConfig::default());
//!     let model = forecaster.train(history)?;
//!     println!("accuracy: {:.1}%", model.accuracy() * 100.0);
//!
//!     for point in forecaster.predict(30)? {
//!         println!("{} ${:.2}", point.date, point.predicted_cost);
//!     }
//!     forecaster.save_model("forecast.json")?;
//!     Ok(())
//! }
//! ```

mod linalg;
mod model;

pub use model::{Components, Decomposition};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::models::CostRecord;
use crate::stats;

/// Days of future frame appended for trend analysis.
pub const TREND_FRAME_DAYS: i64 = 30;

/// Configuration for the forecaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Width of the prediction interval (default: 0.8)
    pub interval_width: f64,

    /// Trend flexibility, smaller is stiffer (default: 0.05)
    pub changepoint_prior_scale: f64,

    /// Seasonality flexibility (default: 10.0)
    pub seasonality_prior_scale: f64,

    /// Maximum number of trend changepoints (default: 25)
    pub n_changepoints: usize,

    /// Leading share of history eligible for changepoints (default: 0.8)
    pub changepoint_range: f64,

    pub weekly_seasonality: bool,
    pub yearly_seasonality: bool,
    pub monthly_seasonality: bool,

    /// Fourier orders (defaults: 3, 10, 5)
    pub weekly_order: usize,
    pub yearly_order: usize,
    pub monthly_order: usize,

    /// Period of the monthly term in days (default: 30.5)
    pub monthly_period: f64,

    /// Minimum distinct dates required to train (default: 14)
    pub min_history_days: usize,

    /// Accuracy reported when estimation fails (default: 0.85)
    pub default_accuracy: f64,

    /// Rolling-origin cross-validation windows, in days (defaults: 30, 7, 7)
    pub cv_initial_days: i64,
    pub cv_period_days: i64,
    pub cv_horizon_days: i64,

    /// Series shorter than this use a single holdout instead of CV (default: 30)
    pub cv_min_points: usize,

    /// Longest forecast `predict` accepts, in days (default: 3650)
    pub max_horizon_days: u32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            interval_width: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            n_changepoints: 25,
            changepoint_range: 0.8,
            weekly_seasonality: true,
            yearly_seasonality: true,
            monthly_seasonality: true,
            weekly_order: 3,
            yearly_order: 10,
            monthly_order: 5,
            monthly_period: 30.5,
            min_history_days: 14,
            default_accuracy: 0.85,
            cv_initial_days: 30,
            cv_period_days: 7,
            cv_horizon_days: 7,
            cv_min_points: 30,
            max_horizon_days: 3650,
        }
    }
}

impl ForecastConfig {
    /// Set the interval width, clamped to [0.5, 0.99].
    pub fn with_interval_width(mut self, width: f64) -> Self {
        self.interval_width = width.clamp(0.5, 0.99);
        self
    }

    /// Set the changepoint prior scale.
    pub fn with_changepoint_prior_scale(mut self, scale: f64) -> Self {
        self.changepoint_prior_scale = scale.max(f64::EPSILON);
        self
    }

    /// Enable or disable the weekly term.
    pub fn with_weekly_seasonality(mut self, enabled: bool) -> Self {
        self.weekly_seasonality = enabled;
        self
    }

    /// Enable or disable the yearly term.
    pub fn with_yearly_seasonality(mut self, enabled: bool) -> Self {
        self.yearly_seasonality = enabled;
        self
    }

    /// Enable or disable the monthly term.
    pub fn with_monthly_seasonality(mut self, enabled: bool) -> Self {
        self.monthly_seasonality = enabled;
        self
    }

    /// Enabled seasonal terms as (name, period, order).
    fn seasonalities(&self) -> Vec<(&'static str, f64, usize)> {
        let mut terms = Vec::new();
        if self.weekly_seasonality && self.weekly_order > 0 {
            terms.push(("weekly", 7.0, self.weekly_order));
        }
        if self.yearly_seasonality && self.yearly_order > 0 {
            terms.push(("yearly", 365.25, self.yearly_order));
        }
        if self.monthly_seasonality && self.monthly_order > 0 {
            terms.push(("monthly", self.monthly_period, self.monthly_order));
        }
        terms
    }
}

/// Total cost of one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    pub date: NaiveDate,
    pub cost: f64,
}

/// One forecast day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_cost: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
}

impl ForecastPoint {
    /// Clip to non-negative and order the bounds around the point estimate.
    fn from_estimate(date: NaiveDate, mean: f64, lower: f64, upper: f64) -> Self {
        let predicted_cost = mean.max(0.0);
        Self {
            date,
            predicted_cost,
            confidence_lower: lower.max(0.0).min(predicted_cost),
            confidence_upper: upper.max(0.0).max(predicted_cost),
        }
    }
}

/// Direction of the fitted trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Stable => write!(f, "stable"),
            TrendDirection::Unknown => write!(f, "unknown"),
        }
    }
}

/// Trend and seasonality summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub trend_direction: TrendDirection,
    pub trend_change_percent: f64,
    pub weekly_volatility: f64,
    pub yearly_volatility: f64,
    pub monthly_volatility: f64,
    pub model_accuracy: Option<f64>,
}

impl TrendAnalysis {
    fn unknown() -> Self {
        Self {
            trend_direction: TrendDirection::Unknown,
            trend_change_percent: 0.0,
            weekly_volatility: 0.0,
            yearly_volatility: 0.0,
            monthly_volatility: 0.0,
            model_accuracy: None,
        }
    }
}

/// Immutable fitted state produced by [`CostForecaster::train`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedForecastModel {
    config: ForecastConfig,
    decomposition: Decomposition,
    history: Vec<DailyCost>,
    accuracy: f64,
    trained_at: DateTime<Utc>,
}

impl TrainedForecastModel {
    /// Fit on cost records and estimate accuracy.
    pub fn fit(config: &ForecastConfig, records: &[CostRecord]) -> Result<Self> {
        let history = daily_series(records)?;
        if history.len() < config.min_history_days {
            return Err(EngineError::InsufficientHistory {
                available: history.len(),
                required: config.min_history_days,
            });
        }

        let series: Vec<(NaiveDate, f64)> = history.iter().map(|d| (d.date, d.cost)).collect();
        let decomposition = Decomposition::fit(&series, config)?;
        let accuracy = estimate_accuracy(&series, config);

        info!(
            days = history.len(),
            changepoints = decomposition.n_changepoints(),
            sigma = decomposition.sigma(),
            accuracy,
            "forecaster trained"
        );

        Ok(Self {
            config: config.clone(),
            decomposition,
            history,
            accuracy,
            trained_at: Utc::now(),
        })
    }

    /// Forecast `horizon_days` days past the last observed date.
    ///
    /// Horizons beyond `max_horizon_days` fail with [`EngineError::HorizonTooLong`].
    pub fn predict(&self, horizon_days: u32) -> Result<Vec<ForecastPoint>> {
        if horizon_days > self.config.max_horizon_days {
            return Err(EngineError::HorizonTooLong {
                requested: horizon_days,
                max: self.config.max_horizon_days,
            });
        }

        let end = self.decomposition.end();
        (1..=i64::from(horizon_days))
            .map(|h| {
                end.checked_add_signed(Duration::days(h))
                    .map(|date| self.point(date))
                    .ok_or_else(|| {
                        EngineError::computation(format!("forecast date {} days past {} is out of range", h, end))
                    })
            })
            .collect()
    }

    /// Fitted values over the observed dates.
    pub fn fitted_history(&self) -> Vec<ForecastPoint> {
        self.history.iter().map(|d| self.point(d.date)).collect()
    }

    fn point(&self, date: NaiveDate) -> ForecastPoint {
        let estimate = self.decomposition.estimate(date);
        ForecastPoint::from_estimate(date, estimate.mean, estimate.lower, estimate.upper)
    }

    /// Trend direction and seasonal volatility over history plus 30 days.
    ///
    /// Degenerate fits report [`TrendDirection::Unknown`] with zeros.
    pub fn trend_analysis(&self) -> TrendAnalysis {
        match self.try_trend_analysis() {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "trend analysis failed, reporting unknown");
                TrendAnalysis::unknown()
            }
        }
    }

    fn try_trend_analysis(&self) -> Result<TrendAnalysis> {
        let end = self.decomposition.end();
        let frame: Vec<Components> = self
            .history
            .iter()
            .map(|d| d.date)
            .chain((1..=TREND_FRAME_DAYS).map(|h| end + Duration::days(h)))
            .map(|date| self.decomposition.components(date))
            .collect();

        let trend: Vec<f64> = frame.iter().map(|c| c.trend).collect();
        let window = (TREND_FRAME_DAYS as usize).min(trend.len());
        let historical = stats::mean(&trend[..window]);
        let recent = stats::mean(&trend[trend.len() - window..]);

        if historical == 0.0 || !historical.is_finite() || !recent.is_finite() {
            return Err(EngineError::computation(
                "historical trend level is zero or non-finite",
            ));
        }
        let change = (recent - historical) / historical * 100.0;

        let direction = if change > 1.0 {
            TrendDirection::Increasing
        } else if change < -1.0 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        Ok(TrendAnalysis {
            trend_direction: direction,
            trend_change_percent: stats::round2(change),
            weekly_volatility: volatility(&frame, |c| c.weekly),
            yearly_volatility: volatility(&frame, |c| c.yearly),
            monthly_volatility: volatility(&frame, |c| c.monthly),
            model_accuracy: Some(stats::round3(self.accuracy)),
        })
    }

    /// Estimated accuracy, `max(0, 1 - MAPE)`.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Daily totals the model was fitted on.
    pub fn history(&self) -> &[DailyCost] {
        &self.history
    }

    /// When the model was fitted.
    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Configuration used for fitting.
    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }
}

/// Forecaster owning at most one trained snapshot.
#[derive(Debug, Clone, Default)]
pub struct CostForecaster {
    config: ForecastConfig,
    model: Option<Arc<TrainedForecastModel>>,
}

impl CostForecaster {
    /// Create an untrained forecaster.
    pub fn new(config: ForecastConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Train on history, replacing any previous snapshot.
    pub fn train(&mut self, records: &[CostRecord]) -> Result<Arc<TrainedForecastModel>> {
        let model = Arc::new(TrainedForecastModel::fit(&self.config, records)?);
        costlens_core::log_analysis_event!(
            component = "forecaster",
            days = model.history().len(),
            accuracy = model.accuracy()
        );
        self.model = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Forecast `horizon_days` days ahead.
    pub fn predict(&self, horizon_days: u32) -> Result<Vec<ForecastPoint>> {
        self.model_for("making predictions")?.predict(horizon_days)
    }

    /// Fitted values over the training dates.
    pub fn fitted_history(&self) -> Result<Vec<ForecastPoint>> {
        Ok(self.model_for("reading fitted history")?.fitted_history())
    }

    /// Trend direction and seasonal volatility.
    pub fn trend_analysis(&self) -> Result<TrendAnalysis> {
        Ok(self.model_for("analyzing trends")?.trend_analysis())
    }

    /// Whether a snapshot exists.
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// The current snapshot, for sharing across threads.
    pub fn model(&self) -> Result<Arc<TrainedForecastModel>> {
        self.model_for("sharing the model")
    }

    fn model_for(&self, operation: &'static str) -> Result<Arc<TrainedForecastModel>> {
        self.model.clone().ok_or(EngineError::NotTrained {
            component: "forecaster",
            operation,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Write the trained snapshot as JSON.
    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        let model = self.model_for("saving the model")?;
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, model.as_ref())?;
        writer.flush()?;
        info!(path = %path.display(), "forecast model saved");
        Ok(())
    }

    /// Replace the snapshot with one read from disk.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<Arc<TrainedForecastModel>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::ModelNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let model: TrainedForecastModel = serde_json::from_reader(reader)?;
        info!(
            path = %path.display(),
            trained_at = %model.trained_at,
            "forecast model loaded"
        );

        let model = Arc::new(model);
        self.model = Some(Arc::clone(&model));
        Ok(model)
    }
}

fn volatility(frame: &[Components], component: impl Fn(&Components) -> f64) -> f64 {
    let values: Vec<f64> = frame.iter().map(component).collect();
    stats::round2(stats::sample_std(&values))
}

/// Sum costs per UTC calendar date.
fn daily_series(records: &[CostRecord]) -> Result<Vec<DailyCost>> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in records {
        if !record.cost.is_finite() || record.cost < 0.0 {
            return Err(EngineError::invalid_record(
                &record.resource_id,
                format!("cost must be a non-negative number, got {}", record.cost),
            ));
        }
        *days.entry(record.timestamp.date_naive()).or_insert(0.0) += record.cost;
    }
    Ok(days
        .into_iter()
        .map(|(date, cost)| DailyCost { date, cost })
        .collect())
}

/// Accuracy from holdout or cross-validation, falling back to the configured default.
fn estimate_accuracy(series: &[(NaiveDate, f64)], config: &ForecastConfig) -> f64 {
    let estimate = if series.len() < config.cv_min_points {
        holdout_mape(series, config)
    } else {
        cross_validated_mape(series, config).or_else(|e| {
            debug!(error = %e, "cross-validation unavailable, using holdout");
            holdout_mape(series, config)
        })
    };

    match estimate {
        Ok(mape) if mape.is_finite() => (1.0 - mape).max(0.0),
        Ok(mape) => {
            warn!(mape, default = config.default_accuracy, "non-finite MAPE, using default accuracy");
            config.default_accuracy
        }
        Err(e) => {
            warn!(error = %e, default = config.default_accuracy, "accuracy estimation failed, using default");
            config.default_accuracy
        }
    }
}

/// Hold out the last 20% chronologically.
fn holdout_mape(series: &[(NaiveDate, f64)], config: &ForecastConfig) -> Result<f64> {
    let train_size = (series.len() as f64 * 0.8) as usize;
    let (train, test) = series.split_at(train_size.min(series.len()));
    fold_mape(train, test, config)
}

/// Rolling-origin folds stepping back from the end of the series.
fn cross_validated_mape(series: &[(NaiveDate, f64)], config: &ForecastConfig) -> Result<f64> {
    let (Some(&(start, _)), Some(&(end, _))) = (series.first(), series.last()) else {
        return Err(EngineError::computation("empty series"));
    };

    let horizon = Duration::days(config.cv_horizon_days.max(1));
    let period = Duration::days(config.cv_period_days.max(1));
    let earliest = start + Duration::days(config.cv_initial_days.max(1));

    let mut cutoffs = Vec::new();
    let mut cutoff = end - horizon;
    while cutoff >= earliest {
        cutoffs.push(cutoff);
        cutoff -= period;
    }
    if cutoffs.is_empty() {
        return Err(EngineError::computation("series too short for cross-validation"));
    }

    let mapes = cutoffs
        .iter()
        .map(|&cutoff| {
            let train: Vec<(NaiveDate, f64)> =
                series.iter().copied().filter(|(d, _)| *d <= cutoff).collect();
            let test: Vec<(NaiveDate, f64)> = series
                .iter()
                .copied()
                .filter(|(d, _)| *d > cutoff && *d <= cutoff + horizon)
                .collect();
            fold_mape(&train, &test, config)
        })
        .collect::<Result<Vec<f64>>>()?;

    debug!(folds = mapes.len(), "cross-validation complete");
    Ok(stats::mean(&mapes))
}

fn fold_mape(
    train: &[(NaiveDate, f64)],
    test: &[(NaiveDate, f64)],
    config: &ForecastConfig,
) -> Result<f64> {
    let model = Decomposition::fit(train, config)?;
    let errors: Vec<f64> = test
        .iter()
        .filter(|(_, actual)| *actual != 0.0)
        .map(|(date, actual)| {
            let predicted = model.components(*date).total().max(0.0);
            ((actual - predicted) / actual).abs()
        })
        .collect();

    if errors.is_empty() {
        return Err(EngineError::computation("no non-zero actuals in evaluation window"));
    }
    Ok(stats::mean(&errors))
}
