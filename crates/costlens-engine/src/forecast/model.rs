//! Additive trend + seasonality decomposition of a daily cost series.
//!
//! The fitted curve is
//!
//! ```text
//! y(d) = trend(d) + weekly(d) + yearly(d) + monthly(d)
//! ```
//!
//! where `trend` is piecewise linear with changepoints spread over the first
//! part of the history and each seasonal term is a Fourier series over the
//! absolute day number. All coefficients come from one ridge regression on
//! max-scaled costs; the ridge weights play the role of the changepoint and
//! seasonality prior scales.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::ForecastConfig;
use super::linalg;
use crate::error::{EngineError, Result};
use crate::stats;

/// Prior scale for the base intercept and slope.
const BASE_PRIOR_SCALE: f64 = 5.0;

/// Fitted Fourier series for one periodic term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalTerm {
    pub name: String,
    pub period: f64,
    pub order: usize,

    /// Interleaved sin/cos coefficients, `2 * order` of them
    coefficients: Vec<f64>,
}

impl SeasonalTerm {
    fn features(period: f64, order: usize, day: f64) -> impl Iterator<Item = f64> {
        (1..=order).flat_map(move |j| {
            let angle = 2.0 * PI * j as f64 * day / period;
            [angle.sin(), angle.cos()]
        })
    }

    /// Contribution at an absolute day, in scaled units.
    fn evaluate(&self, day: f64) -> f64 {
        Self::features(self.period, self.order, day)
            .zip(&self.coefficients)
            .map(|(f, c)| f * c)
            .sum()
    }
}

/// Component values at one date, in cost units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Components {
    pub trend: f64,
    pub weekly: f64,
    pub yearly: f64,
    pub monthly: f64,
}

impl Components {
    /// Sum of trend and all seasonal terms.
    pub fn total(&self) -> f64 {
        self.trend + self.weekly + self.yearly + self.monthly
    }
}

/// Point estimate with interval bounds, before clipping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

/// The fitted decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    start: NaiveDate,
    end: NaiveDate,

    /// Days between first and last observation
    span_days: f64,

    /// Divisor applied to costs before fitting
    y_scale: f64,

    intercept: f64,
    slope: f64,

    /// Changepoint locations on the [0, 1] time axis
    changepoints: Vec<f64>,

    /// Slope adjustments at each changepoint
    deltas: Vec<f64>,

    seasonal: Vec<SeasonalTerm>,

    /// Residual standard deviation in cost units
    sigma: f64,

    /// Two-sided z-score of the configured interval width
    z: f64,
}

impl Decomposition {
    /// Fit on an ascending, date-unique daily series.
    pub fn fit(series: &[(NaiveDate, f64)], config: &ForecastConfig) -> Result<Self> {
        let (Some(&(start, _)), Some(&(end, _))) = (series.first(), series.last()) else {
            return Err(EngineError::computation("cannot fit decomposition on an empty series"));
        };
        if series.len() < 2 || end <= start {
            return Err(EngineError::computation(
                "decomposition needs at least two distinct dates",
            ));
        }

        let span_days = (end - start).num_days() as f64;
        let y_max = series.iter().map(|(_, y)| y.abs()).fold(0.0, f64::max);
        let y_scale = if y_max > 0.0 { y_max } else { 1.0 };

        let t: Vec<f64> = series
            .iter()
            .map(|(d, _)| (*d - start).num_days() as f64 / span_days)
            .collect();
        let y: Vec<f64> = series.iter().map(|(_, v)| v / y_scale).collect();

        let changepoints = place_changepoints(&t, config);
        let seasonal_specs = config.seasonalities();

        let mut penalty = vec![
            1.0 / BASE_PRIOR_SCALE.powi(2),
            1.0 / BASE_PRIOR_SCALE.powi(2),
        ];
        penalty.extend(std::iter::repeat_n(
            1.0 / config.changepoint_prior_scale.powi(2),
            changepoints.len(),
        ));
        for (_, _, order) in &seasonal_specs {
            penalty.extend(std::iter::repeat_n(
                1.0 / config.seasonality_prior_scale.powi(2),
                2 * order,
            ));
        }

        let design: Vec<Vec<f64>> = series
            .iter()
            .zip(&t)
            .map(|((date, _), &ti)| {
                let day = absolute_day(*date);
                let mut row = vec![1.0, ti];
                row.extend(changepoints.iter().map(|&s| (ti - s).max(0.0)));
                for (_, period, order) in &seasonal_specs {
                    row.extend(SeasonalTerm::features(*period, *order, day));
                }
                row
            })
            .collect();

        let beta = linalg::ridge_solve(&design, &y, &penalty)?;
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(EngineError::computation("decomposition produced non-finite coefficients"));
        }

        let n_cp = changepoints.len();
        let mut offset = 2 + n_cp;
        let seasonal = seasonal_specs
            .into_iter()
            .map(|(name, period, order)| {
                let coefficients = beta[offset..offset + 2 * order].to_vec();
                offset += 2 * order;
                SeasonalTerm {
                    name: name.to_string(),
                    period,
                    order,
                    coefficients,
                }
            })
            .collect();

        let mut model = Self {
            start,
            end,
            span_days,
            y_scale,
            intercept: beta[0],
            slope: beta[1],
            changepoints,
            deltas: beta[2..2 + n_cp].to_vec(),
            seasonal,
            sigma: 0.0,
            z: stats::normal_quantile(0.5 + config.interval_width.clamp(0.0, 0.999) / 2.0),
        };

        let residuals: Vec<f64> = series
            .iter()
            .map(|(date, actual)| actual - model.components(*date).total())
            .collect();
        let mean_sq = residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64;
        model.sigma = mean_sq.sqrt();

        Ok(model)
    }

    /// Component values at a date.
    pub fn components(&self, date: NaiveDate) -> Components {
        let t = (date - self.start).num_days() as f64 / self.span_days;
        let day = absolute_day(date);

        let trend = self.intercept
            + self.slope * t
            + self
                .changepoints
                .iter()
                .zip(&self.deltas)
                .map(|(&s, &d)| d * (t - s).max(0.0))
                .sum::<f64>();

        let mut components = Components {
            trend: trend * self.y_scale,
            ..Components::default()
        };
        for term in &self.seasonal {
            let value = term.evaluate(day) * self.y_scale;
            match term.name.as_str() {
                "weekly" => components.weekly = value,
                "yearly" => components.yearly = value,
                _ => components.monthly = value,
            }
        }
        components
    }

    /// Prediction with an interval that widens past the last observed date.
    pub fn estimate(&self, date: NaiveDate) -> Estimate {
        let mean = self.components(date).total();
        let sd = (self.sigma.powi(2) + self.trend_sd(date).powi(2)).sqrt();
        Estimate {
            mean,
            lower: mean - self.z * sd,
            upper: mean + self.z * sd,
        }
    }

    /// Trend uncertainty from future changepoints, zero inside the history.
    fn trend_sd(&self, date: NaiveDate) -> f64 {
        let ahead = (date - self.end).num_days();
        if ahead <= 0 || self.deltas.is_empty() {
            return 0.0;
        }
        let mean_abs_delta =
            self.deltas.iter().map(|d| d.abs()).sum::<f64>() / self.deltas.len() as f64;
        let dt = ahead as f64 / self.span_days;
        let rate = self.changepoints.len() as f64;
        mean_abs_delta * dt * (rate * dt).sqrt() * self.y_scale
    }

    /// Residual standard deviation.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Number of trend changepoints.
    pub fn n_changepoints(&self) -> usize {
        self.changepoints.len()
    }

    /// Last observed date.
    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

fn absolute_day(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce())
}

/// Evenly spaced changepoints over the leading `changepoint_range` of history.
fn place_changepoints(t: &[f64], config: &ForecastConfig) -> Vec<f64> {
    let hist_size = ((t.len() as f64) * config.changepoint_range.clamp(0.0, 1.0)).floor() as usize;
    let count = config.n_changepoints.min(hist_size.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }

    let last = (hist_size - 1) as f64;
    (1..=count)
        .map(|k| {
            let idx = (k as f64 * last / count as f64).round() as usize;
            t[idx.min(t.len() - 1)]
        })
        .collect()
}
