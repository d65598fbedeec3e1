//! Per-column standardization fitted once on training data.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::stats;

/// Zero-mean, unit-variance scaler.
///
/// Columns with zero variance keep a unit scale so they pass through centered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and population standard deviations.
    pub fn fit(data: &[Vec<f64>]) -> Result<Self> {
        let Some(first) = data.first() else {
            return Err(EngineError::computation("cannot fit scaler on empty data"));
        };
        let width = first.len();

        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);
        for col in 0..width {
            let column: Vec<f64> = data.iter().map(|row| row[col]).collect();
            let std = stats::population_std(&column);
            means.push(stats::mean(&column));
            scales.push(if std > 0.0 { std } else { 1.0 });
        }

        Ok(Self { means, scales })
    }

    /// Apply the fitted transform.
    pub fn transform(&self, data: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        data.iter()
            .map(|row| {
                if row.len() != self.means.len() {
                    return Err(EngineError::computation(format!(
                        "scaler fitted on {} columns, got {}",
                        self.means.len(),
                        row.len()
                    )));
                }
                Ok(row
                    .iter()
                    .zip(self.means.iter().zip(&self.scales))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect())
            })
            .collect()
    }
}
