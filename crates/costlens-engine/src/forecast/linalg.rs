//! Dense ridge regression solved through a Cholesky factorization.

use crate::error::{EngineError, Result};

/// Solve `(XᵀX + diag(penalty)) β = Xᵀy`.
///
/// `design` is row-major with one row per observation. `penalty` holds one
/// non-negative ridge weight per column.
pub fn ridge_solve(design: &[Vec<f64>], y: &[f64], penalty: &[f64]) -> Result<Vec<f64>> {
    let p = penalty.len();
    if design.len() != y.len() {
        return Err(EngineError::computation(format!(
            "design has {} rows but target has {}",
            design.len(),
            y.len()
        )));
    }
    if design.iter().any(|row| row.len() != p) {
        return Err(EngineError::computation("design width does not match penalty"));
    }

    let mut gram = vec![vec![0.0; p]; p];
    let mut rhs = vec![0.0; p];
    for (row, &target) in design.iter().zip(y) {
        for i in 0..p {
            if row[i] == 0.0 {
                continue;
            }
            rhs[i] += row[i] * target;
            for j in 0..=i {
                gram[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..p {
        gram[i][i] += penalty[i];
        for j in 0..i {
            gram[j][i] = gram[i][j];
        }
    }

    let lower = cholesky(&gram)?;
    Ok(cholesky_solve(&lower, &rhs))
}

/// Lower-triangular factor `L` with `A = L Lᵀ`.
fn cholesky(a: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let pivot = a[i][i] - sum;
                if !pivot.is_finite() || pivot <= 0.0 {
                    return Err(EngineError::computation(format!(
                        "normal equations are not positive definite at column {}",
                        i
                    )));
                }
                l[i][j] = pivot.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }
    Ok(l)
}

fn cholesky_solve(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();

    // L z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|k| l[i][k] * z[k]).sum();
        z[i] = (b[i] - sum) / l[i][i];
    }

    // Lᵀ x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (z[i] - sum) / l[i][i];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_fit_without_penalty() {
        // y = 2 + 3x
        let design: Vec<Vec<f64>> = (0..5).map(|x| vec![1.0, x as f64]).collect();
        let y: Vec<f64> = (0..5).map(|x| 2.0 + 3.0 * x as f64).collect();

        let beta = ridge_solve(&design, &y, &[0.0, 0.0]).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-9);
        assert!((beta[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_penalty_shrinks() {
        let design: Vec<Vec<f64>> = (0..5).map(|x| vec![x as f64]).collect();
        let y: Vec<f64> = (0..5).map(|x| x as f64).collect();

        let free = ridge_solve(&design, &y, &[0.0]).unwrap()[0];
        let shrunk = ridge_solve(&design, &y, &[100.0]).unwrap()[0];
        assert!((free - 1.0).abs() < 1e-9);
        assert!(shrunk < free && shrunk > 0.0);
    }

    #[test]
    fn test_singular_system_fails() {
        let design = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        let err = ridge_solve(&design, &[1.0, 2.0], &[0.0, 0.0]).unwrap_err();
        assert!(matches!(err, EngineError::ComputationFailure(_)));
    }
}
