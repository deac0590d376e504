//! Linear logistic regression fusion (LLR, and LLR_P over augmented features)
//!
//! Trained by Newton-Raphson (iteratively reweighted least squares) on a
//! prior-weighted objective: the genuine class carries total weight `prior`, the
//! negative class `1 - prior`, regardless of class sizes. The bias is shifted by
//! `-logit(prior)` afterwards so the output is a log-likelihood ratio.

use super::ScoreFuser;
use crate::matrix::ScoreMatrix;
use fvas_common::config::LlrSettings;
use fvas_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Keeps the Hessian invertible when a column carries no information
const RIDGE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticFusion {
    pub weights: Vec<f64>,
    pub bias: f64,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Solve `a x = b` in place by Gaussian elimination with partial pivoting
///
/// `a` is `n x n` row-major. Returns `None` for a singular system.
fn solve(mut a: Vec<f64>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i * n + col]
                .abs()
                .total_cmp(&a[j * n + col].abs())
        })?;
        if a[pivot * n + col].abs() < f64::EPSILON {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[row * n + col] / a[col * n + col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row * n + k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row * n + row];
    }
    Some(x)
}

impl LogisticFusion {
    pub fn train(
        positives: &ScoreMatrix,
        negatives: &ScoreMatrix,
        settings: &LlrSettings,
    ) -> Result<Self> {
        if !(settings.prior > 0.0 && settings.prior < 1.0) {
            return Err(Error::Config(format!(
                "LLR prior must lie in (0, 1), got {}",
                settings.prior
            )));
        }
        if settings.regularization < 0.0 {
            return Err(Error::Config(format!(
                "LLR regularization must be non-negative, got {}",
                settings.regularization
            )));
        }

        let d = positives.n_cols();
        let p = d + 1;
        let classes = [
            (positives, 1.0, settings.prior / positives.n_rows() as f64),
            (negatives, 0.0, (1.0 - settings.prior) / negatives.n_rows() as f64),
        ];

        let mut theta = vec![0.0; p];
        let mut iterations = 0;
        for _ in 0..settings.max_iterations {
            iterations += 1;
            let mut grad = vec![0.0; p];
            let mut hess = vec![0.0; p * p];

            for (matrix, target, weight) in &classes {
                for row in matrix.rows() {
                    let z = row.iter().zip(&theta).map(|(x, w)| x * w).sum::<f64>() + theta[d];
                    let s = sigmoid(z);
                    let r = weight * (s - target);
                    let h = weight * s * (1.0 - s);
                    for i in 0..p {
                        let xi = if i < d { row[i] } else { 1.0 };
                        grad[i] += r * xi;
                        for j in 0..p {
                            let xj = if j < d { row[j] } else { 1.0 };
                            hess[i * p + j] += h * xi * xj;
                        }
                    }
                }
            }
            for j in 0..d {
                grad[j] += settings.regularization * theta[j];
                hess[j * p + j] += settings.regularization;
            }
            for j in 0..p {
                hess[j * p + j] += RIDGE;
            }

            let step = match solve(hess, grad) {
                Some(step) if step.iter().all(|v| v.is_finite()) => step,
                _ => {
                    warn!("LLR Newton step is singular after {} iterations, stopping", iterations);
                    break;
                }
            };
            let max_step = step.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            for (t, s) in theta.iter_mut().zip(&step) {
                *t -= s;
            }
            if max_step < settings.tolerance {
                break;
            }
        }

        let offset = (settings.prior / (1.0 - settings.prior)).ln();
        let bias = theta[d] - offset;
        theta.truncate(d);
        debug!(
            "LLR trained in {} iterations: weights {:?}, bias {:.6}",
            iterations, theta, bias
        );
        Ok(Self {
            weights: theta,
            bias,
        })
    }
}

impl ScoreFuser for LogisticFusion {
    fn n_inputs(&self) -> usize {
        self.weights.len()
    }

    fn fuse_row(&self, row: &[f64]) -> f64 {
        row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>() + self.bias
    }
}
