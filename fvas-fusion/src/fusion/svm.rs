//! Linear SVM fusion
//!
//! Soft-margin linear SVM trained with Pegasos stochastic sub-gradient descent.
//! The bias is an extra constant feature. Classes are reweighted to equal total
//! mass, since licit training sets hold far more impostor than genuine rows.
//! Sample order is shuffled per epoch from a fixed seed, so training is repeatable.

use super::ScoreFuser;
use crate::matrix::ScoreMatrix;
use fvas_common::config::SvmSettings;
use fvas_common::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSvm {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearSvm {
    pub fn train(
        positives: &ScoreMatrix,
        negatives: &ScoreMatrix,
        settings: &SvmSettings,
    ) -> Result<Self> {
        if settings.lambda <= 0.0 {
            return Err(Error::Config(format!(
                "SVM lambda must be positive, got {}",
                settings.lambda
            )));
        }

        let d = positives.n_cols();
        let n_pos = positives.n_rows();
        let n_neg = negatives.n_rows();
        let n = n_pos + n_neg;
        let pos_weight = n as f64 / (2.0 * n_pos as f64);
        let neg_weight = n as f64 / (2.0 * n_neg as f64);

        // (is_positive, row index) pairs, shuffled in place every epoch
        let mut order: Vec<(bool, usize)> = (0..n_pos)
            .map(|i| (true, i))
            .chain((0..n_neg).map(|i| (false, i)))
            .collect();

        let mut rng = StdRng::seed_from_u64(settings.seed);
        let radius = 1.0 / settings.lambda.sqrt();
        // weights[d] is the bias
        let mut w = vec![0.0; d + 1];
        let mut t: u64 = 0;

        for _ in 0..settings.epochs.max(1) {
            order.shuffle(&mut rng);
            for &(positive, i) in &order {
                t += 1;
                let eta = 1.0 / (settings.lambda * t as f64);
                let (row, y, c) = if positive {
                    (positives.row(i), 1.0, pos_weight)
                } else {
                    (negatives.row(i), -1.0, neg_weight)
                };
                let margin = y * (row.iter().zip(&w).map(|(x, wj)| x * wj).sum::<f64>() + w[d]);

                let shrink = 1.0 - eta * settings.lambda;
                for wj in w.iter_mut() {
                    *wj *= shrink;
                }
                if margin < 1.0 {
                    let step = eta * c * y;
                    for (wj, x) in w.iter_mut().zip(row) {
                        *wj += step * x;
                    }
                    w[d] += step;
                }

                let norm = w.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > radius {
                    let scale = radius / norm;
                    for wj in w.iter_mut() {
                        *wj *= scale;
                    }
                }
            }
        }

        let bias = w[d];
        w.truncate(d);
        debug!("SVM trained over {} updates: weights {:?}, bias {:.6}", t, w, bias);
        Ok(Self { weights: w, bias })
    }
}

impl ScoreFuser for LinearSvm {
    fn n_inputs(&self) -> usize {
        self.weights.len()
    }

    /// Signed decision value
    fn fuse_row(&self, row: &[f64]) -> f64 {
        row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>() + self.bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two grids of points centred on (+2, +2) and (-2, -2)
    fn clusters() -> (ScoreMatrix, ScoreMatrix) {
        let mut pos = Vec::new();
        let mut neg = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                let dx = (i as f64 - 2.0) * 0.3;
                let dy = (j as f64 - 2.0) * 0.3;
                pos.push(vec![2.0 + dx, 2.0 + dy]);
                neg.push(vec![-2.0 + dx, -2.0 + dy]);
            }
        }
        (
            ScoreMatrix::from_rows(&pos).unwrap(),
            ScoreMatrix::from_rows(&neg).unwrap(),
        )
    }

    #[test]
    fn test_separates_clusters() {
        let (pos, neg) = clusters();
        let settings = SvmSettings {
            lambda: 0.01,
            ..SvmSettings::default()
        };
        let svm = LinearSvm::train(&pos, &neg, &settings).unwrap();
        assert!(svm.apply(&pos).unwrap().iter().all(|&s| s > 0.0));
        assert!(svm.apply(&neg).unwrap().iter().all(|&s| s < 0.0));
    }

    #[test]
    fn test_same_seed_same_model() {
        let (pos, neg) = clusters();
        let settings = SvmSettings::default();
        let a = LinearSvm::train(&pos, &neg, &settings).unwrap();
        let b = LinearSvm::train(&pos, &neg, &settings).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_non_positive_lambda() {
        let (pos, neg) = clusters();
        let settings = SvmSettings {
            lambda: 0.0,
            ..SvmSettings::default()
        };
        assert!(matches!(
            LinearSvm::train(&pos, &neg, &settings),
            Err(Error::Config(_))
        ));
    }
}
