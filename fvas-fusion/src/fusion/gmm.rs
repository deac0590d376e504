//! GMM fusion
//!
//! One diagonal-covariance Gaussian mixture per class, genuine and negative
//! (impostors and attacks together). The fused score is the log-likelihood ratio
//! `log p(x | genuine) - log p(x | negative)`.
//!
//! Mixtures are fitted by EM from a k-means++ seeding; variances are floored so a
//! component collapsing onto a few identical scores stays finite.

use super::ScoreFuser;
use crate::matrix::ScoreMatrix;
use fvas_common::config::GmmSettings;
use fvas_common::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Diagonal-covariance Gaussian mixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagonalGmm {
    pub weights: Vec<f64>,
    /// `components x dim`, row-major
    pub means: Vec<f64>,
    /// `components x dim`, row-major
    pub variances: Vec<f64>,
    pub dim: usize,
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn sq_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// k-means++ seeding: first centre uniform, later ones proportional to squared distance
fn kmeans_pp(data: &ScoreMatrix, k: usize, rng: &mut StdRng) -> Vec<f64> {
    let n = data.n_rows();
    let dim = data.n_cols();
    let mut centres = Vec::with_capacity(k * dim);
    centres.extend_from_slice(data.row(rng.gen_range(0..n)));

    let mut dists = vec![f64::INFINITY; n];
    for c in 1..k {
        let last = &centres[(c - 1) * dim..c * dim];
        for (i, row) in data.rows().enumerate() {
            dists[i] = dists[i].min(sq_distance(row, last));
        }
        let total: f64 = dists.iter().sum();
        let chosen = if total > 0.0 {
            let threshold = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            dists
                .iter()
                .position(|&d| {
                    cumulative += d;
                    cumulative >= threshold
                })
                .unwrap_or(n - 1)
        } else {
            c % n
        };
        centres.extend_from_slice(data.row(chosen));
    }
    centres
}

impl DiagonalGmm {
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    fn mean(&self, k: usize) -> &[f64] {
        &self.means[k * self.dim..(k + 1) * self.dim]
    }

    fn variance(&self, k: usize) -> &[f64] {
        &self.variances[k * self.dim..(k + 1) * self.dim]
    }

    /// `log w_k + log N(x | mu_k, diag(var_k))` for every component
    fn component_log_densities(&self, x: &[f64], out: &mut [f64]) {
        for (k, slot) in out.iter_mut().enumerate() {
            let mut log_p = self.weights[k].ln();
            for ((xi, mi), vi) in x.iter().zip(self.mean(k)).zip(self.variance(k)) {
                log_p -= 0.5 * ((2.0 * PI * vi).ln() + (xi - mi) * (xi - mi) / vi);
            }
            *slot = log_p;
        }
    }

    pub fn log_likelihood(&self, x: &[f64]) -> f64 {
        let mut buf = vec![0.0; self.n_components()];
        self.component_log_densities(x, &mut buf);
        log_sum_exp(&buf)
    }

    /// Fit by expectation-maximization
    pub fn fit(data: &ScoreMatrix, settings: &GmmSettings, seed: u64) -> Result<Self> {
        let n = data.n_rows();
        let dim = data.n_cols();
        if n == 0 {
            return Err(Error::InsufficientTrainingData(
                "cannot fit a mixture on zero rows".to_string(),
            ));
        }
        if settings.components == 0 {
            return Err(Error::Config("GMM needs at least one component".to_string()));
        }
        let k = settings.components.min(n);
        let floor = settings.variance_floor.max(f64::MIN_POSITIVE);

        // start every component from the global variance
        let mut global_mean = vec![0.0; dim];
        for row in data.rows() {
            for (m, x) in global_mean.iter_mut().zip(row) {
                *m += x / n as f64;
            }
        }
        let mut global_var = vec![0.0; dim];
        for row in data.rows() {
            for j in 0..dim {
                global_var[j] += (row[j] - global_mean[j]).powi(2) / n as f64;
            }
        }
        for v in &mut global_var {
            *v = v.max(floor);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut gmm = DiagonalGmm {
            weights: vec![1.0 / k as f64; k],
            means: kmeans_pp(data, k, &mut rng),
            variances: global_var.repeat(k),
            dim,
        };

        let mut resp = vec![0.0; n * k];
        let mut previous = f64::NEG_INFINITY;
        let mut iterations = 0;
        for _ in 0..settings.max_iterations {
            iterations += 1;

            // E step
            let mut total_ll = 0.0;
            for (i, row) in data.rows().enumerate() {
                let slots = &mut resp[i * k..(i + 1) * k];
                gmm.component_log_densities(row, slots);
                let norm = log_sum_exp(slots);
                total_ll += norm;
                for r in slots.iter_mut() {
                    *r = (*r - norm).exp();
                }
            }
            let mean_ll = total_ll / n as f64;

            // M step
            for c in 0..k {
                let nk: f64 = (0..n).map(|i| resp[i * k + c]).sum();
                if nk < 1e-10 {
                    // empty component keeps its parameters
                    continue;
                }
                gmm.weights[c] = nk / n as f64;
                let mut mean = vec![0.0; dim];
                for (i, row) in data.rows().enumerate() {
                    let r = resp[i * k + c];
                    for j in 0..dim {
                        mean[j] += r * row[j];
                    }
                }
                for m in &mut mean {
                    *m /= nk;
                }
                let mut var = vec![0.0; dim];
                for (i, row) in data.rows().enumerate() {
                    let r = resp[i * k + c];
                    for j in 0..dim {
                        var[j] += r * (row[j] - mean[j]).powi(2);
                    }
                }
                for v in &mut var {
                    *v = (*v / nk).max(floor);
                }
                gmm.means[c * dim..(c + 1) * dim].copy_from_slice(&mean);
                gmm.variances[c * dim..(c + 1) * dim].copy_from_slice(&var);
            }
            let weight_sum: f64 = gmm.weights.iter().sum();
            for w in &mut gmm.weights {
                *w /= weight_sum;
            }

            if (mean_ll - previous).abs() < settings.tolerance {
                break;
            }
            previous = mean_ll;
        }

        debug!(
            "GMM with {} components fitted on {} rows in {} iterations (mean log-likelihood {:.4})",
            k, n, iterations, previous
        );
        Ok(gmm)
    }
}

/// Genuine and negative mixtures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmmFusion {
    pub genuine: DiagonalGmm,
    pub negative: DiagonalGmm,
}

impl GmmFusion {
    pub fn train(
        positives: &ScoreMatrix,
        negatives: &ScoreMatrix,
        settings: &GmmSettings,
    ) -> Result<Self> {
        Ok(Self {
            genuine: DiagonalGmm::fit(positives, settings, settings.seed)?,
            negative: DiagonalGmm::fit(negatives, settings, settings.seed.wrapping_add(1))?,
        })
    }
}

impl ScoreFuser for GmmFusion {
    fn n_inputs(&self) -> usize {
        self.genuine.dim
    }

    fn fuse_row(&self, row: &[f64]) -> f64 {
        self.genuine.log_likelihood(row) - self.negative.log_likelihood(row)
    }
}
