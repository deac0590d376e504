//! Column normalization with statistics fixed on the training split
//!
//! Parameters are fitted once on training rows and reused, never refitted, for
//! devel and test. On disk they are a 4 x D array: min, max, mean, std.

use crate::matrix::ScoreMatrix;
use fvas_common::config::{DegeneratePolicy, NormMethod};
use fvas_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Column-wise statistics of a reference matrix
#[derive(Debug, Clone, PartialEq)]
pub struct NormParams {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub mean: Vec<f64>,
    /// Population standard deviation
    pub std: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NormParamsFile {
    shape: [usize; 2],
    data: Vec<Vec<f64>>,
}

impl NormParams {
    /// Fit on `matrix`, resolving zero-variance columns by `policy`
    pub fn fit(matrix: &ScoreMatrix, policy: DegeneratePolicy) -> Result<Self> {
        let n = matrix.n_rows();
        let d = matrix.n_cols();
        if n == 0 {
            return Err(Error::InsufficientTrainingData(
                "cannot fit normalization on an empty matrix".to_string(),
            ));
        }

        let mut min = vec![f64::INFINITY; d];
        let mut max = vec![f64::NEG_INFINITY; d];
        let mut mean = vec![0.0; d];
        for row in matrix.rows() {
            for (j, &v) in row.iter().enumerate() {
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
                mean[j] += v;
            }
        }
        for m in &mut mean {
            *m /= n as f64;
        }

        let mut std = vec![0.0; d];
        for row in matrix.rows() {
            for (j, &v) in row.iter().enumerate() {
                let diff = v - mean[j];
                std[j] += diff * diff;
            }
        }
        for s in &mut std {
            *s = (*s / n as f64).sqrt();
        }

        for (column, s) in std.iter_mut().enumerate() {
            if *s == 0.0 {
                match policy {
                    DegeneratePolicy::Fail => return Err(Error::DegenerateColumn { column }),
                    DegeneratePolicy::Substitute => {
                        warn!("Column {} has zero variance, using std = 1", column);
                        *s = 1.0;
                    }
                }
            }
        }

        debug!("Fitted normalization on {} rows x {} columns", n, d);
        Ok(Self {
            min,
            max,
            mean,
            std,
        })
    }

    pub fn n_cols(&self) -> usize {
        self.mean.len()
    }

    fn check_width(&self, matrix: &ScoreMatrix) -> Result<()> {
        if matrix.n_cols() != self.n_cols() {
            return Err(Error::ShapeMismatch(format!(
                "normalization fitted on {} columns, matrix has {}",
                self.n_cols(),
                matrix.n_cols()
            )));
        }
        Ok(())
    }

    /// `(x - mean) / std` per column
    pub fn z_norm(&self, matrix: &ScoreMatrix) -> Result<ScoreMatrix> {
        self.check_width(matrix)?;
        let mut out = matrix.clone();
        for row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (*v - self.mean[j]) / self.std[j];
            }
        }
        Ok(out)
    }

    /// `(x - min) / (max - min)` per column; a zero range is treated as 1
    pub fn min_max(&self, matrix: &ScoreMatrix) -> Result<ScoreMatrix> {
        self.check_width(matrix)?;
        let mut out = matrix.clone();
        for row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                let range = self.max[j] - self.min[j];
                let range = if range == 0.0 { 1.0 } else { range };
                *v = (*v - self.min[j]) / range;
            }
        }
        Ok(out)
    }

    /// Scale `matrix` by the configured method
    pub fn apply(&self, matrix: &ScoreMatrix, method: NormMethod) -> Result<ScoreMatrix> {
        match method {
            NormMethod::ZNorm => self.z_norm(matrix),
            NormMethod::MinMax => self.min_max(matrix),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let file = NormParamsFile {
            shape: [4, self.n_cols()],
            data: vec![
                self.min.clone(),
                self.max.clone(),
                self.mean.clone(),
                self.std.clone(),
            ],
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: NormParamsFile = serde_json::from_str(content)?;
        let [rows, cols] = file.shape;
        if rows != 4 || file.data.len() != 4 || file.data.iter().any(|r| r.len() != cols) {
            return Err(Error::ShapeMismatch(format!(
                "normalization parameters must be 4 x {}, found {} rows",
                cols,
                file.data.len()
            )));
        }
        let mut data = file.data.into_iter();
        let mut next = || data.next().unwrap_or_default();
        Ok(Self {
            min: next(),
            max: next(),
            mean: next(),
            std: next(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read normalization parameters {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }
}
