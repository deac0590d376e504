//! AND decision fusion
//!
//! A row is accepted only when every column reaches its own threshold. The
//! thresholds are computed per system beforehand (see `score-threshold`).

use super::ScoreFuser;
use fvas_common::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndRule {
    thresholds: Vec<f64>,
}

impl AndRule {
    /// One threshold per input column, in column order
    pub fn new(thresholds: Vec<f64>, n_columns: usize) -> Result<Self> {
        if thresholds.len() != n_columns {
            return Err(Error::Config(format!(
                "{} thresholds given for {} score columns",
                thresholds.len(),
                n_columns
            )));
        }
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn accepts(&self, row: &[f64]) -> bool {
        row.iter().zip(&self.thresholds).all(|(v, t)| v >= t)
    }
}

impl ScoreFuser for AndRule {
    fn n_inputs(&self) -> usize {
        self.thresholds.len()
    }

    fn fuse_row(&self, row: &[f64]) -> f64 {
        if self.accepts(row) {
            1.0
        } else {
            0.0
        }
    }
}
