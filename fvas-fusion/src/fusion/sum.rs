//! SUM fusion: plain column sum of (normalized) scores

use super::ScoreFuser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SumRule {
    n_inputs: usize,
}

impl SumRule {
    pub fn new(n_inputs: usize) -> Self {
        Self { n_inputs }
    }
}

impl ScoreFuser for SumRule {
    fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    fn fuse_row(&self, row: &[f64]) -> f64 {
        row.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::ScoreMatrix;

    #[test]
    fn test_sum_of_row() {
        let rule = SumRule::new(2);
        assert_eq!(rule.fuse_row(&[0.2, 0.3]), 0.5);

        let m = ScoreMatrix::from_rows(&[vec![0.2, 0.3], vec![-1.0, 4.0]]).unwrap();
        assert_eq!(rule.apply(&m).unwrap(), vec![0.5, 3.0]);
    }
}
