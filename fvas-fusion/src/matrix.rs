//! Row-major score matrix and its parallel label vector
//!
//! Rows are scored trials, columns are upstream algorithms in the fixed order
//! face verification, anti-spoofing, quality features.

use fvas_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Per-row ground truth: 1 genuine, 0 impostor (or any negative in binary mode), -1 attack
pub type Label = i8;

pub const GENUINE: Label = 1;
pub const IMPOSTOR: Label = 0;
pub const ATTACK: Label = -1;

/// Dense row-major matrix of `f64` scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMatrix {
    data: Vec<f64>,
    n_cols: usize,
}

impl ScoreMatrix {
    /// Empty matrix with a fixed column count
    pub fn empty(n_cols: usize) -> Self {
        Self {
            data: Vec::new(),
            n_cols,
        }
    }

    /// Wrap flat row-major data
    pub fn from_flat(data: Vec<f64>, n_cols: usize) -> Result<Self> {
        if n_cols == 0 && !data.is_empty() {
            return Err(Error::ShapeMismatch(
                "non-empty data with zero columns".into(),
            ));
        }
        if n_cols > 0 && data.len() % n_cols != 0 {
            return Err(Error::ShapeMismatch(format!(
                "data length {} not divisible by n_cols {}",
                data.len(),
                n_cols
            )));
        }
        Ok(Self { data, n_cols })
    }

    /// Caller guarantees `data.len()` is a multiple of `n_cols`
    pub(crate) fn from_raw(data: Vec<f64>, n_cols: usize) -> Self {
        debug_assert!((n_cols == 0 && data.is_empty()) || (n_cols > 0 && data.len() % n_cols == 0));
        Self { data, n_cols }
    }

    /// Build from rows; every row must have the same width
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut matrix = Self::empty(n_cols);
        for row in rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    pub fn n_rows(&self) -> usize {
        if self.n_cols == 0 {
            0
        } else {
            self.data.len() / self.n_cols
        }
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.n_cols..(row + 1) * self.n_cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics; a zero-width matrix has no rows
        self.data.chunks_exact(self.n_cols.max(1))
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [f64]> {
        self.data.chunks_exact_mut(self.n_cols.max(1))
    }

    /// Copy of one column
    pub fn column(&self, col: usize) -> Vec<f64> {
        self.rows().map(|r| r[col]).collect()
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.n_cols {
            return Err(Error::ShapeMismatch(format!(
                "row has {} columns, matrix has {}",
                row.len(),
                self.n_cols
            )));
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    /// Append the rows of another matrix of the same width
    pub fn vstack(&mut self, other: &ScoreMatrix) -> Result<()> {
        if other.n_cols != self.n_cols {
            return Err(Error::ShapeMismatch(format!(
                "cannot stack {} columns under {} columns",
                other.n_cols, self.n_cols
            )));
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// Concatenate blocks column-wise; all blocks must have the same row count
    pub fn hstack(blocks: &[&ScoreMatrix]) -> Result<ScoreMatrix> {
        let n_rows = match blocks.first() {
            Some(first) => first.n_rows(),
            None => return Ok(ScoreMatrix::empty(0)),
        };
        if let Some(bad) = blocks.iter().find(|b| b.n_rows() != n_rows) {
            return Err(Error::ShapeMismatch(format!(
                "cannot join blocks with {} and {} rows",
                n_rows,
                bad.n_rows()
            )));
        }
        let n_cols: usize = blocks.iter().map(|b| b.n_cols).sum();
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for r in 0..n_rows {
            for block in blocks {
                if block.n_cols > 0 {
                    data.extend_from_slice(block.row(r));
                }
            }
        }
        Ok(ScoreMatrix { data, n_cols })
    }

    /// Keep rows for which `keep(row_index, row)` is true
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize, &[f64]) -> bool,
    {
        if self.n_cols == 0 {
            return;
        }
        let n_cols = self.n_cols;
        let mut kept = Vec::with_capacity(self.data.len());
        for (i, row) in self.data.chunks_exact(n_cols).enumerate() {
            if keep(i, row) {
                kept.extend_from_slice(row);
            }
        }
        self.data = kept;
    }

    /// New matrix holding the rows at `indices`, in that order
    pub fn select_rows(&self, indices: &[usize]) -> ScoreMatrix {
        let mut data = Vec::with_capacity(indices.len() * self.n_cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        ScoreMatrix {
            data,
            n_cols: self.n_cols,
        }
    }

    /// New matrix without the given columns (out-of-range indices are ignored)
    pub fn drop_columns(&self, remove: &[usize]) -> ScoreMatrix {
        let keep: Vec<usize> = (0..self.n_cols).filter(|c| !remove.contains(c)).collect();
        let mut data = Vec::with_capacity(self.n_rows() * keep.len());
        for row in self.rows() {
            data.extend(keep.iter().map(|&c| row[c]));
        }
        ScoreMatrix {
            data,
            n_cols: keep.len(),
        }
    }

    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|v| v.is_nan())
    }
}

/// Rows with the given label, as a new matrix
pub fn rows_with_label(matrix: &ScoreMatrix, labels: &[Label], label: Label) -> ScoreMatrix {
    let indices: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == label)
        .map(|(i, _)| i)
        .collect();
    matrix.select_rows(&indices)
}

/// Drop every row containing a NaN, filtering labels in lockstep
///
/// Returns the number of dropped rows.
pub fn drop_nan_rows(matrix: &mut ScoreMatrix, labels: &mut Vec<Label>) -> Result<usize> {
    if matrix.n_rows() != labels.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} rows but {} labels",
            matrix.n_rows(),
            labels.len()
        )));
    }
    let keep: Vec<bool> = matrix.rows().map(|r| !r.iter().any(|v| v.is_nan())).collect();
    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        matrix.retain_rows(|i, _| keep[i]);
        let mut flags = keep.iter();
        labels.retain(|_| *flags.next().unwrap_or(&false));
    }
    Ok(dropped)
}
