//! Score store reader
//!
//! Every score directory holds one JSON record per sample at `<dir>/<path>.json`.
//! A record is either a flat array with one score per frame (`null` stands for a
//! failed computation and reads as NaN) or an array of frames, each an array of
//! equal width. A bare number is a single-frame, single-column record.

use crate::matrix::ScoreMatrix;
use fvas_common::config::FramePolicy;
use fvas_common::dataset::Sample;
use fvas_common::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Scores of an ordered sample list across an ordered directory list
#[derive(Debug, Clone)]
pub struct ScoreBlock {
    pub matrix: ScoreMatrix,
    /// Rows contributed by each sample, in sample order
    pub rows_per_sample: Vec<usize>,
}

impl ScoreBlock {
    pub fn n_rows(&self) -> usize {
        self.matrix.n_rows()
    }
}

/// One decoded record: `frames x width` values, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub frames: usize,
    pub width: usize,
    pub values: Vec<f64>,
}

impl ScoreRecord {
    fn frame(&self, index: usize) -> &[f64] {
        &self.values[index * self.width..(index + 1) * self.width]
    }
}

fn number(value: &Value, path: &Path) -> Result<f64> {
    match value {
        Value::Null => Ok(f64::NAN),
        Value::Number(n) => n.as_f64().ok_or_else(|| {
            Error::Parse(format!("{}: score out of range", path.display()))
        }),
        other => Err(Error::Parse(format!(
            "{}: expected a number or null, found {}",
            path.display(),
            other
        ))),
    }
}

/// Decode a record from its JSON value
pub fn decode_record(value: &Value, path: &Path) -> Result<ScoreRecord> {
    let items = match value {
        Value::Array(items) => items,
        scalar => {
            return Ok(ScoreRecord {
                frames: 1,
                width: 1,
                values: vec![number(scalar, path)?],
            })
        }
    };

    if items.iter().all(|v| !v.is_array()) {
        let values = items
            .iter()
            .map(|v| number(v, path))
            .collect::<Result<Vec<_>>>()?;
        return Ok(ScoreRecord {
            frames: values.len(),
            width: 1,
            values,
        });
    }

    let width = match items.first() {
        Some(Value::Array(first)) => first.len(),
        _ => {
            return Err(Error::ShapeMismatch(format!(
                "{}: record mixes scalars and frame arrays",
                path.display()
            )))
        }
    };
    let mut values = Vec::with_capacity(items.len() * width);
    for item in items {
        match item {
            Value::Array(frame) if frame.len() == width => {
                for v in frame {
                    values.push(number(v, path)?);
                }
            }
            _ => {
                return Err(Error::ShapeMismatch(format!(
                    "{}: ragged record, expected {} scores per frame",
                    path.display(),
                    width
                )))
            }
        }
    }
    Ok(ScoreRecord {
        frames: items.len(),
        width,
        values,
    })
}

/// Load the record of one sample from one directory
pub fn load_record(sample: &Sample, dir: &Path) -> Result<ScoreRecord> {
    let path = sample.record_path(dir);
    if !path.is_file() {
        return Err(Error::MissingScoreFile(path));
    }
    let content = std::fs::read_to_string(&path)?;
    let value: Value = serde_json::from_str(&content)?;
    decode_record(&value, &path)
}

/// NaN-aware per-column mean over frames; all-NaN columns stay NaN
fn frame_mean(records: &[ScoreRecord], width: usize, frames: usize) -> Vec<f64> {
    let mut sums = vec![0.0; width];
    let mut counts = vec![0usize; width];
    for f in 0..frames {
        let mut col = 0;
        for record in records {
            for &v in record.frame(f) {
                if !v.is_nan() {
                    sums[col] += v;
                    counts[col] += 1;
                }
                col += 1;
            }
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(&s, &c)| if c == 0 { f64::NAN } else { s / c as f64 })
        .collect()
}

/// Reads score blocks for sample lists
#[derive(Debug, Clone, Default)]
pub struct ScoreReader {
    policy: FramePolicy,
    remove_cols: Vec<usize>,
}

impl ScoreReader {
    pub fn new(policy: FramePolicy) -> Self {
        Self {
            policy,
            remove_cols: Vec::new(),
        }
    }

    /// Drop these column indices from the concatenated output
    pub fn with_removed_columns(mut self, remove_cols: Vec<usize>) -> Self {
        self.remove_cols = remove_cols;
        self
    }

    /// Read scores of `samples` from every directory, columns in directory order
    ///
    /// Directory widths are fixed by the first sample; every later record must agree,
    /// and all directories must report the same frame count for a given sample.
    pub fn read(&self, samples: &[Sample], dirs: &[PathBuf]) -> Result<ScoreBlock> {
        let mut widths: Option<Vec<usize>> = None;
        let mut data = Vec::new();
        let mut rows_per_sample = Vec::with_capacity(samples.len());

        for sample in samples {
            let records = dirs
                .iter()
                .map(|dir| load_record(sample, dir))
                .collect::<Result<Vec<_>>>()?;

            let frames = records.first().map_or(0, |r| r.frames);
            if let Some((dir, record)) = dirs.iter().zip(&records).find(|(_, r)| r.frames != frames) {
                return Err(Error::ShapeMismatch(format!(
                    "sample '{}' has {} frames in {} but {} in {}",
                    sample.path,
                    record.frames,
                    dir.display(),
                    frames,
                    dirs[0].display()
                )));
            }

            let sample_widths: Vec<usize> = records.iter().map(|r| r.width).collect();
            match &widths {
                None => widths = Some(sample_widths),
                Some(expected) if *expected != sample_widths => {
                    return Err(Error::ShapeMismatch(format!(
                        "sample '{}' has record widths {:?}, expected {:?}",
                        sample.path, sample_widths, expected
                    )));
                }
                Some(_) => {}
            }

            match self.policy {
                FramePolicy::PerFrame => {
                    for f in 0..frames {
                        for record in &records {
                            data.extend_from_slice(record.frame(f));
                        }
                    }
                    rows_per_sample.push(frames);
                }
                FramePolicy::Mean => {
                    let width = records.iter().map(|r| r.width).sum();
                    data.extend(frame_mean(&records, width, frames));
                    rows_per_sample.push(1);
                }
            }
        }

        let n_cols = widths.map_or(dirs.len(), |w| w.iter().sum());
        let matrix = ScoreMatrix::from_flat(data, n_cols)?;
        let matrix = if self.remove_cols.is_empty() {
            matrix
        } else {
            matrix.drop_columns(&self.remove_cols)
        };
        debug!(
            "Read {} rows x {} columns for {} samples from {} directories",
            matrix.n_rows(),
            matrix.n_cols(),
            samples.len(),
            dirs.len()
        );
        Ok(ScoreBlock {
            matrix,
            rows_per_sample,
        })
    }
}
