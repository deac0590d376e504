//! Output layout for fused scores and saved parameters
//!
//! `<out>/<protocol>/scores/scores-{dev,eval}` holds the fused scores in 4-column
//! format; `normparams-<alias>.json` and `fusionmodel-<alias>.json` sit next to them.

use crate::matrix::{Label, GENUINE};
use fvas_common::dataset::{Protocol, Split};
use fvas_common::four_column::write_scores;
use fvas_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory holding the scores (and saved parameters) of one protocol
pub fn scores_dir(out_dir: &Path, protocol: Protocol) -> PathBuf {
    out_dir.join(protocol.dir_name()).join("scores")
}

pub fn fused_scores_path(out_dir: &Path, protocol: Protocol, split: Split) -> PathBuf {
    scores_dir(out_dir, protocol).join(format!("scores-{}", split.alias()))
}

pub fn norm_params_path(dir: &Path, split: Split) -> PathBuf {
    dir.join(format!("normparams-{}.json", split.alias()))
}

pub fn fusion_model_path(dir: &Path, split: Split) -> PathBuf {
    dir.join(format!("fusionmodel-{}.json", split.alias()))
}

/// Write fused scores; label 1 is positive, anything else negative, NaN skipped
pub fn save_fused_scores(
    out_dir: &Path,
    protocol: Protocol,
    split: Split,
    scores: &[f64],
    labels: &[Label],
) -> Result<usize> {
    if scores.len() != labels.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} fused scores but {} labels",
            scores.len(),
            labels.len()
        )));
    }
    let path = fused_scores_path(out_dir, protocol, split);
    let written = write_scores(
        &path,
        scores.iter().zip(labels).map(|(&s, &l)| (s, l == GENUINE)),
    )?;
    info!("Saved {} fused scores to {}", written, path.display());
    Ok(written)
}
