//! AND decision fusion exported as 4-column face verification scores
//!
//! Rows rejected by the anti-spoofing system get a face verification score one
//! below the smallest devel score, so any threshold on the face verification
//! scores also rejects them. How the devel set itself is written is a policy
//! choice; the test set is always written with the substitution.

use crate::evaluate::TernaryScores;
use crate::matrix::ScoreMatrix;
use fvas_common::four_column::write_scores;
use fvas_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Face verification column of a (FV, AS) matrix
pub const FV_COLUMN: usize = 0;
/// Anti-spoofing column of a (FV, AS) matrix
pub const AS_COLUMN: usize = 1;

/// How devel rows failing the anti-spoofing threshold are written
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DevOutputPolicy {
    /// Leave them out
    Omit,
    /// Replace their face verification score by the devel minimum minus one
    Substitute,
    /// Write their face verification score unchanged
    #[default]
    PassThrough,
}

/// Face verification scores per class, ready to be written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassScores {
    pub genuine: Vec<f64>,
    pub impostor: Vec<f64>,
    pub attack: Vec<f64>,
}

fn check_width(scores: &TernaryScores) -> Result<()> {
    if scores.genuine.n_cols() != 2 {
        return Err(Error::Config(format!(
            "AND export needs exactly one face verification and one anti-spoofing column, got {} columns",
            scores.genuine.n_cols()
        )));
    }
    Ok(())
}

/// Smallest face verification score of the devel set, minus one
pub fn rejection_score(devel: &TernaryScores) -> Result<f64> {
    check_width(devel)?;
    [&devel.genuine, &devel.impostor, &devel.attack]
        .iter()
        .flat_map(|m| m.column(FV_COLUMN))
        .min_by(f64::total_cmp)
        .map(|min| min - 1.0)
        .ok_or_else(|| Error::InvalidInput("devel set has no scores".to_string()))
}

/// Apply the anti-spoofing gate to every class
pub fn gate(
    scores: &TernaryScores,
    as_threshold: f64,
    rejected: f64,
    policy: DevOutputPolicy,
) -> Result<ClassScores> {
    check_width(scores)?;
    let gate_class = |m: &ScoreMatrix| -> Vec<f64> {
        m.rows()
            .filter_map(|row| {
                let passes = row[AS_COLUMN] >= as_threshold;
                match (passes, policy) {
                    (true, _) | (false, DevOutputPolicy::PassThrough) => Some(row[FV_COLUMN]),
                    (false, DevOutputPolicy::Substitute) => Some(rejected),
                    (false, DevOutputPolicy::Omit) => None,
                }
            })
            .collect()
    };
    Ok(ClassScores {
        genuine: gate_class(&scores.genuine),
        impostor: gate_class(&scores.impostor),
        attack: gate_class(&scores.attack),
    })
}

/// Gate devel with `policy` and test with substitution
pub fn export_scores(
    devel: &TernaryScores,
    test: &TernaryScores,
    as_threshold: f64,
    policy: DevOutputPolicy,
) -> Result<(ClassScores, ClassScores)> {
    let rejected = rejection_score(devel)?;
    info!(
        "AND export: anti-spoofing threshold {:.6}, rejected rows scored {:.6}, devel policy {:?}",
        as_threshold, rejected, policy
    );
    let dev = gate(devel, as_threshold, rejected, policy)?;
    let eval = gate(test, as_threshold, rejected, DevOutputPolicy::Substitute)?;
    Ok((dev, eval))
}

/// Write `10_licit/scores-{dev,eval}` and `10_spoof/scores-{dev,eval}` under `out_dir`
///
/// Licit files hold genuine and impostor lines, spoof files genuine and attack lines.
pub fn write_export(out_dir: &Path, dev: &ClassScores, eval: &ClassScores) -> Result<()> {
    for (alias, scores) in [("dev", dev), ("eval", eval)] {
        let genuine = scores.genuine.iter().map(|&s| (s, true));
        let licit = genuine
            .clone()
            .chain(scores.impostor.iter().map(|&s| (s, false)));
        let spoof = genuine.chain(scores.attack.iter().map(|&s| (s, false)));

        let file = format!("scores-{}", alias);
        let n = write_scores(&out_dir.join("10_licit").join(&file), licit)?;
        info!("Wrote {} lines to 10_licit/{}", n, file);
        let n = write_scores(&out_dir.join("10_spoof").join(&file), spoof)?;
        info!("Wrote {} lines to 10_spoof/{}", n, file);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvas_common::four_column::{read_lines, split_scores};

    fn scores(rows: &[[f64; 2]], labels: &[i8]) -> TernaryScores {
        let m = ScoreMatrix::from_rows(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>())
            .unwrap();
        TernaryScores::split(&m, labels).unwrap()
    }

    fn devel() -> TernaryScores {
        scores(
            &[[2.0, 0.9], [1.5, 0.1], [-1.0, 0.8], [0.5, 0.2], [1.8, 0.05]],
            &[1, 1, 0, 0, -1],
        )
    }

    #[test]
    fn test_rejection_score_is_devel_min_minus_one() {
        assert_eq!(rejection_score(&devel()).unwrap(), -2.0);
    }

    #[test]
    fn test_dev_policies() {
        let d = devel();
        let omit = gate(&d, 0.3, -2.0, DevOutputPolicy::Omit).unwrap();
        assert_eq!(omit.genuine, vec![2.0]);
        assert_eq!(omit.impostor, vec![-1.0]);
        assert!(omit.attack.is_empty());

        let sub = gate(&d, 0.3, -2.0, DevOutputPolicy::Substitute).unwrap();
        assert_eq!(sub.genuine, vec![2.0, -2.0]);
        assert_eq!(sub.impostor, vec![-1.0, -2.0]);
        assert_eq!(sub.attack, vec![-2.0]);

        let pass = gate(&d, 0.3, -2.0, DevOutputPolicy::PassThrough).unwrap();
        assert_eq!(pass.genuine, vec![2.0, 1.5]);
        assert_eq!(pass.attack, vec![1.8]);
    }

    #[test]
    fn test_test_set_always_substituted() {
        let test = scores(&[[3.0, 0.9], [2.5, 0.0]], &[1, -1]);
        let (dev, eval) =
            export_scores(&devel(), &test, 0.3, DevOutputPolicy::PassThrough).unwrap();
        assert_eq!(dev.attack, vec![1.8]);
        assert_eq!(eval.genuine, vec![3.0]);
        assert_eq!(eval.attack, vec![-2.0]);
    }

    #[test]
    fn test_requires_two_columns() {
        let m = ScoreMatrix::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        let wide = TernaryScores::split(&m, &[1]).unwrap();
        assert!(matches!(rejection_score(&wide), Err(Error::Config(_))));
    }

    #[test]
    fn test_write_export_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let dev = ClassScores {
            genuine: vec![1.0],
            impostor: vec![-1.0, -0.5],
            attack: vec![0.25],
        };
        write_export(tmp.path(), &dev, &dev).unwrap();

        let licit = read_lines(&tmp.path().join("10_licit/scores-dev")).unwrap();
        let (neg, pos) = split_scores(&licit);
        assert_eq!(pos, vec![1.0]);
        assert_eq!(neg, vec![-1.0, -0.5]);

        let spoof = read_lines(&tmp.path().join("10_spoof/scores-eval")).unwrap();
        let (neg, pos) = split_scores(&spoof);
        assert_eq!(pos, vec![1.0]);
        assert_eq!(neg, vec![0.25]);
    }
}
