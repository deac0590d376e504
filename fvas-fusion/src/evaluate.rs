//! Error rates, thresholds and EPSC data
//!
//! A score at or above the threshold is accepted. FAR counts accepted impostors,
//! SFAR accepted presentation attacks, FRR rejected genuine accesses. The rate of
//! an empty class is 0.

use crate::fusion::AndRule;
use crate::matrix::{rows_with_label, Label, ScoreMatrix, ATTACK, GENUINE, IMPOSTOR};
use fvas_common::{Error, Result};
use serde::Serialize;
use std::fmt;

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// (FAR, FRR) of a single score list pair at `threshold`
pub fn far_frr(negatives: &[f64], positives: &[f64], threshold: f64) -> (f64, f64) {
    let accepted = negatives.iter().filter(|&&s| s >= threshold).count();
    let rejected = positives.iter().filter(|&&s| s < threshold).count();
    (
        rate(accepted, negatives.len()),
        rate(rejected, positives.len()),
    )
}

/// Threshold where FAR and FRR are closest, searched over the pooled scores
pub fn eer_threshold(negatives: &[f64], positives: &[f64]) -> Result<f64> {
    if negatives.is_empty() || positives.is_empty() {
        return Err(Error::InsufficientTrainingData(format!(
            "EER threshold needs negative and positive scores, got {} and {}",
            negatives.len(),
            positives.len()
        )));
    }
    let mut neg: Vec<f64> = negatives.iter().copied().filter(|s| !s.is_nan()).collect();
    let mut pos: Vec<f64> = positives.iter().copied().filter(|s| !s.is_nan()).collect();
    neg.sort_by(f64::total_cmp);
    pos.sort_by(f64::total_cmp);

    let mut candidates: Vec<f64> = neg.iter().chain(&pos).copied().collect();
    candidates.sort_by(f64::total_cmp);
    candidates.dedup();

    let mut best = (f64::INFINITY, candidates.first().copied().unwrap_or(0.0));
    for &t in &candidates {
        let far = rate(neg.len() - neg.partition_point(|&s| s < t), neg.len());
        let frr = rate(pos.partition_point(|&s| s < t), pos.len());
        let gap = (far - frr).abs();
        if gap < best.0 {
            best = (gap, t);
        }
    }
    Ok(best.1)
}

/// Threshold where the weighted FAR, `(1 - omega) FAR + omega SFAR`, is closest to FRR
pub fn weighted_eer_threshold(
    impostors: &[f64],
    attacks: &[f64],
    genuine: &[f64],
    omega: f64,
) -> Result<f64> {
    if genuine.is_empty() || (impostors.is_empty() && attacks.is_empty()) {
        return Err(Error::InsufficientTrainingData(format!(
            "weighted EER threshold needs genuine and negative scores, got {} genuine, {} impostor, {} attack",
            genuine.len(),
            impostors.len(),
            attacks.len()
        )));
    }
    fn sorted(scores: &[f64]) -> Vec<f64> {
        let mut v: Vec<f64> = scores.iter().copied().filter(|s| !s.is_nan()).collect();
        v.sort_by(f64::total_cmp);
        v
    }
    fn accepted(v: &[f64], t: f64) -> f64 {
        rate(v.len() - v.partition_point(|&s| s < t), v.len())
    }
    let (imp, att, pos) = (sorted(impostors), sorted(attacks), sorted(genuine));

    let mut candidates: Vec<f64> = imp.iter().chain(&att).chain(&pos).copied().collect();
    candidates.sort_by(f64::total_cmp);
    candidates.dedup();

    let mut best = (f64::INFINITY, candidates.first().copied().unwrap_or(0.0));
    for &t in &candidates {
        let far_w = (1.0 - omega) * accepted(&imp, t) + omega * accepted(&att, t);
        let frr = rate(pos.partition_point(|&s| s < t), pos.len());
        let gap = (far_w - frr).abs();
        if gap < best.0 {
            best = (gap, t);
        }
    }
    Ok(best.1)
}

/// FAR, FRR and SFAR of one operating point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorRates {
    pub far: f64,
    pub frr: f64,
    pub sfar: f64,
}

impl ErrorRates {
    pub fn hter(&self) -> f64 {
        (self.far + self.frr) / 2.0
    }
}

impl fmt::Display for ErrorRates {
    /// Percentages with three decimals
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FAR={:.3}, FRR={:.3}, HTER={:.3}, SFAR={:.3}",
            self.far * 100.0,
            self.frr * 100.0,
            self.hter() * 100.0,
            self.sfar * 100.0
        )
    }
}

/// Rows of a ternary-labelled matrix grouped by class
#[derive(Debug, Clone)]
pub struct TernaryScores {
    pub genuine: ScoreMatrix,
    pub impostor: ScoreMatrix,
    pub attack: ScoreMatrix,
}

impl TernaryScores {
    pub fn split(matrix: &ScoreMatrix, labels: &[Label]) -> Result<Self> {
        if matrix.n_rows() != labels.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} rows but {} labels",
                matrix.n_rows(),
                labels.len()
            )));
        }
        Ok(Self {
            genuine: rows_with_label(matrix, labels, GENUINE),
            impostor: rows_with_label(matrix, labels, IMPOSTOR),
            attack: rows_with_label(matrix, labels, ATTACK),
        })
    }

    /// Error rates of the system in `column` at `threshold`
    pub fn system_errors(&self, column: usize, threshold: f64) -> ErrorRates {
        let genuine = self.genuine.column(column);
        let (far, frr) = far_frr(&self.impostor.column(column), &genuine, threshold);
        let (sfar, _) = far_frr(&self.attack.column(column), &genuine, threshold);
        ErrorRates { far, frr, sfar }
    }
}

/// Exact AND decision counts over the three classes
pub fn and_decision_errors(rule: &AndRule, scores: &TernaryScores) -> ErrorRates {
    let accepted = |m: &ScoreMatrix| m.rows().filter(|r| rule.accepts(r)).count();
    ErrorRates {
        far: rate(accepted(&scores.impostor), scores.impostor.n_rows()),
        frr: rate(
            scores.genuine.n_rows() - accepted(&scores.genuine),
            scores.genuine.n_rows(),
        ),
        sfar: rate(accepted(&scores.attack), scores.attack.n_rows()),
    }
}

/// Expected Performance and Spoofability Curve data
#[derive(Debug, Clone, Serialize)]
pub struct Epsc {
    pub omega: Vec<f64>,
    pub far_w: Vec<f64>,
    pub hter_w: Vec<f64>,
    pub sfar: Vec<f64>,
    /// AND thresholds chosen at each omega, one per column
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<Vec<f64>>,
    /// Area under the HTER_w curve
    pub aue: f64,
}

impl Epsc {
    fn from_rates(omega: Vec<f64>, rates: &[ErrorRates], thresholds: Vec<Vec<f64>>) -> Self {
        let far_w: Vec<f64> = omega
            .iter()
            .zip(rates)
            .map(|(w, r)| (1.0 - w) * r.far + w * r.sfar)
            .collect();
        let hter_w: Vec<f64> = far_w
            .iter()
            .zip(rates)
            .map(|(f, r)| (f + r.frr) / 2.0)
            .collect();
        let aue = omega
            .windows(2)
            .zip(hter_w.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
            .sum();
        Self {
            omega,
            far_w,
            hter_w,
            sfar: rates.iter().map(|r| r.sfar).collect(),
            thresholds,
            aue,
        }
    }
}

fn omega_steps(points: usize) -> Result<Vec<f64>> {
    if points == 0 {
        return Err(Error::InvalidInput("EPSC needs at least one step".to_string()));
    }
    let step = 1.0 / points as f64;
    Ok((0..=points).map(|i| i as f64 * step).collect())
}

/// Sweep omega over `points + 1` values in [0, 1] at fixed thresholds
///
/// FAR_w = (1 - omega) FAR + omega SFAR and HTER_w = (FAR_w + FRR) / 2.
pub fn epsc(rates: &ErrorRates, points: usize) -> Result<Epsc> {
    let omega = omega_steps(points)?;
    let fixed = vec![*rates; omega.len()];
    Ok(Epsc::from_rates(omega, &fixed, Vec::new()))
}

/// EPSC with thresholds re-chosen at every omega
///
/// At each omega every column gets the weighted EER threshold of its own scores on
/// `devel`; the AND of those thresholds is then evaluated on `test`.
pub fn epsc_per_omega(devel: &TernaryScores, test: &TernaryScores, points: usize) -> Result<Epsc> {
    let omega = omega_steps(points)?;
    let n_cols = devel.genuine.n_cols();
    if test.genuine.n_cols() != n_cols {
        return Err(Error::ShapeMismatch(format!(
            "devel has {} columns, test has {}",
            n_cols,
            test.genuine.n_cols()
        )));
    }

    let columns: Vec<[Vec<f64>; 3]> = (0..n_cols)
        .map(|j| {
            [
                devel.impostor.column(j),
                devel.attack.column(j),
                devel.genuine.column(j),
            ]
        })
        .collect();

    let mut rates = Vec::with_capacity(omega.len());
    let mut thresholds = Vec::with_capacity(omega.len());
    for &w in &omega {
        let chosen = columns
            .iter()
            .map(|[imp, att, pos]| weighted_eer_threshold(imp, att, pos, w))
            .collect::<Result<Vec<f64>>>()?;
        let rule = AndRule::new(chosen.clone(), n_cols)?;
        rates.push(and_decision_errors(&rule, test));
        thresholds.push(chosen);
    }
    Ok(Epsc::from_rates(omega, &rates, thresholds))
}
