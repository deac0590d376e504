// Fusion strategies
//
// One variant per rule: AND (decision level), SUM, LLR, LLR_P, SVM, GMM (score level).
// The algorithm is chosen once; training yields a FusionModel that maps every
// score row to one fused scalar, higher meaning more genuine-like.

pub mod and;
pub mod gmm;
pub mod logistic;
pub mod sum;
pub mod svm;

pub use and::AndRule;
pub use gmm::GmmFusion;
pub use logistic::LogisticFusion;
pub use sum::SumRule;
pub use svm::LinearSvm;

use crate::matrix::ScoreMatrix;
use chrono::{DateTime, Utc};
use fvas_common::config::FusionConfig;
use fvas_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Score fusion capability shared by every trained rule
pub trait ScoreFuser {
    /// Number of input columns the fuser expects
    fn n_inputs(&self) -> usize;

    /// Fused score of one row
    fn fuse_row(&self, row: &[f64]) -> f64;

    /// Fused score per row of `matrix`
    fn apply(&self, matrix: &ScoreMatrix) -> Result<Vec<f64>> {
        if matrix.n_cols() != self.n_inputs() {
            return Err(Error::ShapeMismatch(format!(
                "fuser expects {} columns, matrix has {}",
                self.n_inputs(),
                matrix.n_cols()
            )));
        }
        Ok(matrix.rows().map(|row| self.fuse_row(row)).collect())
    }
}

/// Fusion rule selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum FusionAlgorithm {
    #[serde(rename = "AND")]
    #[value(name = "AND")]
    And,
    #[serde(rename = "SUM")]
    #[value(name = "SUM")]
    Sum,
    #[serde(rename = "LLR")]
    #[value(name = "LLR")]
    Llr,
    #[serde(rename = "LLR_P")]
    #[value(name = "LLR_P")]
    LlrPolynomial,
    #[serde(rename = "SVM")]
    #[value(name = "SVM")]
    Svm,
    #[serde(rename = "GMM")]
    #[value(name = "GMM")]
    Gmm,
}

impl FusionAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            FusionAlgorithm::And => "AND",
            FusionAlgorithm::Sum => "SUM",
            FusionAlgorithm::Llr => "LLR",
            FusionAlgorithm::LlrPolynomial => "LLR_P",
            FusionAlgorithm::Svm => "SVM",
            FusionAlgorithm::Gmm => "GMM",
        }
    }

    /// Whether scores are polynomially augmented before normalization
    pub fn polynomial_features(self) -> bool {
        self == FusionAlgorithm::LlrPolynomial
    }

    /// Whether the rule is learned from training scores
    pub fn is_trained(self) -> bool {
        self != FusionAlgorithm::And
    }
}

impl fmt::Display for FusionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FusionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(FusionAlgorithm::And),
            "SUM" => Ok(FusionAlgorithm::Sum),
            "LLR" => Ok(FusionAlgorithm::Llr),
            "LLR_P" => Ok(FusionAlgorithm::LlrPolynomial),
            "SVM" => Ok(FusionAlgorithm::Svm),
            "GMM" => Ok(FusionAlgorithm::Gmm),
            _ => Err(Error::Parse(format!("unknown fusion algorithm '{}'", s))),
        }
    }
}

/// Fitted state of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusionModel {
    And(AndRule),
    Sum(SumRule),
    Logistic(LogisticFusion),
    Svm(LinearSvm),
    Gmm(GmmFusion),
}

impl FusionModel {
    fn fuser(&self) -> &dyn ScoreFuser {
        match self {
            FusionModel::And(m) => m,
            FusionModel::Sum(m) => m,
            FusionModel::Logistic(m) => m,
            FusionModel::Svm(m) => m,
            FusionModel::Gmm(m) => m,
        }
    }
}

impl ScoreFuser for FusionModel {
    fn n_inputs(&self) -> usize {
        self.fuser().n_inputs()
    }

    fn fuse_row(&self, row: &[f64]) -> f64 {
        self.fuser().fuse_row(row)
    }
}

/// A fitted model with its provenance, as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedFusion {
    pub algorithm: FusionAlgorithm,
    pub n_inputs: usize,
    pub trained_at: DateTime<Utc>,
    pub positives: usize,
    pub negatives: usize,
    pub model: FusionModel,
}

impl TrainedFusion {
    pub fn apply(&self, matrix: &ScoreMatrix) -> Result<Vec<f64>> {
        self.model.apply(matrix)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read fusion model {}: {}", path.display(), e))
        })?;
        let trained: Self = serde_json::from_str(&content)?;
        if trained.model.n_inputs() != trained.n_inputs {
            return Err(Error::ShapeMismatch(format!(
                "model file declares {} inputs, model has {}",
                trained.n_inputs,
                trained.model.n_inputs()
            )));
        }
        Ok(trained)
    }
}

fn not_trained(algorithm: FusionAlgorithm) -> Error {
    Error::Config(format!(
        "{} fusion takes external thresholds and is not trained",
        algorithm
    ))
}

/// Train `algorithm` on genuine (`positives`) and negative rows
///
/// AND thresholds come from elsewhere and are never trained here.
pub fn train(
    algorithm: FusionAlgorithm,
    positives: &ScoreMatrix,
    negatives: &ScoreMatrix,
    config: &FusionConfig,
) -> Result<TrainedFusion> {
    if !algorithm.is_trained() {
        return Err(not_trained(algorithm));
    }
    if positives.n_rows() == 0 || negatives.n_rows() == 0 {
        return Err(Error::InsufficientTrainingData(format!(
            "{} needs genuine and negative rows, got {} and {}",
            algorithm,
            positives.n_rows(),
            negatives.n_rows()
        )));
    }
    if positives.n_cols() != negatives.n_cols() {
        return Err(Error::ShapeMismatch(format!(
            "genuine rows have {} columns, negative rows {}",
            positives.n_cols(),
            negatives.n_cols()
        )));
    }

    info!(
        "Training {} fusion on {} genuine and {} negative rows ({} columns)",
        algorithm,
        positives.n_rows(),
        negatives.n_rows(),
        positives.n_cols()
    );

    let model = match algorithm {
        FusionAlgorithm::Sum => FusionModel::Sum(SumRule::new(positives.n_cols())),
        FusionAlgorithm::Llr | FusionAlgorithm::LlrPolynomial => {
            FusionModel::Logistic(LogisticFusion::train(positives, negatives, &config.llr)?)
        }
        FusionAlgorithm::Svm => {
            FusionModel::Svm(LinearSvm::train(positives, negatives, &config.svm)?)
        }
        FusionAlgorithm::Gmm => {
            FusionModel::Gmm(GmmFusion::train(positives, negatives, &config.gmm)?)
        }
        FusionAlgorithm::And => return Err(not_trained(algorithm)),
    };

    Ok(TrainedFusion {
        algorithm,
        n_inputs: positives.n_cols(),
        trained_at: Utc::now(),
        positives: positives.n_rows(),
        negatives: negatives.n_rows(),
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[[f64; 2]]) -> ScoreMatrix {
        ScoreMatrix::from_rows(&data.iter().map(|r| r.to_vec()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("LLR_P".parse::<FusionAlgorithm>().unwrap(), FusionAlgorithm::LlrPolynomial);
        assert_eq!("gmm".parse::<FusionAlgorithm>().unwrap(), FusionAlgorithm::Gmm);
        assert!("MAX".parse::<FusionAlgorithm>().is_err());
        assert_eq!(FusionAlgorithm::LlrPolynomial.to_string(), "LLR_P");
        assert!(FusionAlgorithm::LlrPolynomial.polynomial_features());
        assert!(!FusionAlgorithm::Llr.polynomial_features());
    }

    #[test]
    fn test_empty_class_is_insufficient() {
        let pos = rows(&[[1.0, 1.0]]);
        let empty = ScoreMatrix::empty(2);
        let config = FusionConfig::default();
        for algorithm in [
            FusionAlgorithm::Sum,
            FusionAlgorithm::Llr,
            FusionAlgorithm::LlrPolynomial,
            FusionAlgorithm::Svm,
            FusionAlgorithm::Gmm,
        ] {
            assert!(matches!(
                train(algorithm, &pos, &empty, &config),
                Err(Error::InsufficientTrainingData(_))
            ));
            assert!(matches!(
                train(algorithm, &empty, &pos, &config),
                Err(Error::InsufficientTrainingData(_))
            ));
        }
    }

    #[test]
    fn test_and_is_not_trained() {
        let pos = rows(&[[1.0, 1.0]]);
        assert!(matches!(
            train(FusionAlgorithm::And, &pos, &pos, &FusionConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_model_file_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fusionmodel-dev.json");
        let pos = rows(&[[2.0, 1.5], [1.5, 2.5], [2.5, 2.0]]);
        let neg = rows(&[[-2.0, -1.0], [-1.0, -2.5], [-1.5, -1.5]]);
        let trained = train(FusionAlgorithm::Sum, &pos, &neg, &FusionConfig::default()).unwrap();
        trained.save(&path).unwrap();

        let loaded = TrainedFusion::load(&path).unwrap();
        assert_eq!(loaded.algorithm, FusionAlgorithm::Sum);
        assert_eq!(loaded.model, trained.model);
        assert_eq!(loaded.apply(&pos).unwrap(), vec![3.5, 4.0, 4.5]);
    }

    #[test]
    fn test_apply_checks_width() {
        let model = FusionModel::Sum(SumRule::new(2));
        let narrow = ScoreMatrix::from_rows(&[vec![1.0]]).unwrap();
        assert!(matches!(model.apply(&narrow), Err(Error::ShapeMismatch(_))));
    }
}
