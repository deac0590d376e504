//! fvas-fusion library interface
//!
//! Score-level and decision-level fusion of face verification (FV) and
//! anti-spoofing (AS) scores:
//! - reading per-sample score records and aligning them into matrices
//! - z-normalization with statistics from the training split
//! - fusion rules (AND, SUM, LLR, LLR_P, SVM, GMM)
//! - error rates, EER thresholds and EPSC data
//! - 4-column score output and layout converters

pub mod aggregator;
pub mod and_decision;
pub mod augment;
pub mod cli;
pub mod convert;
pub mod evaluate;
pub mod fusion;
pub mod labels;
pub mod matrix;
pub mod normalize;
pub mod output;
pub mod score_store;

pub use aggregator::{Aggregator, GatherOptions, GatheredScores, QualitySource, ScoreSources};
pub use fusion::{FusionAlgorithm, FusionModel, ScoreFuser, TrainedFusion};
pub use matrix::{Label, ScoreMatrix};
pub use normalize::NormParams;
