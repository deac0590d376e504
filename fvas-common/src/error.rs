//! Common error types for FVAS

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for FVAS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the aggregation, normalization and fusion stages
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error for score records, parameters and models
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error for configuration and dataset manifests
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Misconfiguration detected before any heavy computation
    #[error("Configuration error: {0}")]
    Config(String),

    /// A sample has no score record in one of the score directories
    #[error("Missing score file: {}", .0.display())]
    MissingScoreFile(PathBuf),

    /// Score blocks disagree on row or column counts
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Fusion training called with an empty positive or negative set
    #[error("Insufficient training data: {0}")]
    InsufficientTrainingData(String),

    /// Zero standard deviation in a normalization column
    #[error("Degenerate column {column}: zero variance in reference data")]
    DegenerateColumn { column: usize },

    /// Invalid argument or value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed text input (4-column files, manifests)
    #[error("Parse error: {0}")]
    Parse(String),
}
