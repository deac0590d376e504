//! Configuration loading and logging bootstrap
//!
//! Configuration file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `FVAS_CONFIG` environment variable
//! 3. User config file (`<config dir>/fvas/config.toml`)
//! 4. Built-in defaults (fallback)
//!
//! Every section is optional. A file named explicitly (CLI or environment) must exist
//! and parse; the implicit user config file is skipped silently when absent.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a configuration file
pub const CONFIG_ENV_VAR: &str = "FVAS_CONFIG";

/// Complete tool configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FusionConfig {
    /// Dataset manifest path (overridden by `--manifest`)
    pub manifest: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub normalization: NormalizationSettings,
    pub frames: FrameSettings,
    pub llr: LlrSettings,
    pub svm: SvmSettings,
    pub gmm: GmmSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Handling of zero-variance columns during normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegeneratePolicy {
    /// Replace std (and min-max range) by 1.0 and log a warning
    #[default]
    Substitute,
    /// Abort with `Error::DegenerateColumn`
    Fail,
}

/// Column scaling applied with statistics fitted on the training split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormMethod {
    /// `(x - mean) / std`
    #[default]
    ZNorm,
    /// `(x - min) / (max - min)`
    MinMax,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NormalizationSettings {
    pub method: NormMethod,
    pub degenerate: DegeneratePolicy,
}

/// How per-frame score records become matrix rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramePolicy {
    /// Every frame is one row
    #[default]
    PerFrame,
    /// One row per sample holding the NaN-aware mean over frames
    Mean,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub policy: FramePolicy,
}

/// Linear logistic regression trainer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlrSettings {
    /// Prior probability of the positive class used to weight the two classes
    pub prior: f64,
    /// L2 penalty on the weights (bias excluded)
    pub regularization: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for LlrSettings {
    fn default() -> Self {
        Self {
            prior: 0.5,
            regularization: 0.0,
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

/// Linear SVM trainer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SvmSettings {
    /// Pegasos regularization constant
    pub lambda: f64,
    pub epochs: usize,
    pub seed: u64,
}

impl Default for SvmSettings {
    fn default() -> Self {
        Self {
            lambda: 1e-4,
            epochs: 50,
            seed: 42,
        }
    }
}

/// Gaussian mixture trainer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GmmSettings {
    pub components: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Lower bound applied to every diagonal variance
    pub variance_floor: f64,
    pub seed: u64,
}

impl Default for GmmSettings {
    fn default() -> Self {
        Self {
            components: 3,
            max_iterations: 200,
            tolerance: 1e-6,
            variance_floor: 1e-6,
            seed: 42,
        }
    }
}

/// Resolve which configuration file to read, if any
///
/// Returns `Ok(None)` when nothing was requested and no user config file exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(Some(path.to_path_buf()));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(Some(PathBuf::from(path)));
        }
    }

    // Priority 3: User config file
    if let Some(path) = dirs::config_dir().map(|d| d.join("fvas").join("config.toml")) {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

impl FusionConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration following the resolution priority order
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg)? {
            Some(path) => {
                let config = Self::from_file(&path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => {
                debug!("No configuration file, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Dataset manifest path: CLI override first, then configuration
    pub fn manifest_path(&self, cli_arg: Option<&Path>) -> Result<PathBuf> {
        cli_arg
            .map(Path::to_path_buf)
            .or_else(|| self.manifest.clone())
            .ok_or_else(|| {
                Error::Config(
                    "No dataset manifest configured. Use --manifest <file> or set \
                     `manifest = \"...\"` in the configuration file"
                        .to_string(),
                )
            })
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the configured level is used, raised to
/// `debug` by `verbose`.
pub fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let fallback = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone()
    };

    // try_init: a second call (tests, chained tools) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = FusionConfig::from_toml_str("").unwrap();
        assert!(config.manifest.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.normalization.method, NormMethod::ZNorm);
        assert_eq!(config.normalization.degenerate, DegeneratePolicy::Substitute);
        assert_eq!(config.frames.policy, FramePolicy::PerFrame);
        assert_eq!(config.llr.prior, 0.5);
        assert_eq!(config.gmm.components, 3);
    }

    #[test]
    fn test_partial_sections() {
        let config = FusionConfig::from_toml_str(
            r#"
            manifest = "/data/replay.toml"

            [normalization]
            method = "min-max"
            degenerate = "fail"

            [frames]
            policy = "mean"

            [gmm]
            components = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.manifest, Some(PathBuf::from("/data/replay.toml")));
        assert_eq!(config.normalization.method, NormMethod::MinMax);
        assert_eq!(config.normalization.degenerate, DegeneratePolicy::Fail);
        assert_eq!(config.frames.policy, FramePolicy::Mean);
        assert_eq!(config.gmm.components, 5);
        // untouched fields keep defaults
        assert_eq!(config.gmm.max_iterations, 200);
        assert_eq!(config.svm.seed, 42);
    }

    #[test]
    fn test_unknown_normalization_method_rejected() {
        let result = FusionConfig::from_toml_str("[normalization]\nmethod = \"tanh\"\n");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        assert!(FusionConfig::from_toml_str("manifets = \"x\"").is_err());
    }

    #[test]
    fn test_manifest_path_cli_overrides_config() {
        let config = FusionConfig {
            manifest: Some(PathBuf::from("from-config.toml")),
            ..Default::default()
        };
        let cli = PathBuf::from("from-cli.toml");
        assert_eq!(config.manifest_path(Some(&cli)).unwrap(), cli);
        assert_eq!(
            config.manifest_path(None).unwrap(),
            PathBuf::from("from-config.toml")
        );
    }

    #[test]
    fn test_manifest_path_missing_is_config_error() {
        let config = FusionConfig::default();
        assert!(matches!(config.manifest_path(None), Err(Error::Config(_))));
    }
}
