//! Arguments and bootstrap shared by every binary

use anyhow::{Context, Result};
use clap::Args;
use fvas_common::config::{init_logging, FusionConfig};
use fvas_common::dataset::ManifestDatabase;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Dataset manifest (TOML list of samples)
    #[arg(long, env = "FVAS_MANIFEST", value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Configuration file (falls back to FVAS_CONFIG, then the user config dir)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Load configuration and start logging
    pub fn init(&self, tool: &str) -> Result<FusionConfig> {
        let config = FusionConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;
        init_logging(&config.logging, self.verbose);
        info!("Starting {} v{}", tool, env!("CARGO_PKG_VERSION"));
        Ok(config)
    }

    /// Open the dataset manifest named on the command line or in `config`
    pub fn database(&self, config: &FusionConfig) -> Result<ManifestDatabase> {
        let path = config.manifest_path(self.manifest.as_deref())?;
        ManifestDatabase::load(&path)
            .with_context(|| format!("Failed to load dataset manifest {}", path.display()))
    }
}
