//! Convert a flat score directory to 4-column files
//!
//! **Usage:**
//! ```bash
//! dir-to-four-column --manifest replay.toml scores/as -o out
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use fvas_fusion::cli::CommonArgs;
use fvas_fusion::convert::dir_to_four_column;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dir-to-four-column")]
#[command(about = "Write a score directory as licit and spoof 4-column files")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Score directory holding `<path>.json` records
    scores_dir: PathBuf,

    /// Output directory
    #[arg(short = 'o', long = "output-dir", env = "FVAS_OUTPUT_DIR", default_value = "tmp")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.common.init("dir-to-four-column")?;
    let database = args.common.database(&config)?;

    dir_to_four_column(
        &database,
        &args.scores_dir,
        &args.output_dir,
        config.frames.policy,
    )
    .with_context(|| format!("Failed to convert {}", args.scores_dir.display()))?;
    info!("4-column files written under {}", args.output_dir.display());
    Ok(())
}
