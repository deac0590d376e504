//! Convert a 4-column score file back to per-sample score records
//!
//! The third field of every line must be `<frame>/<path key>` with 1-based frames.
//!
//! **Usage:**
//! ```bash
//! four-column-to-dirs --manifest replay.toml scores-dev -p licit --split devel -o scores/fv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use fvas_common::dataset::{Protocol, Split};
use fvas_common::four_column::read_lines;
use fvas_fusion::cli::CommonArgs;
use fvas_fusion::convert::ScoreTree;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "four-column-to-dirs")]
#[command(about = "Split a 4-column score file into per-sample score records")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// 4-column score file
    input: PathBuf,

    /// Protocol the file was scored with
    #[arg(short = 'p', long)]
    protocol: Protocol,

    /// Dataset split the file covers
    #[arg(long)]
    split: Split,

    /// Output score directory (the protocol subdirectory is added)
    #[arg(short = 'o', long = "output-dir", env = "FVAS_OUTPUT_DIR")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.common.init("four-column-to-dirs")?;
    let database = args.common.database(&config)?;

    let lines = read_lines(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    info!("Read {} lines from {}", lines.len(), args.input.display());

    let tree = ScoreTree::from_lines(&database, &lines, args.protocol, args.split)?;
    let written = tree.write(&args.output_dir, args.protocol)?;
    info!(
        "{} records for {} models written under {}",
        written,
        tree.n_models(),
        args.output_dir.display()
    );
    Ok(())
}
