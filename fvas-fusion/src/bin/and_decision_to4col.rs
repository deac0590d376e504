//! AND decision fusion written as 4-column face verification scores
//!
//! **Usage:**
//! ```bash
//! and-decision-to4col --manifest replay.toml -s scores/fv -a scores/as --as-threshold 1.7 -o out
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use fvas_common::dataset::{ProtocolSelection, Split};
use fvas_fusion::aggregator::{Aggregator, GatherOptions, ScoreSources};
use fvas_fusion::and_decision::{export_scores, write_export, DevOutputPolicy};
use fvas_fusion::cli::CommonArgs;
use fvas_fusion::evaluate::TernaryScores;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "and-decision-to4col")]
#[command(about = "Export AND decision fusion as 4-column score files")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Face verification score directory
    #[arg(short = 's', long = "fv-dirs", num_args = 1.., required = true, value_name = "DIR")]
    fv_dirs: Vec<PathBuf>,

    /// Anti-spoofing score directory
    #[arg(short = 'a', long = "as-dirs", num_args = 1.., required = true, value_name = "DIR")]
    as_dirs: Vec<PathBuf>,

    /// Anti-spoofing threshold
    #[arg(long = "as-threshold", num_args = 1.., required = true, allow_negative_numbers = true)]
    as_thresholds: Vec<f64>,

    /// How devel rows failing the anti-spoofing threshold are written
    #[arg(long, value_enum, default_value_t = DevOutputPolicy::PassThrough)]
    dev_policy: DevOutputPolicy,

    /// Output directory
    #[arg(short = 'o', long = "output-dir", env = "FVAS_OUTPUT_DIR", default_value = "tmp")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.common.init("and-decision-to4col")?;

    if args.as_thresholds.len() != args.as_dirs.len() {
        bail!("Thresholds must be specified for all the input score sets");
    }
    if args.fv_dirs.len() != 1 || args.as_dirs.len() != 1 {
        bail!("AND export fuses exactly one face verification and one anti-spoofing system");
    }

    let database = args.common.database(&config)?;
    let sources = ScoreSources::new(args.fv_dirs.clone(), args.as_dirs.clone());
    let options = GatherOptions {
        protocol: ProtocolSelection::Both,
        binary: false,
        normalize: false,
        ..GatherOptions::from_config(&config)
    };
    let aggregator = Aggregator::new(&database, &sources, options);

    let ternary = |split: Split| -> Result<TernaryScores> {
        let gathered = aggregator
            .gather(split, None)
            .with_context(|| format!("Failed to gather {} scores", split))?;
        Ok(TernaryScores::split(&gathered.matrix, &gathered.labels)?)
    };
    let devel = ternary(Split::Devel)?;
    let test = ternary(Split::Test)?;

    let (dev, eval) = export_scores(&devel, &test, args.as_thresholds[0], args.dev_policy)?;
    write_export(&args.output_dir, &dev, &eval)
        .with_context(|| format!("Failed to write scores under {}", args.output_dir.display()))?;
    info!("AND export written to {}", args.output_dir.display());
    Ok(())
}
