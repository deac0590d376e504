//! AND decision fusion report
//!
//! A sample is accepted only when every face verification and anti-spoofing score
//! reaches its threshold. Prints FAR, FRR, HTER and SFAR of the fused decision for
//! the devel and test sets, and optionally writes the test-set EPSC data as JSON.
//!
//! With `--per-omega-thresholds` the EPSC thresholds are not fixed: at every omega
//! each system gets the weighted EER threshold of its devel scores, and the AND of
//! those thresholds is evaluated on the test set.
//!
//! **Usage:**
//! ```bash
//! and-decision --manifest replay.toml -s scores/fv -a scores/as --fv-threshold 0.41 --as-threshold 1.7
//! and-decision --manifest replay.toml -s scores/fv -a scores/as --per-omega-thresholds --epsc epsc.json
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use fvas_common::dataset::{ProtocolSelection, Split};
use fvas_fusion::aggregator::{Aggregator, GatherOptions, ScoreSources};
use fvas_fusion::cli::CommonArgs;
use fvas_fusion::evaluate::{and_decision_errors, epsc, epsc_per_omega, Epsc, TernaryScores};
use fvas_fusion::fusion::AndRule;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "and-decision")]
#[command(about = "Error rates of AND decision fusion of face verification and anti-spoofing")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Face verification score directories
    #[arg(short = 's', long = "fv-dirs", num_args = 1.., required = true, value_name = "DIR")]
    fv_dirs: Vec<PathBuf>,

    /// Anti-spoofing score directories
    #[arg(short = 'a', long = "as-dirs", num_args = 1.., required = true, value_name = "DIR")]
    as_dirs: Vec<PathBuf>,

    /// One threshold per face verification directory
    #[arg(
        long = "fv-threshold",
        num_args = 1..,
        required_unless_present = "per_omega_thresholds",
        allow_negative_numbers = true
    )]
    fv_thresholds: Vec<f64>,

    /// One threshold per anti-spoofing directory
    #[arg(
        long = "as-threshold",
        num_args = 1..,
        required_unless_present = "per_omega_thresholds",
        allow_negative_numbers = true
    )]
    as_thresholds: Vec<f64>,

    /// Choose new devel EER thresholds at every omega of the EPSC
    #[arg(long, conflicts_with_all = ["fv_thresholds", "as_thresholds"])]
    per_omega_thresholds: bool,

    /// Write the test-set EPSC data to FILE (JSON)
    #[arg(long, value_name = "FILE")]
    epsc: Option<PathBuf>,

    /// Number of omega steps of the EPSC
    #[arg(long, default_value = "100")]
    points: usize,
}

fn write_epsc(path: &Path, curve: &Epsc) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(curve)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote EPSC data (AUE {:.4}) to {}", curve.aue, path.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.common.init("and-decision")?;

    if !args.per_omega_thresholds
        && (args.fv_thresholds.len() != args.fv_dirs.len()
            || args.as_thresholds.len() != args.as_dirs.len())
    {
        bail!("Thresholds must be specified for all the input score sets");
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

    let mut scores = Vec::with_capacity(2);
    for split in [Split::Devel, Split::Test] {
        let gathered = aggregator
            .gather(split, None)
            .with_context(|| format!("Failed to gather {} scores", split))?;
        let split_scores = TernaryScores::split(&gathered.matrix, &gathered.labels)?;
        info!(
            "{} set: {} genuine, {} impostor, {} attack rows",
            split,
            split_scores.genuine.n_rows(),
            split_scores.impostor.n_rows(),
            split_scores.attack.n_rows()
        );
        scores.push(split_scores);
    }
    let (devel, test) = (&scores[0], &scores[1]);

    if args.per_omega_thresholds {
        let curve = epsc_per_omega(devel, test, args.points)?;
        println!("AND fused system, EER thresholds per omega:");
        println!("AUE = {:.4}", curve.aue);
        if let Some(path) = &args.epsc {
            write_epsc(path, &curve)?;
        }
        return Ok(());
    }

    let thresholds: Vec<f64> = args
        .fv_thresholds
        .iter()
        .chain(&args.as_thresholds)
        .copied()
        .collect();
    let rule = AndRule::new(thresholds, args.fv_dirs.len() + args.as_dirs.len())?;
    let devel_rates = and_decision_errors(&rule, devel);
    let test_rates = and_decision_errors(&rule, test);

    println!(
        "FV threshold: {:?}, AS threshold: {:?}",
        args.fv_thresholds, args.as_thresholds
    );
    println!("----------------------------------------------------------");
    println!("AND fused system results:");
    println!("Devel: {}", devel_rates);
    println!("Test: {}", test_rates);

    if let Some(path) = &args.epsc {
        write_epsc(path, &epsc(&test_rates, args.points)?)?;
    }
    Ok(())
}
