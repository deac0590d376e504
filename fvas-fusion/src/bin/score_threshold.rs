//! EER threshold of a single face verification or anti-spoofing system
//!
//! The threshold is taken at the devel-set EER; error rates are reported for the
//! devel and test sets at that threshold.
//!
//! **Usage:**
//! ```bash
//! score-threshold --manifest replay.toml --system fv scores/fv
//! score-threshold --manifest replay.toml --system as scores/as
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fvas_common::dataset::{ProtocolSelection, Split};
use fvas_fusion::aggregator::{Aggregator, GatherOptions, ScoreSources};
use fvas_fusion::cli::CommonArgs;
use fvas_fusion::evaluate::{eer_threshold, far_frr, TernaryScores};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum System {
    /// Face verification: EER between impostors and genuine accesses
    Fv,
    /// Anti-spoofing: EER between attacks and genuine accesses
    As,
}

#[derive(Parser, Debug)]
#[command(name = "score-threshold")]
#[command(about = "EER threshold and error rates of one scoring system")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Which kind of system the directory holds
    #[arg(long, value_enum)]
    system: System,

    /// Score directory (face verification: without the protocol subdirectory)
    scores_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.common.init("score-threshold")?;
    let database = args.common.database(&config)?;

    let (sources, protocol) = match args.system {
        System::Fv => (
            ScoreSources::new(vec![args.scores_dir.clone()], Vec::new()),
            ProtocolSelection::Both,
        ),
        System::As => (
            ScoreSources::new(Vec::new(), vec![args.scores_dir.clone()]),
            ProtocolSelection::Spoof,
        ),
    };
    let options = GatherOptions {
        protocol,
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

    match args.system {
        System::Fv => {
            let threshold =
                eer_threshold(&devel.impostor.column(0), &devel.genuine.column(0))?;
            println!("FV threshold: {:.6}", threshold);
            println!("FV system results:");
            println!("Devel: {}", devel.system_errors(0, threshold));
            println!("Test: {}", test.system_errors(0, threshold));
        }
        System::As => {
            let threshold = eer_threshold(&devel.attack.column(0), &devel.genuine.column(0))?;
            println!("AS system results:");
            println!("AS threshold: {:.6}", threshold);
            for (name, scores) in [("Devel", &devel), ("Test", &test)] {
                let (far, frr) =
                    far_frr(&scores.attack.column(0), &scores.genuine.column(0), threshold);
                println!(
                    "{}: FAR={:.3}, FRR={:.3}, HTER={:.3}",
                    name,
                    far * 100.0,
                    frr * 100.0,
                    (far + frr) * 50.0
                );
            }
        }
    }
    println!("----------------------------------------------------------");
    Ok(())
}
