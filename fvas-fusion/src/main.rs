//! fvas-fusion - score-level fusion of face verification and anti-spoofing scores
//!
//! Trains a fusion rule on the training split (both protocols), applies it to the
//! devel and test splits of the selected protocol (`licit`, `spoof` or `both`) and
//! writes the fused scores as `<out>/<protocol>/scores/scores-{dev,eval}`.
//!
//! **Usage:**
//! ```bash
//! fvas-fusion --manifest replay.toml -s scores/fv -a scores/as -f LLR -p spoof -o out
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use fvas_common::dataset::{ProtocolSelection, Split};
use fvas_fusion::aggregator::{Aggregator, GatherOptions, QualitySource, ScoreSources};
use fvas_fusion::cli::CommonArgs;
use fvas_fusion::fusion::{self, FusionAlgorithm, TrainedFusion};
use fvas_fusion::normalize::NormParams;
use fvas_fusion::output::{fusion_model_path, norm_params_path, save_fused_scores, scores_dir};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fvas-fusion")]
#[command(about = "Fuse face verification and anti-spoofing scores")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Face verification score directories
    #[arg(short = 's', long = "fv-dirs", num_args = 1.., value_name = "DIR")]
    fv_dirs: Vec<PathBuf>,

    /// Anti-spoofing score directories
    #[arg(short = 'a', long = "as-dirs", num_args = 1.., value_name = "DIR")]
    as_dirs: Vec<PathBuf>,

    /// Quality feature directories, appended after the anti-spoofing columns
    #[arg(short = 'q', long = "quality-dirs", num_args = 1.., value_name = "DIR")]
    quality_dirs: Vec<PathBuf>,

    /// Quality feature columns to discard (0-based)
    #[arg(short = 'r', long = "remove-cols", num_args = 1.., value_name = "COL")]
    remove_cols: Vec<usize>,

    /// Fusion algorithm
    #[arg(short = 'f', long, value_enum, default_value = "LLR")]
    algorithm: FusionAlgorithm,

    /// Face verification protocol of the fused output: licit, spoof or both
    #[arg(short = 'p', long, default_value = "licit")]
    protocol: ProtocolSelection,

    /// Output directory
    #[arg(short = 'o', long = "output-dir", env = "FVAS_OUTPUT_DIR", default_value = "fusion")]
    output_dir: PathBuf,

    /// Save normalization parameters and the fitted model next to the scores
    #[arg(long)]
    save_params: bool,

    /// Reuse normalization parameters and model saved in DIR instead of training
    #[arg(long, value_name = "DIR")]
    load_params: Option<PathBuf>,
}

/// Model and normalization applied to one split
struct Fitted {
    params: NormParams,
    model: TrainedFusion,
}

fn load_fitted(dir: &Path, split: Split) -> Result<Fitted> {
    let params_path = norm_params_path(dir, split);
    let model_path = fusion_model_path(dir, split);
    let params = NormParams::load(&params_path)
        .with_context(|| format!("Failed to load {}", params_path.display()))?;
    let model = TrainedFusion::load(&model_path)
        .with_context(|| format!("Failed to load {}", model_path.display()))?;
    info!(
        "Loaded {} model trained at {} from {}",
        model.algorithm,
        model.trained_at,
        model_path.display()
    );
    Ok(Fitted { params, model })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.common.init("fvas-fusion")?;

    if !args.algorithm.is_trained() {
        bail!("AND is a decision-level rule; use the and-decision tool");
    }
    if args.fv_dirs.is_empty() && args.as_dirs.is_empty() {
        bail!("at least one face verification (-s) or anti-spoofing (-a) directory is required");
    }
    if !args.remove_cols.is_empty() && args.quality_dirs.is_empty() {
        warn!("--remove-cols given without quality directories, ignoring");
    }

    let database = args.common.database(&config)?;
    let quality = QualitySource {
        dirs: args.quality_dirs.clone(),
        remove_cols: args.remove_cols.clone(),
    };
    let sources =
        ScoreSources::new(args.fv_dirs.clone(), args.as_dirs.clone()).with_quality(Some(quality));

    // a loaded model decides whether its inputs were augmented
    let preloaded = match &args.load_params {
        Some(dir) => Some(load_fitted(dir, Split::Devel)?),
        None => None,
    };
    let algorithm = preloaded
        .as_ref()
        .map(|f| f.model.algorithm)
        .unwrap_or(args.algorithm);
    if algorithm != args.algorithm {
        warn!(
            "Requested {} but the saved model is {}; using the saved model",
            args.algorithm, algorithm
        );
    }

    let options = GatherOptions {
        polynomial: algorithm.polynomial_features(),
        ..GatherOptions::from_config(&config)
    };

    let trained = match preloaded {
        Some(fitted) => fitted,
        None => {
            let training = Aggregator::new(&database, &sources, options.clone())
                .gather_training()
                .context("Failed to gather training scores")?;
            let params = training
                .norm_params
                .clone()
                .context("training gather returned no normalization parameters")?;
            let model = fusion::train(
                algorithm,
                &training.positives(),
                &training.negatives(),
                &config,
            )
            .with_context(|| format!("Failed to train {} fusion", algorithm))?;
            Fitted { params, model }
        }
    };

    for protocol in args.protocol.protocols() {
        let evaluation = GatherOptions {
            protocol: ProtocolSelection::from(protocol),
            ..options.clone()
        };
        let aggregator = Aggregator::new(&database, &sources, evaluation);
        let params_dir = scores_dir(&args.output_dir, protocol);

        for split in [Split::Devel, Split::Test] {
            let fitted = match (&args.load_params, split) {
                (Some(dir), Split::Test) => load_fitted(dir, split)?,
                _ => Fitted {
                    params: trained.params.clone(),
                    model: trained.model.clone(),
                },
            };

            let gathered = aggregator
                .gather(split, Some(&fitted.params))
                .with_context(|| format!("Failed to gather {} {} scores", protocol, split))?;
            let fused = fitted.model.apply(&gathered.matrix).with_context(|| {
                format!("Failed to apply {} fusion to {} set", algorithm, split)
            })?;
            save_fused_scores(&args.output_dir, protocol, split, &fused, &gathered.labels)?;

            if args.save_params {
                let params_path = norm_params_path(&params_dir, split);
                fitted.params.save(&params_path)?;
                let model_path = fusion_model_path(&params_dir, split);
                fitted.model.save(&model_path)?;
                info!(
                    "Saved parameters to {} and {}",
                    params_path.display(),
                    model_path.display()
                );
            }
        }
    }

    info!("Fusion complete: {}", args.output_dir.display());
    Ok(())
}
