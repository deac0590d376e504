//! Score aggregation
//!
//! Joins face verification, anti-spoofing and quality scores of one dataset split
//! into a single matrix with a parallel label vector. Column order is always
//! face verification, then anti-spoofing, then quality, each in directory order.
//!
//! Face verification scores are stored per protocol: `<fv>/licit/client%03d/` holds
//! the scores of one identity model, `<fv>/spoof/` the identity-agnostic ones.
//! Anti-spoofing and quality directories are flat.

use crate::augment::augment;
use crate::labels;
use crate::matrix::{drop_nan_rows, rows_with_label, Label, ScoreMatrix, GENUINE};
use crate::normalize::NormParams;
use crate::score_store::{ScoreBlock, ScoreReader};
use fvas_common::config::{DegeneratePolicy, FramePolicy, FusionConfig, NormMethod};
use fvas_common::dataset::{Database, Protocol, ProtocolSelection, Sample, Split};
use fvas_common::{Error, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// Quality feature directories and the feature columns to discard
#[derive(Debug, Clone, Default)]
pub struct QualitySource {
    pub dirs: Vec<PathBuf>,
    pub remove_cols: Vec<usize>,
}

/// Score directories feeding one aggregation
#[derive(Debug, Clone, Default)]
pub struct ScoreSources {
    pub fv_dirs: Vec<PathBuf>,
    pub as_dirs: Vec<PathBuf>,
    pub quality: Option<QualitySource>,
}

impl ScoreSources {
    pub fn new(fv_dirs: Vec<PathBuf>, as_dirs: Vec<PathBuf>) -> Self {
        Self {
            fv_dirs,
            as_dirs,
            quality: None,
        }
    }

    pub fn with_quality(mut self, quality: Option<QualitySource>) -> Self {
        self.quality = quality.filter(|q| !q.dirs.is_empty());
        self
    }

    fn is_empty(&self) -> bool {
        self.fv_dirs.is_empty() && self.as_dirs.is_empty() && self.quality.is_none()
    }
}

/// Aggregation settings, passed explicitly through every call
#[derive(Debug, Clone)]
pub struct GatherOptions {
    pub protocol: ProtocolSelection,
    /// Binary labels {0, 1} instead of ternary {-1, 0, 1}
    pub binary: bool,
    pub normalize: bool,
    pub method: NormMethod,
    /// Append pairwise products before normalization
    pub polynomial: bool,
    pub frame_policy: FramePolicy,
    pub degenerate: DegeneratePolicy,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            protocol: ProtocolSelection::Both,
            binary: true,
            normalize: true,
            method: NormMethod::ZNorm,
            polynomial: false,
            frame_policy: FramePolicy::PerFrame,
            degenerate: DegeneratePolicy::Substitute,
        }
    }
}

impl GatherOptions {
    /// Defaults with frame and normalization settings taken from configuration
    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            method: config.normalization.method,
            frame_policy: config.frames.policy,
            degenerate: config.normalization.degenerate,
            ..Self::default()
        }
    }
}

/// Result of one aggregation
#[derive(Debug, Clone)]
pub struct GatheredScores {
    pub matrix: ScoreMatrix,
    pub labels: Vec<Label>,
    /// Parameters fitted by a training gather, or the ones applied
    pub norm_params: Option<NormParams>,
}

impl GatheredScores {
    /// Rows labelled genuine
    pub fn positives(&self) -> ScoreMatrix {
        rows_with_label(&self.matrix, &self.labels, GENUINE)
    }

    /// Every row not labelled genuine
    pub fn negatives(&self) -> ScoreMatrix {
        let indices: Vec<usize> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l != GENUINE)
            .map(|(i, _)| i)
            .collect();
        self.matrix.select_rows(&indices)
    }
}

/// Gathers aligned score matrices from a database and score directories
pub struct Aggregator<'a, D: Database> {
    database: &'a D,
    sources: &'a ScoreSources,
    options: GatherOptions,
}

impl<'a, D: Database> Aggregator<'a, D> {
    pub fn new(database: &'a D, sources: &'a ScoreSources, options: GatherOptions) -> Self {
        Self {
            database,
            sources,
            options,
        }
    }

    pub fn options(&self) -> &GatherOptions {
        &self.options
    }

    /// Training split, normalized with statistics fitted on itself
    pub fn gather_training(&self) -> Result<GatheredScores> {
        let (matrix, labels) = self.gather_raw(Split::Train)?;
        if !self.options.normalize {
            return Ok(GatheredScores {
                matrix,
                labels,
                norm_params: None,
            });
        }
        let params = NormParams::fit(&matrix, self.options.degenerate)?;
        let matrix = params.apply(&matrix, self.options.method)?;
        Ok(GatheredScores {
            matrix,
            labels,
            norm_params: Some(params),
        })
    }

    /// Any split, normalized with previously fitted parameters
    ///
    /// Requesting normalization without parameters is a configuration error,
    /// reported before any score is read.
    pub fn gather(&self, split: Split, params: Option<&NormParams>) -> Result<GatheredScores> {
        if self.options.normalize && params.is_none() {
            return Err(Error::Config(format!(
                "normalization of the {} split requested without normalization parameters",
                split
            )));
        }
        let (matrix, labels) = self.gather_raw(split)?;
        let (matrix, norm_params) = match params.filter(|_| self.options.normalize) {
            Some(params) => (params.apply(&matrix, self.options.method)?, Some(params.clone())),
            None => (matrix, None),
        };
        Ok(GatheredScores {
            matrix,
            labels,
            norm_params,
        })
    }

    /// Read, label, drop NaN rows and optionally augment; no normalization
    pub fn gather_raw(&self, split: Split) -> Result<(ScoreMatrix, Vec<Label>)> {
        if self.sources.is_empty() {
            return Err(Error::Config("no score directories given".to_string()));
        }
        let samples = self.database.split_samples(split)?;
        let reader = ScoreReader::new(self.options.frame_policy);

        let mut acc = Accumulator::default();
        let genuine_side = self.side_block(&reader, &samples.genuine)?;

        if self.options.protocol.includes(Protocol::Licit) {
            info!("Processing face verification scores: licit protocol, {} set", split);
            let clients = samples.genuine_clients();
            for (i, client) in clients.iter().enumerate() {
                info!("Processing [{}/{}] {} in {} set", i + 1, clients.len(), client, split);
                let dirs: Vec<PathBuf> = self
                    .sources
                    .fv_dirs
                    .iter()
                    .map(|d| d.join(Protocol::Licit.dir_name()).join(client.to_string()))
                    .collect();
                let fv = self.fv_block(&reader, &samples.genuine, &dirs)?;
                let block = combine(fv, genuine_side.as_ref())?;
                let labels = labels::assign(&samples.genuine, Protocol::Licit, Some(*client), self.options.binary)?;
                acc.push(block, &labels)?;
            }
        }

        if self.options.protocol.includes(Protocol::Spoof) {
            info!("Processing face verification scores: spoof protocol, {} set", split);
            let dirs: Vec<PathBuf> = self
                .sources
                .fv_dirs
                .iter()
                .map(|d| d.join(Protocol::Spoof.dir_name()))
                .collect();

            let fv = self.fv_block(&reader, &samples.genuine, &dirs)?;
            let block = combine(fv, genuine_side.as_ref())?;
            acc.push(block, &labels::spoof_labels(&samples.genuine, self.options.binary))?;

            let attack_side = self.side_block(&reader, &samples.attack)?;
            let fv = self.fv_block(&reader, &samples.attack, &dirs)?;
            let block = combine(fv, attack_side.as_ref())?;
            acc.push(block, &labels::spoof_labels(&samples.attack, self.options.binary))?;
        }

        let (mut matrix, mut labels) = acc.finish(split)?;
        let dropped = drop_nan_rows(&mut matrix, &mut labels)?;
        if dropped > 0 {
            debug!("Dropped {} rows with NaN scores from {} set", dropped, split);
        }

        if self.options.polynomial {
            matrix = augment(&matrix);
        }

        info!(
            "Gathered {} rows x {} columns from {} set",
            matrix.n_rows(),
            matrix.n_cols(),
            split
        );
        Ok((matrix, labels))
    }

    fn fv_block(&self, reader: &ScoreReader, samples: &[Sample], dirs: &[PathBuf]) -> Result<Option<ScoreBlock>> {
        if dirs.is_empty() {
            return Ok(None);
        }
        reader.read(samples, dirs).map(Some)
    }

    /// Anti-spoofing columns followed by quality columns for `samples`
    fn side_block(&self, reader: &ScoreReader, samples: &[Sample]) -> Result<Option<ScoreBlock>> {
        let anti = if self.sources.as_dirs.is_empty() {
            None
        } else {
            Some(reader.read(samples, &self.sources.as_dirs)?)
        };
        let quality = match &self.sources.quality {
            Some(q) => Some(
                reader
                    .clone()
                    .with_removed_columns(q.remove_cols.clone())
                    .read(samples, &q.dirs)?,
            ),
            None => None,
        };
        match (anti, quality) {
            (Some(a), Some(q)) => combine(Some(a), Some(&q)).map(Some),
            (a, q) => Ok(a.or(q)),
        }
    }
}

/// Join two blocks of the same samples column-wise, left first
fn combine(left: Option<ScoreBlock>, right: Option<&ScoreBlock>) -> Result<ScoreBlock> {
    match (left, right) {
        (Some(left), Some(right)) => {
            if left.rows_per_sample != right.rows_per_sample {
                return Err(Error::ShapeMismatch(
                    "score directories disagree on per-sample frame counts".to_string(),
                ));
            }
            Ok(ScoreBlock {
                matrix: ScoreMatrix::hstack(&[&left.matrix, &right.matrix])?,
                rows_per_sample: left.rows_per_sample,
            })
        }
        (Some(left), None) => Ok(left),
        (None, Some(right)) => Ok(right.clone()),
        (None, None) => Err(Error::Config("no score directories given".to_string())),
    }
}

/// Row blocks and their expanded labels, stacked in arrival order
#[derive(Default)]
struct Accumulator {
    matrix: Option<ScoreMatrix>,
    labels: Vec<Label>,
}

impl Accumulator {
    fn push(&mut self, block: ScoreBlock, sample_labels: &[Label]) -> Result<()> {
        let labels = labels::expand(sample_labels, &block.rows_per_sample)?;
        if block.matrix.n_rows() == 0 {
            return Ok(());
        }
        match &mut self.matrix {
            Some(matrix) => matrix.vstack(&block.matrix)?,
            None => self.matrix = Some(block.matrix),
        }
        self.labels.extend(labels);
        Ok(())
    }

    fn finish(self, split: Split) -> Result<(ScoreMatrix, Vec<Label>)> {
        match self.matrix {
            Some(matrix) => Ok((matrix, self.labels)),
            None => Err(Error::InvalidInput(format!("no scores found for {} set", split))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvas_common::dataset::{ClientId, ManifestDatabase, SampleClass};
    use serde_json::json;
    use std::path::Path;

    fn sample(path: &str, client: u32, class: SampleClass) -> Sample {
        Sample {
            path: path.to_string(),
            client_id: ClientId(client),
            class,
            split: Split::Train,
            frames: None,
        }
    }

    fn write(dir: &Path, path: &str, value: serde_json::Value) {
        let file = dir.join(format!("{}.json", path));
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, value.to_string()).unwrap();
    }

    /// Two genuine samples (clients 1, 2) and one attack on client 1
    fn fixture(root: &Path) -> (ManifestDatabase, ScoreSources) {
        let db = ManifestDatabase::from_samples(vec![
            sample("real/c1", 1, SampleClass::Genuine),
            sample("real/c2", 2, SampleClass::Genuine),
            sample("attack/c1", 1, SampleClass::Attack),
        ])
        .unwrap();

        let fv = root.join("fv");
        let anti = root.join("as");
        // licit: model of client N scores every genuine sample
        write(&fv.join("licit/client001"), "real/c1", json!([0.9]));
        write(&fv.join("licit/client001"), "real/c2", json!([0.1]));
        write(&fv.join("licit/client002"), "real/c1", json!([0.2]));
        write(&fv.join("licit/client002"), "real/c2", json!([0.8]));
        write(&fv.join("spoof"), "real/c1", json!([0.7]));
        write(&fv.join("spoof"), "real/c2", json!([0.6]));
        write(&fv.join("spoof"), "attack/c1", json!([0.5]));
        write(&anti, "real/c1", json!([3.0]));
        write(&anti, "real/c2", json!([2.0]));
        write(&anti, "attack/c1", json!([-1.0]));

        (db, ScoreSources::new(vec![fv], vec![anti]))
    }

    fn raw_options(protocol: ProtocolSelection, binary: bool) -> GatherOptions {
        GatherOptions {
            protocol,
            binary,
            normalize: false,
            ..GatherOptions::default()
        }
    }

    #[test]
    fn test_licit_rows_per_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, sources) = fixture(tmp.path());
        let agg = Aggregator::new(&db, &sources, raw_options(ProtocolSelection::Licit, true));
        let (m, labels) = agg.gather_raw(Split::Train).unwrap();

        assert_eq!(m.n_cols(), 2);
        assert_eq!(labels, vec![1, 0, 0, 1]);
        assert_eq!(m.column(0), vec![0.9, 0.1, 0.2, 0.8]);
        assert_eq!(m.column(1), vec![3.0, 2.0, 3.0, 2.0]);
    }

    #[test]
    fn test_both_protocols_licit_then_spoof() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, sources) = fixture(tmp.path());
        let agg = Aggregator::new(&db, &sources, raw_options(ProtocolSelection::Both, false));
        let (m, labels) = agg.gather_raw(Split::Train).unwrap();

        assert_eq!(m.n_rows(), labels.len());
        assert_eq!(labels, vec![1, 0, 0, 1, 1, 1, -1]);
        assert_eq!(m.row(6), &[0.5, -1.0]);
    }

    #[test]
    fn test_nan_rows_dropped_with_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, sources) = fixture(tmp.path());
        write(&tmp.path().join("as"), "real/c2", json!([null]));
        let agg = Aggregator::new(&db, &sources, raw_options(ProtocolSelection::Spoof, true));
        let (m, labels) = agg.gather_raw(Split::Train).unwrap();

        assert_eq!(labels, vec![1, 0]);
        assert!(!m.has_nan());
        assert_eq!(m.column(0), vec![0.7, 0.5]);
    }

    #[test]
    fn test_training_gather_fits_own_normalization() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, sources) = fixture(tmp.path());
        let options = GatherOptions {
            protocol: ProtocolSelection::Spoof,
            ..GatherOptions::default()
        };
        let agg = Aggregator::new(&db, &sources, options);
        let gathered = agg.gather_training().unwrap();

        let params = gathered.norm_params.as_ref().unwrap();
        assert_eq!(params.n_cols(), 2);
        let mean: f64 = gathered.matrix.column(1).iter().sum::<f64>() / 3.0;
        assert!(mean.abs() < 1e-12);
        assert_eq!(gathered.positives().n_rows(), 2);
        assert_eq!(gathered.negatives().n_rows(), 1);
    }

    fn column_mean(m: &ScoreMatrix, j: usize) -> f64 {
        let col = m.column(j);
        col.iter().sum::<f64>() / col.len() as f64
    }

    #[test]
    fn test_devel_normalized_with_training_statistics() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, sources) = fixture(tmp.path());
        let devel = |path: &str, client: u32, class: SampleClass| Sample {
            split: Split::Devel,
            ..sample(path, client, class)
        };
        let db = ManifestDatabase::from_samples(vec![
            sample("real/c1", 1, SampleClass::Genuine),
            sample("real/c2", 2, SampleClass::Genuine),
            sample("attack/c1", 1, SampleClass::Attack),
            devel("devel/real/c1", 1, SampleClass::Genuine),
            devel("devel/real/c2", 2, SampleClass::Genuine),
            devel("devel/attack/c1", 1, SampleClass::Attack),
        ])
        .unwrap();

        // devel scores sit far above the training range
        let fv = tmp.path().join("fv/spoof");
        let anti = tmp.path().join("as");
        for (path, fv_score, as_score) in [
            ("devel/real/c1", 10.7, 13.0),
            ("devel/real/c2", 10.6, 12.0),
            ("devel/attack/c1", 10.5, 9.0),
        ] {
            write(&fv, path, json!([fv_score]));
            write(&anti, path, json!([as_score]));
        }

        let options = GatherOptions {
            protocol: ProtocolSelection::Spoof,
            ..GatherOptions::default()
        };
        let agg = Aggregator::new(&db, &sources, options);
        let params = agg.gather_training().unwrap().norm_params.unwrap();
        let (raw, _) = agg.gather_raw(Split::Devel).unwrap();
        let gathered = agg.gather(Split::Devel, Some(&params)).unwrap();

        assert_eq!(gathered.matrix, params.z_norm(&raw).unwrap());
        assert_eq!(gathered.norm_params.as_ref(), Some(&params));
        for j in 0..gathered.matrix.n_cols() {
            let mean = column_mean(&gathered.matrix, j);
            assert!(mean > 3.0, "column {} mean {} looks refitted", j, mean);
        }
    }

    #[test]
    fn test_min_max_method_scales_training_to_unit_range() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, sources) = fixture(tmp.path());
        let options = GatherOptions {
            protocol: ProtocolSelection::Spoof,
            method: NormMethod::MinMax,
            ..GatherOptions::default()
        };
        let gathered = Aggregator::new(&db, &sources, options).gather_training().unwrap();

        assert!(gathered.norm_params.is_some());
        assert_eq!(gathered.matrix.column(1), vec![1.0, 0.75, 0.0]);
        let fv = gathered.matrix.column(0);
        assert!((fv[0] - 1.0).abs() < 1e-12);
        assert!((fv[1] - 0.5).abs() < 1e-12);
        assert_eq!(fv[2], 0.0);
    }

    #[test]
    fn test_columns_follow_directory_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, sources) = fixture(tmp.path());
        let fv2 = tmp.path().join("fv2");
        let as2 = tmp.path().join("as2");
        write(&fv2.join("licit/client001"), "real/c1", json!([1.9]));
        write(&fv2.join("licit/client001"), "real/c2", json!([1.1]));
        write(&fv2.join("licit/client002"), "real/c1", json!([1.2]));
        write(&fv2.join("licit/client002"), "real/c2", json!([1.8]));
        write(&fv2.join("spoof"), "real/c1", json!([1.7]));
        write(&fv2.join("spoof"), "real/c2", json!([1.6]));
        write(&fv2.join("spoof"), "attack/c1", json!([1.5]));
        write(&as2, "real/c1", json!([30.0]));
        write(&as2, "real/c2", json!([20.0]));
        write(&as2, "attack/c1", json!([-10.0]));

        let mut fv_dirs = sources.fv_dirs.clone();
        fv_dirs.push(fv2);
        let mut as_dirs = sources.as_dirs.clone();
        as_dirs.push(as2);
        let sources = ScoreSources::new(fv_dirs, as_dirs);

        let agg = Aggregator::new(&db, &sources, raw_options(ProtocolSelection::Both, false));
        let (m, labels) = agg.gather_raw(Split::Train).unwrap();

        assert_eq!(m.n_cols(), 4);
        assert_eq!(labels, vec![1, 0, 0, 1, 1, 1, -1]);
        // licit: model client002 scoring real/c1
        assert_eq!(m.row(2), &[0.2, 1.2, 3.0, 30.0]);
        assert_eq!(m.row(5), &[0.6, 1.6, 2.0, 20.0]);
        assert_eq!(m.row(6), &[0.5, 1.5, -1.0, -10.0]);
    }

    #[test]
    fn test_normalize_without_params_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, sources) = fixture(tmp.path());
        let agg = Aggregator::new(&db, &sources, GatherOptions::default());
        assert!(matches!(
            agg.gather(Split::Train, None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_polynomial_augmentation_before_normalization() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, sources) = fixture(tmp.path());
        let options = GatherOptions {
            protocol: ProtocolSelection::Spoof,
            polynomial: true,
            ..GatherOptions::default()
        };
        let gathered = Aggregator::new(&db, &sources, options).gather_training().unwrap();
        assert_eq!(gathered.matrix.n_cols(), 5);
        assert_eq!(gathered.norm_params.unwrap().n_cols(), 5);
    }

    #[test]
    fn test_quality_columns_after_anti_spoofing() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, sources) = fixture(tmp.path());
        let quality = tmp.path().join("iqa");
        write(&quality, "real/c1", json!([[1.0, 2.0, 3.0]]));
        write(&quality, "real/c2", json!([[4.0, 5.0, 6.0]]));
        write(&quality, "attack/c1", json!([[7.0, 8.0, 9.0]]));
        let sources = sources.with_quality(Some(QualitySource {
            dirs: vec![quality],
            remove_cols: vec![1],
        }));

        let agg = Aggregator::new(&db, &sources, raw_options(ProtocolSelection::Spoof, true));
        let (m, _) = agg.gather_raw(Split::Train).unwrap();
        assert_eq!(m.n_cols(), 4);
        assert_eq!(m.row(2), &[0.5, -1.0, 7.0, 9.0]);
    }
}
