//! Converters between score directory trees and 4-column files

use crate::aggregator::{Aggregator, GatherOptions, ScoreSources};
use crate::output::save_fused_scores;
use fvas_common::config::FramePolicy;
use fvas_common::dataset::{ClientId, Database, Protocol, ProtocolSelection, Sample, Split};
use fvas_common::four_column::ScoreLine;
use fvas_common::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Write a flat score directory as `<out>/<protocol>/scores/scores-{dev,eval}`
///
/// Licit and spoof files are produced separately for devel and test, with
/// genuine rows as positives.
pub fn dir_to_four_column<D: Database>(
    database: &D,
    scores_dir: &Path,
    out_dir: &Path,
    frame_policy: FramePolicy,
) -> Result<()> {
    let sources = ScoreSources::new(Vec::new(), vec![scores_dir.to_path_buf()]);
    for protocol in [Protocol::Licit, Protocol::Spoof] {
        let options = GatherOptions {
            protocol: ProtocolSelection::from(protocol),
            binary: false,
            normalize: false,
            frame_policy,
            ..GatherOptions::default()
        };
        let aggregator = Aggregator::new(database, &sources, options);
        for split in [Split::Devel, Split::Test] {
            let gathered = aggregator.gather(split, None)?;
            save_fused_scores(
                out_dir,
                protocol,
                split,
                &gathered.matrix.column(0),
                &gathered.labels,
            )?;
        }
    }
    Ok(())
}

/// Highest frame index accepted for samples whose frame count is not in the manifest
pub const MAX_FRAMES: usize = 100_000;

/// Third field of a 4-column line: `<frame>/<path key>`, frame 1-based
pub fn parse_path_token(token: &str) -> Result<(usize, &str)> {
    let (frame, path) = token
        .split_once('/')
        .ok_or_else(|| Error::Parse(format!("expected '<frame>/<path>', found '{}'", token)))?;
    let frame: usize = frame
        .parse()
        .map_err(|_| Error::Parse(format!("invalid frame index in '{}'", token)))?;
    if frame == 0 {
        return Err(Error::Parse(format!("frame indices start at 1: '{}'", token)));
    }
    Ok((frame, path))
}

/// Per-frame scores of one sample under one identity model
#[derive(Debug, Clone)]
struct FrameScores {
    sample: Sample,
    scores: Vec<f64>,
}

impl FrameScores {
    fn new(sample: Sample) -> Self {
        let frames = sample.frames.unwrap_or(0);
        Self {
            sample,
            scores: vec![f64::NAN; frames],
        }
    }

    fn set(&mut self, frame: usize, score: f64) {
        if frame > self.scores.len() {
            self.scores.resize(frame, f64::NAN);
        }
        self.scores[frame - 1] = score;
    }
}

/// Scores regrouped by claimed identity, then by sample path
#[derive(Debug, Default)]
pub struct ScoreTree {
    models: BTreeMap<ClientId, BTreeMap<String, FrameScores>>,
}

impl ScoreTree {
    /// Group 4-column lines of `split`; the claimed identity is the model
    ///
    /// Licit files may only reference genuine samples, spoof files genuine samples
    /// and attacks of the same split.
    pub fn from_lines<D: Database>(
        database: &D,
        lines: &[ScoreLine],
        protocol: Protocol,
        split: Split,
    ) -> Result<Self> {
        let samples = database.split_samples(split)?;
        let allowed: HashSet<&str> = match protocol {
            Protocol::Licit => samples.genuine.iter().map(|s| s.path.as_str()).collect(),
            Protocol::Spoof => samples.all().map(|s| s.path.as_str()).collect(),
        };

        let mut tree = ScoreTree::default();
        for (number, line) in lines.iter().enumerate() {
            let model: ClientId = line.claimed_id.parse()?;
            let (frame, path) = parse_path_token(&line.path_token)?;
            if !allowed.contains(path) {
                return Err(Error::InvalidInput(format!(
                    "line {}: sample '{}' is not a {} sample of the {} set",
                    number + 1,
                    path,
                    protocol,
                    split
                )));
            }
            let sample = database.find(path).ok_or_else(|| {
                Error::InvalidInput(format!("line {}: unknown sample '{}'", number + 1, path))
            })?;
            let limit = sample.frames.unwrap_or(MAX_FRAMES);
            if frame > limit {
                return Err(Error::InvalidInput(format!(
                    "line {}: frame {} of '{}' exceeds its {} frames",
                    number + 1,
                    frame,
                    path,
                    limit
                )));
            }
            tree.models
                .entry(model)
                .or_default()
                .entry(path.to_string())
                .or_insert_with(|| FrameScores::new(sample.clone()))
                .set(frame, line.score);
        }
        debug!(
            "Grouped {} lines into {} models",
            lines.len(),
            tree.models.len()
        );
        Ok(tree)
    }

    pub fn n_models(&self) -> usize {
        self.models.len()
    }

    /// Write one record per (model, sample)
    ///
    /// Licit records go to `<out>/licit/client%03d/<path>.json`, spoof records to
    /// `<out>/spoof/<path>.json`. Missing frames are written as `null`.
    pub fn write(&self, out_dir: &Path, protocol: Protocol) -> Result<usize> {
        let mut written = 0;
        for (model, samples) in &self.models {
            let dir: PathBuf = match protocol {
                Protocol::Licit => out_dir.join(protocol.dir_name()).join(model.to_string()),
                Protocol::Spoof => out_dir.join(protocol.dir_name()),
            };
            for entry in samples.values() {
                let path = entry.sample.record_path(&dir);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let record: Vec<Option<f64>> = entry
                    .scores
                    .iter()
                    .map(|&s| if s.is_nan() { None } else { Some(s) })
                    .collect();
                std::fs::write(&path, serde_json::to_string(&record)?)?;
                written += 1;
            }
        }
        info!("Wrote {} score records under {}", written, out_dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvas_common::dataset::{ManifestDatabase, SampleClass};
    use fvas_common::four_column::parse_line;

    fn database() -> ManifestDatabase {
        let sample = |path: &str, client: u32, class, frames| Sample {
            path: path.to_string(),
            client_id: ClientId(client),
            class,
            split: Split::Devel,
            frames,
        };
        ManifestDatabase::from_samples(vec![
            sample("devel/real/c1", 1, SampleClass::Genuine, Some(3)),
            sample("devel/real/c2", 2, SampleClass::Genuine, None),
            sample("devel/attack/c1", 1, SampleClass::Attack, Some(2)),
        ])
        .unwrap()
    }

    fn lines(text: &str) -> Vec<ScoreLine> {
        text.lines().filter_map(|l| parse_line(l).unwrap()).collect()
    }

    #[test]
    fn test_parse_path_token() {
        assert_eq!(parse_path_token("12/devel/real/c1").unwrap(), (12, "devel/real/c1"));
        assert!(parse_path_token("devel").is_err());
        assert!(parse_path_token("0/devel/real/c1").is_err());
        assert!(parse_path_token("x/devel/real/c1").is_err());
    }

    #[test]
    fn test_licit_tree_per_model() {
        let db = database();
        let input = lines(
            "client001 client001 1/devel/real/c1 0.5\n\
             client001 client001 3/devel/real/c1 0.7\n\
             1 client002 2/devel/real/c2 -0.2\n\
             2 client002 1/devel/real/c2 0.9\n",
        );
        let tree = ScoreTree::from_lines(&db, &input, Protocol::Licit, Split::Devel).unwrap();
        assert_eq!(tree.n_models(), 2);

        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(tree.write(tmp.path(), Protocol::Licit).unwrap(), 3);

        let c1 = std::fs::read_to_string(tmp.path().join("licit/client001/devel/real/c1.json")).unwrap();
        assert_eq!(c1, "[0.5,null,0.7]");
        let c2 = std::fs::read_to_string(tmp.path().join("licit/client001/devel/real/c2.json")).unwrap();
        assert_eq!(c2, "[null,-0.2]");
        assert!(tmp.path().join("licit/client002/devel/real/c2.json").is_file());
    }

    #[test]
    fn test_licit_rejects_attacks() {
        let db = database();
        let input = lines("client001 client001 1/devel/attack/c1 0.5\n");
        assert!(matches!(
            ScoreTree::from_lines(&db, &input, Protocol::Licit, Split::Devel),
            Err(Error::InvalidInput(_))
        ));
        let tree = ScoreTree::from_lines(&db, &input, Protocol::Spoof, Split::Devel).unwrap();
        let tmp = tempfile::tempdir().unwrap();
        tree.write(tmp.path(), Protocol::Spoof).unwrap();
        let attack = std::fs::read_to_string(tmp.path().join("spoof/devel/attack/c1.json")).unwrap();
        assert_eq!(attack, "[0.5,null]");
    }

    #[test]
    fn test_frame_index_bounded() {
        let db = database();
        // manifest says devel/real/c1 has 3 frames
        let input = lines("client001 client001 4/devel/real/c1 0.5\n");
        let err = ScoreTree::from_lines(&db, &input, Protocol::Licit, Split::Devel).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.starts_with("line 1:")));

        // unknown frame count falls back to the global cap
        let huge = format!("client002 client002 {}/devel/real/c2 0.5\n", MAX_FRAMES + 1);
        assert!(matches!(
            ScoreTree::from_lines(&db, &lines(&huge), Protocol::Licit, Split::Devel),
            Err(Error::InvalidInput(_))
        ));
        let at_cap = format!("client002 client002 {}/devel/real/c2 0.5\n", MAX_FRAMES);
        assert!(ScoreTree::from_lines(&db, &lines(&at_cap), Protocol::Licit, Split::Devel).is_ok());
    }
}
