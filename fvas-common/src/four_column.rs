//! 4-column score files
//!
//! One line per score: `<claimed_id> <true_id> <path_token> <score>`.
//! A line whose claimed and true identities match is a positive (genuine) sample.
//! Fused scores carry no real identities, so writers emit the placeholder lines
//! `x x foo <score>` (positive) and `x y foo <score>` (negative).

use crate::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One parsed line of a 4-column file
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreLine {
    pub claimed_id: String,
    pub true_id: String,
    pub path_token: String,
    pub score: f64,
}

impl ScoreLine {
    pub fn is_positive(&self) -> bool {
        self.claimed_id == self.true_id
    }
}

/// Parse a single line; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<ScoreLine>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() {
        return Ok(None);
    }
    if fields.len() != 4 {
        return Err(Error::Parse(format!(
            "expected 4 fields, found {}: '{}'",
            fields.len(),
            line
        )));
    }
    let score = fields[3]
        .parse::<f64>()
        .map_err(|e| Error::Parse(format!("invalid score '{}': {}", fields[3], e)))?;
    Ok(Some(ScoreLine {
        claimed_id: fields[0].to_string(),
        true_id: fields[1].to_string(),
        path_token: fields[2].to_string(),
        score,
    }))
}

/// Read every line of a 4-column file
pub fn read_lines(path: &Path) -> Result<Vec<ScoreLine>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_line(&line) {
            Ok(Some(parsed)) => lines.push(parsed),
            Ok(None) => {}
            Err(e) => {
                return Err(Error::Parse(format!(
                    "{}:{}: {}",
                    path.display(),
                    number + 1,
                    e
                )))
            }
        }
    }
    Ok(lines)
}

/// Split parsed lines into (negatives, positives) score lists
pub fn split_scores(lines: &[ScoreLine]) -> (Vec<f64>, Vec<f64>) {
    let mut negatives = Vec::new();
    let mut positives = Vec::new();
    for line in lines {
        if line.is_positive() {
            positives.push(line.score);
        } else {
            negatives.push(line.score);
        }
    }
    (negatives, positives)
}

/// Format one placeholder line
pub fn format_line(score: f64, positive: bool) -> String {
    if positive {
        format!("x x foo {:.6}", score)
    } else {
        format!("x y foo {:.6}", score)
    }
}

/// Write `(score, is_positive)` pairs, creating parent directories
///
/// NaN scores are skipped. Returns the number of lines written.
pub fn write_scores<I>(path: &Path, scores: I) -> Result<usize>
where
    I: IntoIterator<Item = (f64, bool)>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    let mut written = 0;
    for (score, positive) in scores {
        if score.is_nan() {
            continue;
        }
        writeln!(writer, "{}", format_line(score, positive))?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}
