//! Label assignment for the licit and spoof protocols
//!
//! The two protocols answer different questions. Licit asks "is this the claimed
//! identity?", spoof asks "is this a live access?", so each has its own rule.

use crate::matrix::{Label, ATTACK, GENUINE, IMPOSTOR};
use fvas_common::dataset::{ClientId, Protocol, Sample, SampleClass};
use fvas_common::{Error, Result};

/// Labels for `samples` under `protocol`
///
/// `target` is the identity model being scored and is required for licit.
pub fn assign(
    samples: &[Sample],
    protocol: Protocol,
    target: Option<ClientId>,
    binary: bool,
) -> Result<Vec<Label>> {
    match protocol {
        Protocol::Licit => {
            let target = target.ok_or_else(|| {
                Error::Config("licit labels need a target identity".to_string())
            })?;
            Ok(licit_labels(samples, target, binary))
        }
        Protocol::Spoof => Ok(spoof_labels(samples, binary)),
    }
}

fn negative(binary: bool) -> Label {
    if binary {
        IMPOSTOR
    } else {
        ATTACK
    }
}

/// Identity rule: only the target's own genuine accesses are positive
pub fn licit_labels(samples: &[Sample], target: ClientId, binary: bool) -> Vec<Label> {
    samples
        .iter()
        .map(|s| {
            if s.client_id != target {
                IMPOSTOR
            } else if s.is_genuine() {
                GENUINE
            } else {
                negative(binary)
            }
        })
        .collect()
}

/// Liveness rule: genuine accesses are positive whoever claims them
pub fn spoof_labels(samples: &[Sample], binary: bool) -> Vec<Label> {
    samples
        .iter()
        .map(|s| match s.class {
            SampleClass::Genuine => GENUINE,
            SampleClass::Attack => negative(binary),
            SampleClass::Impostor => IMPOSTOR,
        })
        .collect()
}

/// Repeat each per-sample label once per row the sample contributed
pub fn expand(labels: &[Label], rows_per_sample: &[usize]) -> Result<Vec<Label>> {
    if labels.len() != rows_per_sample.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} labels for {} samples",
            labels.len(),
            rows_per_sample.len()
        )));
    }
    Ok(labels
        .iter()
        .zip(rows_per_sample)
        .flat_map(|(&label, &rows)| std::iter::repeat(label).take(rows))
        .collect())
}
