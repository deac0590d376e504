//! Dataset model: samples, identities, splits and protocols
//!
//! The benchmark database is an external collaborator. The fusion pipeline only needs
//! the [`Database`] contract; [`ManifestDatabase`] implements it over a TOML manifest:
//!
//! ```toml
//! [[sample]]
//! path = "devel/real/client001_session01_webcam_authenticate_adverse_1"
//! client = 1
//! class = "genuine"
//! split = "devel"
//! frames = 375
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Identity of a client (enrolled model owner or claimed identity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client{:03}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = Error;

    /// Accepts `client007` as well as a bare number
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("client").unwrap_or(s);
        digits
            .parse::<u32>()
            .map(ClientId)
            .map_err(|_| Error::Parse(format!("invalid client id '{}'", s)))
    }
}

/// Ground-truth class of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleClass {
    /// Bona fide access by the owner
    #[serde(alias = "real")]
    Genuine,
    /// Zero-effort impostor recording
    Impostor,
    /// Presentation attack
    Attack,
}

/// Dataset partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Devel,
    Test,
}

impl Split {
    /// Suffix used in output file names (`scores-dev`, `scores-eval`)
    pub fn alias(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Devel => "dev",
            Split::Test => "eval",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Devel => write!(f, "devel"),
            Split::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Split::Train),
            "devel" | "dev" => Ok(Split::Devel),
            "test" | "eval" => Ok(Split::Test),
            _ => Err(Error::Parse(format!("unknown split '{}'", s))),
        }
    }
}

/// Face verification evaluation protocol
///
/// Licit: genuine accesses against every enrolled identity (identity confusion).
/// Spoof: genuine accesses and presentation attacks (liveness confusion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Licit,
    Spoof,
}

impl Protocol {
    /// Subdirectory of a face verification score directory
    pub fn dir_name(self) -> &'static str {
        match self {
            Protocol::Licit => "licit",
            Protocol::Spoof => "spoof",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "licit" => Ok(Protocol::Licit),
            "spoof" => Ok(Protocol::Spoof),
            _ => Err(Error::Parse(format!("unknown protocol '{}'", s))),
        }
    }
}

/// Which protocols a gathering call covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolSelection {
    Licit,
    Spoof,
    Both,
}

impl ProtocolSelection {
    pub fn includes(self, protocol: Protocol) -> bool {
        matches!(
            (self, protocol),
            (ProtocolSelection::Both, _)
                | (ProtocolSelection::Licit, Protocol::Licit)
                | (ProtocolSelection::Spoof, Protocol::Spoof)
        )
    }

    /// Selected protocols, licit first
    pub fn protocols(self) -> Vec<Protocol> {
        [Protocol::Licit, Protocol::Spoof]
            .into_iter()
            .filter(|&p| self.includes(p))
            .collect()
    }
}

impl From<Protocol> for ProtocolSelection {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Licit => ProtocolSelection::Licit,
            Protocol::Spoof => ProtocolSelection::Spoof,
        }
    }
}

impl fmt::Display for ProtocolSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolSelection::Licit => write!(f, "licit"),
            ProtocolSelection::Spoof => write!(f, "spoof"),
            ProtocolSelection::Both => write!(f, "both"),
        }
    }
}

impl FromStr for ProtocolSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "licit" => Ok(ProtocolSelection::Licit),
            "spoof" => Ok(ProtocolSelection::Spoof),
            "both" => Ok(ProtocolSelection::Both),
            _ => Err(Error::Parse(format!("unknown protocol '{}'", s))),
        }
    }
}

/// One scored unit of the benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Stable path key locating the sample's score records
    pub path: String,
    /// Owner identity (claimed identity for attacks)
    #[serde(rename = "client")]
    pub client_id: ClientId,
    pub class: SampleClass,
    pub split: Split,
    /// Number of video frames, when known
    #[serde(default)]
    pub frames: Option<usize>,
}

impl Sample {
    pub fn is_genuine(&self) -> bool {
        self.class == SampleClass::Genuine
    }

    /// Record file for this sample under a score directory
    pub fn record_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.path))
    }
}

/// Samples of one split, separated the way the pipeline consumes them
///
/// `attack` holds every non-genuine sample, presentation attacks and zero-effort
/// impostor recordings alike, in manifest order.
#[derive(Debug, Clone, Default)]
pub struct SplitSamples {
    pub genuine: Vec<Sample>,
    pub attack: Vec<Sample>,
}

impl SplitSamples {
    /// Distinct owner identities of the genuine samples, ascending
    pub fn genuine_clients(&self) -> Vec<ClientId> {
        self.genuine
            .iter()
            .map(|s| s.client_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Genuine samples followed by the rest
    pub fn all(&self) -> impl Iterator<Item = &Sample> {
        self.genuine.iter().chain(self.attack.iter())
    }
}

/// Dataset collaborator contract
pub trait Database {
    /// Genuine and non-genuine samples of a split
    fn split_samples(&self, split: Split) -> Result<SplitSamples>;

    /// Look a sample up by path key
    fn find(&self, path: &str) -> Option<&Sample>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default, rename = "sample")]
    samples: Vec<Sample>,
}

/// Database backed by a TOML manifest, with a path index built once at load
#[derive(Debug, Clone)]
pub struct ManifestDatabase {
    samples: Vec<Sample>,
    by_path: HashMap<String, usize>,
}

impl ManifestDatabase {
    /// Build from samples; duplicate path keys are rejected
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self> {
        let mut by_path = HashMap::with_capacity(samples.len());
        for (index, sample) in samples.iter().enumerate() {
            if by_path.insert(sample.path.clone(), index).is_some() {
                return Err(Error::InvalidInput(format!(
                    "duplicate sample path '{}' in manifest",
                    sample.path
                )));
            }
        }
        Ok(Self { samples, by_path })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(content)?;
        Self::from_samples(manifest.samples)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read manifest {}: {}", path.display(), e))
        })?;
        let db = Self::from_toml_str(&content)?;
        info!("Loaded {} samples from {}", db.samples.len(), path.display());
        Ok(db)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Database for ManifestDatabase {
    fn split_samples(&self, split: Split) -> Result<SplitSamples> {
        let mut out = SplitSamples::default();
        for sample in self.samples.iter().filter(|s| s.split == split) {
            if sample.is_genuine() {
                out.genuine.push(sample.clone());
            } else {
                out.attack.push(sample.clone());
            }
        }
        if out.genuine.is_empty() && out.attack.is_empty() {
            return Err(Error::Config(format!("no samples for split '{}'", split)));
        }
        Ok(out)
    }

    fn find(&self, path: &str) -> Option<&Sample> {
        self.by_path.get(path).map(|&i| &self.samples[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
        [[sample]]
        path = "train/real/client001_a"
        client = 1
        class = "genuine"
        split = "train"

        [[sample]]
        path = "train/attack/client001_b"
        client = 1
        class = "attack"
        split = "train"
        frames = 10

        [[sample]]
        path = "train/real/client002_a"
        client = 2
        class = "real"
        split = "train"

        [[sample]]
        path = "devel/real/client003_a"
        client = 3
        class = "genuine"
        split = "devel"
    "#;

    #[test]
    fn test_client_id_format_and_parse() {
        assert_eq!(ClientId(7).to_string(), "client007");
        assert_eq!(ClientId(123).to_string(), "client123");
        assert_eq!("client007".parse::<ClientId>().unwrap(), ClientId(7));
        assert_eq!("12".parse::<ClientId>().unwrap(), ClientId(12));
        assert!("clientX".parse::<ClientId>().is_err());
    }

    #[test]
    fn test_split_aliases() {
        assert_eq!(Split::Devel.alias(), "dev");
        assert_eq!(Split::Test.alias(), "eval");
        assert_eq!("eval".parse::<Split>().unwrap(), Split::Test);
        assert_eq!("devel".parse::<Split>().unwrap(), Split::Devel);
    }

    #[test]
    fn test_protocol_selection_includes() {
        assert!(ProtocolSelection::Both.includes(Protocol::Licit));
        assert!(ProtocolSelection::Both.includes(Protocol::Spoof));
        assert!(!ProtocolSelection::Licit.includes(Protocol::Spoof));
        assert!(ProtocolSelection::Spoof.includes(Protocol::Spoof));
    }

    #[test]
    fn test_protocol_selection_expands_licit_first() {
        assert_eq!(
            ProtocolSelection::Both.protocols(),
            vec![Protocol::Licit, Protocol::Spoof]
        );
        assert_eq!(ProtocolSelection::Spoof.protocols(), vec![Protocol::Spoof]);
        assert_eq!(
            "both".parse::<ProtocolSelection>().unwrap().protocols().len(),
            2
        );
    }

    #[test]
    fn test_manifest_split_samples() {
        let db = ManifestDatabase::from_toml_str(MANIFEST).unwrap();
        assert_eq!(db.len(), 4);

        let train = db.split_samples(Split::Train).unwrap();
        assert_eq!(train.genuine.len(), 2);
        assert_eq!(train.attack.len(), 1);
        assert_eq!(train.attack[0].frames, Some(10));
        assert_eq!(train.genuine_clients(), vec![ClientId(1), ClientId(2)]);

        assert!(db.split_samples(Split::Test).is_err());
    }

    #[test]
    fn test_manifest_find_by_path() {
        let db = ManifestDatabase::from_toml_str(MANIFEST).unwrap();
        let sample = db.find("devel/real/client003_a").unwrap();
        assert_eq!(sample.client_id, ClientId(3));
        assert!(db.find("devel/real/missing").is_none());
    }

    #[test]
    fn test_manifest_duplicate_path_rejected() {
        let doubled = format!("{}\n{}", MANIFEST, MANIFEST);
        assert!(ManifestDatabase::from_toml_str(&doubled).is_err());
    }

    #[test]
    fn test_record_path() {
        let db = ManifestDatabase::from_toml_str(MANIFEST).unwrap();
        let sample = db.find("train/real/client001_a").unwrap();
        assert_eq!(
            sample.record_path(Path::new("/scores/spoof")),
            PathBuf::from("/scores/spoof/train/real/client001_a.json")
        );
    }
}
