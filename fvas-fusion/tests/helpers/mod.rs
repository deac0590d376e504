//! Test Helper Utilities
//!
//! Builds a small three-client benchmark on disk: a TOML manifest plus face
//! verification (licit and spoof) and anti-spoofing score directories.

#![allow(dead_code)]

use fvas_common::dataset::ManifestDatabase;
use fvas_fusion::aggregator::ScoreSources;
use serde_json::json;
use std::path::{Path, PathBuf};

pub const CLIENTS: [u32; 3] = [1, 2, 3];
pub const FRAMES: usize = 2;
pub const SPLITS: [&str; 3] = ["train", "devel", "test"];

/// Per-frame jitter in [0, 0.4]; zero for client 3, frame 1
pub fn jitter(client: u32, frame: usize) -> f64 {
    0.1 * ((client as usize * 3 + frame) % 5) as f64
}

pub struct Benchmark {
    pub root: PathBuf,
    pub database: ManifestDatabase,
    pub fv_dir: PathBuf,
    pub as_dir: PathBuf,
}

impl Benchmark {
    pub fn sources(&self) -> ScoreSources {
        ScoreSources::new(vec![self.fv_dir.clone()], vec![self.as_dir.clone()])
    }
}

pub fn genuine_path(split: &str, client: u32) -> String {
    format!("{}/real/c{}", split, client)
}

pub fn attack_path(split: &str, client: u32) -> String {
    format!("{}/attack/c{}", split, client)
}

pub fn write_record(dir: &Path, path: &str, values: Vec<f64>) {
    let file = dir.join(format!("{}.json", path));
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(file, json!(values).to_string()).unwrap();
}

fn frames(base: f64, client: u32) -> Vec<f64> {
    (0..FRAMES).map(|f| base + jitter(client, f)).collect()
}

fn manifest() -> String {
    let mut toml = String::new();
    for split in SPLITS {
        for client in CLIENTS {
            for (path, class) in [
                (genuine_path(split, client), "real"),
                (attack_path(split, client), "attack"),
            ] {
                toml.push_str(&format!(
                    "[[sample]]\npath = \"{}\"\nclient = {}\nclass = \"{}\"\nsplit = \"{}\"\nframes = {}\n\n",
                    path, client, class, split, FRAMES
                ));
            }
        }
    }
    toml
}

/// Genuine FV scores near 2.0, impostors near -1.0, attacks near 1.5;
/// AS scores near 1.0 for genuine accesses and -1.0 for attacks
pub fn create_benchmark(root: &Path) -> Benchmark {
    let manifest_path = root.join("manifest.toml");
    std::fs::write(&manifest_path, manifest()).unwrap();
    let database = ManifestDatabase::load(&manifest_path).unwrap();

    let fv_dir = root.join("fv");
    let as_dir = root.join("as");
    for split in SPLITS {
        for client in CLIENTS {
            let genuine = genuine_path(split, client);
            let attack = attack_path(split, client);
            for model in CLIENTS {
                let base = if model == client { 2.0 } else { -1.0 };
                write_record(
                    &fv_dir.join("licit").join(format!("client{:03}", model)),
                    &genuine,
                    frames(base, client),
                );
            }
            write_record(&fv_dir.join("spoof"), &genuine, frames(2.0, client));
            write_record(&fv_dir.join("spoof"), &attack, frames(1.5, client));
            write_record(&as_dir, &genuine, frames(1.0, client));
            write_record(&as_dir, &attack, frames(-1.0, client));
        }
    }

    Benchmark {
        root: root.to_path_buf(),
        database,
        fv_dir,
        as_dir,
    }
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
