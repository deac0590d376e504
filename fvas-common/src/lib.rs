//! # FVAS Common Library
//!
//! Shared code for the face verification / anti-spoofing fusion tools:
//! - Error types
//! - Configuration loading and logging bootstrap
//! - Dataset model (samples, identities, splits, protocols)
//! - 4-column score file reading and writing

pub mod config;
pub mod dataset;
pub mod error;
pub mod four_column;

pub use error::{Error, Result};
