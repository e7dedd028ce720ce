//! The per-run dataset schema record (`schema.json`).
//!
//! Written once per training run and read back at evaluation time, so its
//! shape is part of the run-directory contract.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::utils::{read_json, write_json_atomic};

/// Snapshot of the training table as the trainer saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Absolute path of the training CSV.
    pub csv_path: PathBuf,
    pub target: String,
    /// Rows after cleaning.
    pub n_rows: usize,
    /// Columns after cleaning, including the target.
    pub n_cols: usize,
    /// Every feature column, in CSV order. The evaluator requires all of
    /// these to be present.
    pub feature_columns: Vec<String>,
    /// Feature columns the preprocessor treated as numeric.
    pub numeric_columns: Vec<String>,
    /// Feature columns that were one-hot encoded.
    pub categorical_columns: Vec<String>,
    /// CSV-reader dtype per surviving column.
    pub dtypes: BTreeMap<String, String>,
    pub seed: u64,
    pub test_size: f64,
    /// Local wall-clock time of the run, seconds precision.
    pub created_at: String,
}

impl Schema {
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path).map_err(|e| EngineError::ArtifactLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Local timestamp with seconds precision, ISO-8601 without offset.
pub fn local_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Timestamp-based run identifier, unique per second on one machine.
pub fn run_id() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
