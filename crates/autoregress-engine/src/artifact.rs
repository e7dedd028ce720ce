//! Run-directory artifact layout and the persisted model bundle.
//!
//! A completed training run directory contains:
//!
//! ```text
//! <run_dir>/
//!   model.json            fitted preprocessor + best estimator
//!   schema.json           dataset schema snapshot
//!   metrics.json          per-candidate validation scores
//!   val_predictions.csv   y_true,y_pred for the validation rows
//!   plots/                rendered PNGs (best effort)
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::RawColumn;
use crate::error::{EngineError, Result};
use crate::metrics::ModelScore;
use crate::models::{FittedEstimator, ROSTER_VERSION};
use crate::preprocess::Preprocessor;
use crate::utils::{read_json, write_json_atomic};

pub const MODEL_FILE: &str = "model.json";
pub const SCHEMA_FILE: &str = "schema.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const VAL_PREDICTIONS_FILE: &str = "val_predictions.csv";
pub const PLOTS_DIR: &str = "plots";

/// The serialized model bundle: everything needed to turn raw CSV columns
/// into predictions.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Roster/serialization version the bundle was written with.
    pub version: u32,
    pub best_model: String,
    pub preprocessor: Preprocessor,
    pub estimator: FittedEstimator,
}

impl ModelArtifact {
    pub fn new(best_model: String, preprocessor: Preprocessor, estimator: FittedEstimator) -> Self {
        Self {
            version: ROSTER_VERSION,
            best_model,
            preprocessor,
            estimator,
        }
    }

    /// Write the bundle into a run directory.
    pub fn save(&self, run_dir: &Path) -> Result<()> {
        write_json_atomic(&run_dir.join(MODEL_FILE), self)
    }

    /// Load the bundle from a run directory, validating the layout first.
    pub fn load(run_dir: &Path) -> Result<Self> {
        check_run_dir(run_dir)?;
        let path = run_dir.join(MODEL_FILE);
        read_json(&path).map_err(|e| EngineError::ArtifactLoad {
            path,
            message: e.to_string(),
        })
    }

    /// Run raw feature columns through the fitted pipeline and estimator.
    pub fn predict(&self, columns: &[RawColumn]) -> Result<Vec<f64>> {
        let matrix = self.preprocessor.transform(columns)?;
        self.estimator
            .predict(&matrix)
            .map_err(|e| EngineError::PredictionFailed {
                message: e.to_string(),
            })
    }
}

/// Check that a run directory exists and holds both contract files.
pub fn check_run_dir(run_dir: &Path) -> Result<()> {
    if !run_dir.is_dir() {
        return Err(EngineError::ModelDirNotFound {
            path: run_dir.to_path_buf(),
        });
    }
    if !run_dir.join(MODEL_FILE).is_file() || !run_dir.join(SCHEMA_FILE).is_file() {
        return Err(EngineError::ArtifactIncomplete {
            path: run_dir.to_path_buf(),
        });
    }
    Ok(())
}

/// The `metrics.json` record of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub best_model: String,
    pub best_r2: f64,
    pub per_model: BTreeMap<String, ModelScore>,
}

impl TrainingMetrics {
    pub fn save(&self, run_dir: &Path) -> Result<()> {
        write_json_atomic(&run_dir.join(METRICS_FILE), self)
    }

    pub fn load(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(METRICS_FILE);
        read_json(&path).map_err(|e| EngineError::ArtifactLoad {
            path,
            message: e.to_string(),
        })
    }
}

/// Write validation predictions as a two-column CSV.
pub fn write_val_predictions(run_dir: &Path, y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    let mut out = Vec::with_capacity(y_true.len() * 16 + 16);
    writeln!(out, "y_true,y_pred")?;
    for (t, p) in y_true.iter().zip(y_pred) {
        writeln!(out, "{t},{p}")?;
    }
    fs::write(run_dir.join(VAL_PREDICTIONS_FILE), out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CANDIDATES, fit_candidate};
    use pretty_assertions::assert_eq;

    fn fitted_artifact() -> (Vec<RawColumn>, ModelArtifact) {
        let columns = vec![RawColumn::Numeric {
            name: "x".to_string(),
            values: (0..20).map(|i| Some(i as f64)).collect(),
        }];
        let y: Vec<f64> = (0..20).map(|i| 3.0 * i as f64).collect();
        let built = crate::preprocess::Preprocessor::fit(&columns);
        let matrix = built.preprocessor.transform(&columns).unwrap();
        let estimator = fit_candidate(&CANDIDATES[0], &matrix, &y).unwrap();
        let artifact = ModelArtifact::new(
            "Linear Regression".to_string(),
            built.preprocessor,
            estimator,
        );
        (columns, artifact)
    }

    #[test]
    fn test_artifact_roundtrip_predictions_match() {
        let dir = tempfile::tempdir().unwrap();
        let (columns, artifact) = fitted_artifact();
        let before = artifact.predict(&columns).unwrap();

        artifact.save(dir.path()).unwrap();
        std::fs::write(dir.path().join(SCHEMA_FILE), "{}").unwrap();
        let back = ModelArtifact::load(dir.path()).unwrap();
        assert_eq!(back.version, ROSTER_VERSION);
        assert_eq!(back.best_model, "Linear Regression");

        let after = back.predict(&columns).unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_check_run_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            check_run_dir(&missing),
            Err(EngineError::ModelDirNotFound { .. })
        ));

        let empty = dir.path().join("run");
        std::fs::create_dir(&empty).unwrap();
        assert!(matches!(
            check_run_dir(&empty),
            Err(EngineError::ArtifactIncomplete { .. })
        ));
    }

    #[test]
    fn test_metrics_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = TrainingMetrics {
            best_model: "Ridge Regression".to_string(),
            best_r2: 0.9,
            per_model: BTreeMap::from([(
                "Ridge Regression".to_string(),
                ModelScore {
                    r2: 0.9,
                    mae: 1.0,
                    rmse: 2.0,
                    seconds: 0.1,
                },
            )]),
        };
        metrics.save(dir.path()).unwrap();
        assert_eq!(TrainingMetrics::load(dir.path()).unwrap(), metrics);
    }

    #[test]
    fn test_val_predictions_format() {
        let dir = tempfile::tempdir().unwrap();
        write_val_predictions(dir.path(), &[1.0, 2.5], &[1.1, 2.4]).unwrap();
        let text = std::fs::read_to_string(dir.path().join(VAL_PREDICTIONS_FILE)).unwrap();
        assert_eq!(text, "y_true,y_pred\n1,1.1\n2.5,2.4\n");
    }
}
