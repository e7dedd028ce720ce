//! Error types for the training/evaluation engine.
//!
//! All public engine operations return [`Result`]. Every variant maps to one of
//! two process exit codes: validation/input errors exit with `2` and are always
//! paired with a terminal `error` event on the protocol stream; everything else
//! exits with `1`.

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::list_preview;

/// The main error type for engine operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// The CSV path does not exist or does not end in `.csv`.
    #[error("CSV path is invalid: {}", .path.display())]
    InvalidCsvPath {
        /// The offending path.
        path: PathBuf,
    },

    /// The CSV file exists but could not be parsed into a table.
    #[error("Failed to read CSV '{}': {message}", .path.display())]
    CsvParse { path: PathBuf, message: String },

    /// The requested target column is not present in the dataset.
    #[error("Target column not found: '{target}'")]
    TargetNotFound { target: String },

    /// No value in the target column coerces to a number.
    ///
    /// The message lists up to five raw example values so the user can see why
    /// the column was rejected.
    #[error(
        "Regression requires a numeric target column. The selected target '{target}' appears \
         non-numeric (e.g. {}). Choose a numeric target column.",
        example_text(.examples)
    )]
    NonNumericTarget {
        target: String,
        /// Distinct raw (non-null) values, capped at five by the loader.
        examples: Vec<String>,
    },

    /// Every feature column was dropped during cleaning.
    #[error("No feature columns available after cleaning")]
    NoFeatureColumns,

    /// Fewer than two usable rows survived cleaning; nothing to split.
    #[error("Dataset has only {n_rows} usable row(s); need at least 2 to train")]
    TooFewRows { n_rows: usize },

    /// The model directory passed to the evaluator does not exist.
    #[error("Model directory not found: {}", .path.display())]
    ModelDirNotFound { path: PathBuf },

    /// The model directory is missing its pipeline or schema file.
    #[error(
        "Model directory must contain {model} and {schema}",
        model = crate::artifact::MODEL_FILE,
        schema = crate::artifact::SCHEMA_FILE
    )]
    ArtifactIncomplete { path: PathBuf },

    /// A persisted artifact or schema file exists but cannot be decoded.
    #[error("Failed to load '{}': {message}", .path.display())]
    ArtifactLoad { path: PathBuf, message: String },

    /// The evaluation CSV lacks feature columns the artifact's schema requires.
    #[error(
        "Dataset is missing required feature columns: {}",
        list_preview(.missing, 10)
    )]
    MissingFeatureColumns { missing: Vec<String> },

    /// Every candidate failed to fit or predict.
    #[error("Training failed for all models")]
    AllModelsFailed,

    /// Prediction through a loaded artifact failed.
    #[error("Prediction failed: {message}")]
    PredictionFailed { message: String },

    /// A single estimator failed; callers skip the candidate and continue.
    #[error("{name} failed: {message}")]
    Estimator { name: String, message: String },

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn example_text(examples: &[String]) -> String {
    if examples.is_empty() {
        "(no non-null values)".to_string()
    } else {
        examples.join(", ")
    }
}

impl EngineError {
    /// Whether this is a validation/input error caused by the user's inputs
    /// rather than an engine defect.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCsvPath { .. }
                | Self::CsvParse { .. }
                | Self::TargetNotFound { .. }
                | Self::NonNumericTarget { .. }
                | Self::NoFeatureColumns
                | Self::TooFewRows { .. }
                | Self::ModelDirNotFound { .. }
                | Self::ArtifactIncomplete { .. }
                | Self::ArtifactLoad { .. }
                | Self::MissingFeatureColumns { .. }
                | Self::AllModelsFailed
                | Self::PredictionFailed { .. }
        )
    }

    /// Process exit code for this error: `2` for validation/input errors,
    /// `1` for everything else.
    pub fn exit_code(&self) -> i32 {
        if self.is_user_error() { 2 } else { 1 }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_exit_two() {
        let err = EngineError::InvalidCsvPath {
            path: PathBuf::from("/nope"),
        };
        assert!(err.is_user_error());
        assert_eq!(err.exit_code(), 2);

        let err = EngineError::AllModelsFailed;
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_internal_errors_exit_one() {
        let err = EngineError::Io(std::io::Error::other("disk gone"));
        assert!(!err.is_user_error());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_non_numeric_target_message_lists_examples() {
        let err = EngineError::NonNumericTarget {
            target: "price".to_string(),
            examples: vec!["cheap".to_string(), "expensive".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'price'"));
        assert!(msg.contains("cheap, expensive"));
    }

    #[test]
    fn test_non_numeric_target_message_without_examples() {
        let err = EngineError::NonNumericTarget {
            target: "y".to_string(),
            examples: vec![],
        };
        assert!(err.to_string().contains("(no non-null values)"));
    }

    #[test]
    fn test_missing_feature_columns_message_caps_at_ten() {
        let missing: Vec<String> = (0..12).map(|i| format!("col{i}")).collect();
        let err = EngineError::MissingFeatureColumns { missing };
        let msg = err.to_string();
        assert!(msg.contains("col0"));
        assert!(msg.contains("col9"));
        assert!(!msg.contains("col10"));
        assert!(msg.ends_with("..."));
    }
}
