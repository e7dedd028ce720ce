//! Feature preprocessing: numeric coercion, imputation, scaling and one-hot
//! encoding.
//!
//! Fitting happens on the training rows only; the fitted state is serialized
//! into the run artifact and re-applied verbatim at evaluation time. The
//! output matrix is column-blocked: all numeric features first, then one
//! block of indicator columns per categorical feature, categories sorted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::RawColumn;
use crate::error::{EngineError, Result};
use crate::utils::parse_numeric_string;

/// Fraction of non-null cells that must parse as numbers for a text column to
/// be treated as numeric.
pub const NUMERIC_COERCION_THRESHOLD: f64 = 0.98;

/// Categorical columns with more distinct values than this are dropped
/// instead of one-hot encoded.
pub const MAX_CATEGORICAL_CARDINALITY: usize = 80;

/// Fitted state for one numeric feature: median imputation followed by
/// standard scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStage {
    pub name: String,
    pub median: f64,
    pub mean: f64,
    /// Population standard deviation of the imputed training values, or 1.0
    /// for zero-variance columns.
    pub scale: f64,
}

/// Fitted state for one categorical feature: most-frequent imputation
/// followed by one-hot encoding over the training categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStage {
    pub name: String,
    /// Imputation value: the most frequent training category, ties broken by
    /// the lexicographically smallest.
    pub mode: String,
    /// Sorted distinct training categories. Unseen values encode as all
    /// zeros.
    pub categories: Vec<String>,
}

/// A fitted, serializable preprocessing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numeric: Vec<NumericStage>,
    pub categorical: Vec<CategoricalStage>,
}

/// Result of fitting: the pipeline plus the column partition it settled on.
#[derive(Debug, Clone)]
pub struct BuiltPreprocessor {
    pub preprocessor: Preprocessor,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    /// Categorical columns dropped for exceeding the cardinality cap.
    pub dropped_categorical: Vec<String>,
}

/// View any raw column as numbers, parsing text cells with formatting-aware
/// cleaning.
fn numeric_view(col: &RawColumn) -> Vec<Option<f64>> {
    match col {
        RawColumn::Numeric { values, .. } => values.clone(),
        RawColumn::Text { values, .. } => values
            .iter()
            .map(|v| v.as_deref().and_then(parse_numeric_string))
            .collect(),
    }
}

/// Whether a text column should be coerced to numeric: at least
/// [`NUMERIC_COERCION_THRESHOLD`] of its non-null cells must parse.
fn coerces_to_numeric(values: &[Option<String>]) -> bool {
    let non_null = values.iter().filter(|v| v.is_some()).count();
    if non_null == 0 {
        return false;
    }
    let parsed = values
        .iter()
        .filter(|v| v.as_deref().and_then(parse_numeric_string).is_some())
        .count();
    parsed as f64 / non_null as f64 >= NUMERIC_COERCION_THRESHOLD
}

/// Median of the non-null values; 0.0 when there are none.
fn median(values: &[Option<f64>]) -> f64 {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return 0.0;
    }
    present.sort_by(|a, b| a.total_cmp(b));
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        (present[mid - 1] + present[mid]) / 2.0
    } else {
        present[mid]
    }
}

fn fit_numeric(name: &str, values: &[Option<f64>]) -> NumericStage {
    let median = median(values);
    let imputed: Vec<f64> = values.iter().map(|v| v.unwrap_or(median)).collect();
    let n = imputed.len() as f64;
    let mean = imputed.iter().sum::<f64>() / n;
    let variance = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    let scale = if std > 0.0 { std } else { 1.0 };
    NumericStage {
        name: name.to_string(),
        median,
        mean,
        scale,
    }
}

fn fit_categorical(name: &str, values: &[Option<String>]) -> CategoricalStage {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values.iter().flatten() {
        *counts.entry(value.as_str()).or_insert(0) += 1;
    }
    // Highest count wins; ties go to the lexicographically smallest key.
    let mode = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(k, _)| k.to_string())
        .unwrap_or_default();

    let mut categories: Vec<String> = counts.keys().map(|k| k.to_string()).collect();
    if categories.is_empty() {
        categories.push(mode.clone());
    }
    CategoricalStage {
        name: name.to_string(),
        mode,
        categories,
    }
}

/// Select the given rows out of a raw column.
pub fn take_rows(col: &RawColumn, rows: &[usize]) -> RawColumn {
    match col {
        RawColumn::Numeric { name, values } => RawColumn::Numeric {
            name: name.clone(),
            values: rows.iter().map(|&i| values[i]).collect(),
        },
        RawColumn::Text { name, values } => RawColumn::Text {
            name: name.clone(),
            values: rows.iter().map(|&i| values[i].clone()).collect(),
        },
    }
}

impl Preprocessor {
    /// Fit the pipeline on training-row columns.
    ///
    /// Decides the numeric/categorical partition here, on the training rows,
    /// so evaluation always reuses the training-time decision.
    pub fn fit(columns: &[RawColumn]) -> BuiltPreprocessor {
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        let mut dropped_categorical = Vec::new();

        for col in columns {
            let treat_numeric = match col {
                RawColumn::Numeric { .. } => true,
                RawColumn::Text { values, .. } => {
                    let coerce = coerces_to_numeric(values);
                    if coerce {
                        debug!("coercing text column '{}' to numeric", col.name());
                    }
                    coerce
                }
            };

            if treat_numeric {
                numeric.push(fit_numeric(col.name(), &numeric_view(col)));
            } else if let RawColumn::Text { name, values } = col {
                let distinct = values
                    .iter()
                    .flatten()
                    .collect::<std::collections::BTreeSet<_>>()
                    .len();
                if distinct > MAX_CATEGORICAL_CARDINALITY {
                    dropped_categorical.push(name.clone());
                } else {
                    categorical.push(fit_categorical(name, values));
                }
            }
        }

        let numeric_columns = numeric.iter().map(|s| s.name.clone()).collect();
        let categorical_columns = categorical.iter().map(|s| s.name.clone()).collect();
        BuiltPreprocessor {
            preprocessor: Preprocessor {
                numeric,
                categorical,
            },
            numeric_columns,
            categorical_columns,
            dropped_categorical,
        }
    }

    /// Number of output features per row.
    pub fn output_width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|s| s.categories.len())
                .sum::<usize>()
    }

    /// Transform raw columns into the dense row-major feature matrix.
    ///
    /// Columns are looked up by name; every fitted column must be present.
    /// Extra columns are ignored.
    pub fn transform(&self, columns: &[RawColumn]) -> Result<Vec<Vec<f64>>> {
        let lookup = |name: &str| columns.iter().find(|c| c.name() == name);

        let missing: Vec<String> = self
            .numeric
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.categorical.iter().map(|s| s.name.as_str()))
            .filter(|name| lookup(name).is_none())
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::MissingFeatureColumns { missing });
        }

        let n_rows = columns.first().map_or(0, RawColumn::len);
        let mut matrix = vec![Vec::with_capacity(self.output_width()); n_rows];

        for stage in &self.numeric {
            let values = numeric_view(lookup(&stage.name).unwrap_or_else(|| unreachable!()));
            for (row, value) in matrix.iter_mut().zip(values) {
                let raw = value.unwrap_or(stage.median);
                row.push((raw - stage.mean) / stage.scale);
            }
        }

        for stage in &self.categorical {
            let col = lookup(&stage.name).unwrap_or_else(|| unreachable!());
            let values: Vec<String> = match col {
                RawColumn::Text { values, .. } => values
                    .iter()
                    .map(|v| v.clone().unwrap_or_else(|| stage.mode.clone()))
                    .collect(),
                // A column that was categorical at fit time but parsed as
                // numeric here: format the numbers and hope for a match.
                RawColumn::Numeric { values, .. } => values
                    .iter()
                    .map(|v| match v {
                        Some(x) => format!("{x}"),
                        None => stage.mode.clone(),
                    })
                    .collect(),
            };
            for (row, value) in matrix.iter_mut().zip(values) {
                for category in &stage.categories {
                    row.push(if *category == value { 1.0 } else { 0.0 });
                }
            }
        }

        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn num(name: &str, values: Vec<Option<f64>>) -> RawColumn {
        RawColumn::Numeric {
            name: name.to_string(),
            values,
        }
    }

    fn text(name: &str, values: Vec<Option<&str>>) -> RawColumn {
        RawColumn::Text {
            name: name.to_string(),
            values: values.into_iter().map(|v| v.map(str::to_string)).collect(),
        }
    }

    #[test]
    fn test_numeric_stage_median_impute_and_scale() {
        let cols = vec![num("x", vec![Some(1.0), None, Some(3.0), Some(5.0)])];
        let built = Preprocessor::fit(&cols);
        let stage = &built.preprocessor.numeric[0];
        assert_eq!(stage.median, 3.0);
        // imputed training values: 1, 3, 3, 5 -> mean 3, pop std sqrt(2)
        assert_eq!(stage.mean, 3.0);
        assert!((stage.scale - 2.0_f64.sqrt()).abs() < 1e-12);

        let matrix = built.preprocessor.transform(&cols).unwrap();
        assert!((matrix[1][0] - 0.0).abs() < 1e-12); // null -> median -> 0 after centering
    }

    #[test]
    fn test_zero_variance_column_scales_by_one() {
        let cols = vec![num("x", vec![Some(7.0), Some(7.0), Some(7.0)])];
        let built = Preprocessor::fit(&cols);
        assert_eq!(built.preprocessor.numeric[0].scale, 1.0);
        let matrix = built.preprocessor.transform(&cols).unwrap();
        for row in matrix {
            assert_eq!(row, vec![0.0]);
        }
    }

    #[test]
    fn test_text_column_coerces_when_mostly_numeric() {
        let values: Vec<Option<&str>> = vec![Some("$1,000"), Some("2000"), Some("3000")];
        let built = Preprocessor::fit(&[text("price", values)]);
        assert_eq!(built.numeric_columns, vec!["price".to_string()]);
        assert!(built.categorical_columns.is_empty());
    }

    #[test]
    fn test_text_column_stays_categorical_below_threshold() {
        // 2 of 3 parse: 0.667 < 0.98
        let values: Vec<Option<&str>> = vec![Some("1"), Some("2"), Some("red")];
        let built = Preprocessor::fit(&[text("c", values)]);
        assert_eq!(built.categorical_columns, vec!["c".to_string()]);
    }

    #[test]
    fn test_mode_tie_breaks_lexicographically() {
        let values: Vec<Option<&str>> = vec![Some("b"), Some("a"), Some("b"), Some("a"), None];
        let built = Preprocessor::fit(&[text("c", values)]);
        assert_eq!(built.preprocessor.categorical[0].mode, "a");
    }

    #[test]
    fn test_one_hot_sorted_and_unseen_encodes_zero() {
        let train = vec![text("c", vec![Some("red"), Some("blue"), Some("red")])];
        let built = Preprocessor::fit(&train);
        let stage = &built.preprocessor.categorical[0];
        assert_eq!(stage.categories, vec!["blue".to_string(), "red".to_string()]);

        let eval = vec![text("c", vec![Some("red"), Some("green"), None])];
        let matrix = built.preprocessor.transform(&eval).unwrap();
        assert_eq!(matrix[0], vec![0.0, 1.0]); // red
        assert_eq!(matrix[1], vec![0.0, 0.0]); // unseen
        assert_eq!(matrix[2], vec![0.0, 1.0]); // null -> mode "red"
    }

    #[test]
    fn test_high_cardinality_categorical_dropped() {
        let values: Vec<Option<String>> = (0..81).map(|i| Some(format!("id_{i}"))).collect();
        let col = RawColumn::Text {
            name: "id".to_string(),
            values,
        };
        let built = Preprocessor::fit(&[col]);
        assert_eq!(built.dropped_categorical, vec!["id".to_string()]);
        assert!(built.categorical_columns.is_empty());
        assert_eq!(built.preprocessor.output_width(), 0);
    }

    #[test]
    fn test_transform_missing_column_errors() {
        let built = Preprocessor::fit(&[num("x", vec![Some(1.0), Some(2.0)])]);
        let err = built
            .preprocessor
            .transform(&[num("other", vec![Some(1.0)])])
            .unwrap_err();
        match err {
            EngineError::MissingFeatureColumns { missing } => {
                assert_eq!(missing, vec!["x".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_block_order_numeric_then_categorical() {
        let cols = vec![
            text("c", vec![Some("a"), Some("b")]),
            num("x", vec![Some(0.0), Some(2.0)]),
        ];
        let built = Preprocessor::fit(&cols);
        let matrix = built.preprocessor.transform(&cols).unwrap();
        // width: 1 numeric + 2 one-hot
        assert_eq!(matrix[0].len(), 3);
        // numeric block comes first even though "c" precedes "x" in input
        assert_eq!(matrix[0][1..], [1.0, 0.0]);
        assert_eq!(matrix[1][1..], [0.0, 1.0]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let cols = vec![
            num("x", vec![Some(1.0), Some(2.0), None]),
            text("c", vec![Some("a"), None, Some("b")]),
        ];
        let built = Preprocessor::fit(&cols);
        let json = serde_json::to_string(&built.preprocessor).unwrap();
        let back: Preprocessor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, built.preprocessor);
        assert_eq!(
            back.transform(&cols).unwrap(),
            built.preprocessor.transform(&cols).unwrap()
        );
    }
}
