//! Dataset loading and target coercion.
//!
//! Loads dirty real-world CSVs into a column-oriented in-memory table, drops
//! fully empty rows and columns, and coerces the regression target to finite
//! numbers. Feature columns keep their raw form here; type coercion and
//! encoding happen later in [`crate::preprocess`].

use std::path::{Path, PathBuf};

use polars::io::csv::read::{CsvParseOptions, CsvReadOptions};
use polars::prelude::*;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Cap on distinct raw values quoted in a non-numeric-target error.
const TARGET_EXAMPLE_CAP: usize = 5;

/// A raw feature column as it came out of the CSV.
#[derive(Debug, Clone, PartialEq)]
pub enum RawColumn {
    /// Parsed by the CSV reader as a numeric dtype.
    Numeric {
        name: String,
        values: Vec<Option<f64>>,
    },
    /// Everything else, kept as strings for later coercion or encoding.
    Text {
        name: String,
        values: Vec<Option<String>>,
    },
}

impl RawColumn {
    pub fn name(&self) -> &str {
        match self {
            RawColumn::Numeric { name, .. } | RawColumn::Text { name, .. } => name,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawColumn::Numeric { values, .. } => values.len(),
            RawColumn::Text { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all_null(&self) -> bool {
        match self {
            RawColumn::Numeric { values, .. } => values.iter().all(Option::is_none),
            RawColumn::Text { values, .. } => values.iter().all(Option::is_none),
        }
    }
}

/// A loaded training table: coerced target plus raw feature columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub csv_path: PathBuf,
    pub target: String,
    /// Target values, one per surviving row.
    pub y: Vec<f64>,
    /// Feature columns, CSV order, each the same length as `y`.
    pub features: Vec<RawColumn>,
    /// Rows remaining after cleaning.
    pub n_rows: usize,
    /// Columns remaining including the target.
    pub n_cols: usize,
    /// Source dtype per surviving column, as reported by the CSV reader.
    pub dtypes: Vec<(String, String)>,
    /// Rows dropped because the target failed numeric coercion.
    pub dropped_target_rows: usize,
}

/// Check that a path points at an existing `.csv` file and resolve it.
pub fn validate_csv_path(path: &Path) -> Result<PathBuf> {
    let invalid = || EngineError::InvalidCsvPath {
        path: path.to_path_buf(),
    };
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !path.is_file() || !is_csv {
        return Err(invalid());
    }
    path.canonicalize().map_err(|_| invalid())
}

/// Load a CSV with fallback strategies, then drop rows where every cell is
/// null.
///
/// The path must already be validated. Parse failures map to a validation
/// error since the usual cause is a malformed or non-CSV file.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let df = load_csv_with_fallbacks(path).map_err(|e| EngineError::CsvParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    drop_empty_rows(df)
}

fn load_csv_with_fallbacks(path: &Path) -> PolarsResult<DataFrame> {
    // Strategy 1: standard loading with quote handling.
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => debug!("standard CSV loading failed: {e}"),
    }

    // Strategy 2: without quote handling.
    CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(None))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
}

fn drop_empty_rows(df: DataFrame) -> Result<DataFrame> {
    if df.width() == 0 || df.height() == 0 {
        return Ok(df);
    }
    let mut any_present: Option<BooleanChunked> = None;
    for col in df.get_columns() {
        let present = col.as_materialized_series().is_not_null();
        any_present = Some(match any_present {
            Some(acc) => &acc | &present,
            None => present,
        });
    }
    match any_present {
        Some(mask) => Ok(df.filter(&mask)?),
        None => Ok(df),
    }
}

/// Coerce one series to finite numbers, cell by cell.
///
/// Numeric dtypes cast directly; string cells get a plain trimmed parse.
/// Formatting-aware cleaning is reserved for feature columns; a target
/// column full of currency strings should be rejected loudly, not silently
/// reinterpreted.
pub fn coerce_numeric(series: &Series) -> Result<Vec<Option<f64>>> {
    if series.dtype().is_primitive_numeric() || series.dtype() == &DataType::Boolean {
        let casted = series.cast(&DataType::Float64)?;
        return Ok(casted
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect());
    }
    let casted = series.cast(&DataType::String)?;
    Ok(casted
        .str()?
        .into_iter()
        .map(|v| {
            v.and_then(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|x| x.is_finite())
            })
        })
        .collect())
}

/// Extract a column in raw form, preserving its CSV-reader dtype class.
pub fn column_to_raw(col: &Column) -> Result<RawColumn> {
    let series = col.as_materialized_series();
    let name = series.name().to_string();
    if series.dtype().is_primitive_numeric() || series.dtype() == &DataType::Boolean {
        let values = coerce_numeric(series)?;
        Ok(RawColumn::Numeric { name, values })
    } else {
        let casted = series.cast(&DataType::String)?;
        let values = casted
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect();
        Ok(RawColumn::Text { name, values })
    }
}

/// Distinct non-null raw values of a series, in first-seen order, capped.
fn distinct_examples(series: &Series, cap: usize) -> Vec<String> {
    let mut seen = Vec::new();
    let Ok(casted) = series.cast(&DataType::String) else {
        return seen;
    };
    let Ok(chunked) = casted.str() else {
        return seen;
    };
    for value in chunked.into_iter().flatten() {
        if !seen.iter().any(|s| s == value) {
            seen.push(value.to_string());
            if seen.len() >= cap {
                break;
            }
        }
    }
    seen
}

impl Dataset {
    /// Load a training dataset: validate the path, read the table, coerce the
    /// target, and drop rows whose target failed coercion plus columns that
    /// are entirely empty.
    pub fn load(csv_path: &Path, target: &str) -> Result<Self> {
        let csv_path = validate_csv_path(csv_path)?;
        let df = read_table(&csv_path)?;
        Self::from_table(df, csv_path, target)
    }

    /// Same as [`Dataset::load`] but starting from an already-read table.
    pub fn from_table(df: DataFrame, csv_path: PathBuf, target: &str) -> Result<Self> {
        let target_col = df
            .column(target)
            .map_err(|_| EngineError::TargetNotFound {
                target: target.to_string(),
            })?
            .clone();
        let target_series = target_col.as_materialized_series();

        let y_opt = coerce_numeric(target_series)?;
        if y_opt.iter().all(Option::is_none) {
            return Err(EngineError::NonNumericTarget {
                target: target.to_string(),
                examples: distinct_examples(target_series, TARGET_EXAMPLE_CAP),
            });
        }

        let dropped_target_rows = y_opt.iter().filter(|v| v.is_none()).count();
        let keep: BooleanChunked = y_opt
            .iter()
            .map(|v| Some(v.is_some()))
            .collect::<ChunkedArray<BooleanType>>();
        let df = if dropped_target_rows > 0 {
            df.filter(&keep)?
        } else {
            df
        };
        let y: Vec<f64> = y_opt.into_iter().flatten().collect();

        let mut features = Vec::new();
        let mut dtypes = Vec::new();
        for col in df.get_columns() {
            let series = col.as_materialized_series();
            let name = series.name().to_string();
            let dtype = series.dtype().to_string();
            if name == target {
                dtypes.push((name, dtype));
                continue;
            }
            let raw = column_to_raw(col)?;
            // Columns with no data at all carry no signal.
            if raw.all_null() {
                debug!("dropping empty column '{name}'");
                continue;
            }
            dtypes.push((name, dtype));
            features.push(raw);
        }

        if features.is_empty() {
            return Err(EngineError::NoFeatureColumns);
        }

        let n_rows = y.len();
        let n_cols = features.len() + 1;
        Ok(Self {
            csv_path,
            target: target.to_string(),
            y,
            features,
            n_rows,
            n_cols,
            dtypes,
            dropped_target_rows,
        })
    }
}
