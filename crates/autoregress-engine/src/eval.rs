//! The evaluation run: load a saved model, score a new CSV and persist an
//! evaluation directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::info;

use crate::artifact::{ModelArtifact, PLOTS_DIR, SCHEMA_FILE, check_run_dir};
use crate::dataset::{coerce_numeric, column_to_raw, read_table, validate_csv_path};
use crate::error::{EngineError, Result};
use crate::events::{Event, EventSink, MetricSet, RunOutcome};
use crate::metrics::{mean_absolute_error, r2_score, root_mean_squared_error};
use crate::paths::runs_dir;
use crate::plots::render_evaluation_plots;
use crate::schema::{Schema, local_timestamp, run_id};
use crate::utils::write_json_atomic;

pub const DEFAULT_MAX_ROWS: usize = 100;

/// Filename of the per-evaluation summary inside the eval directory.
pub const EVAL_METRICS_FILE: &str = "eval_metrics.json";
pub const EVAL_PREDICTIONS_FILE: &str = "eval_predictions.csv";

/// Inputs of one evaluation run.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub model_dir: PathBuf,
    pub csv_path: PathBuf,
    /// Row cap; larger datasets evaluate only their head.
    pub max_rows: usize,
    pub runs_root: Option<PathBuf>,
}

impl EvalRequest {
    pub fn new(model_dir: impl Into<PathBuf>, csv_path: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            csv_path: csv_path.into(),
            max_rows: DEFAULT_MAX_ROWS,
            runs_root: None,
        }
    }
}

/// The `eval_metrics.json` record, also the source for history entries.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvalSummary {
    pub model_dir: PathBuf,
    pub csv_path: PathBuf,
    pub target: Option<String>,
    pub target_present: bool,
    pub n_rows: usize,
    pub created_at: String,
    pub metrics: MetricSet,
}

/// What a successful evaluation run produced.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub run_dir: PathBuf,
    pub target_present: bool,
    pub n_rows: usize,
    pub metrics: MetricSet,
    pub seconds: f64,
}

fn write_eval_predictions(dir: &Path, y_true: Option<&[f64]>, y_pred: &[f64]) -> Result<()> {
    let mut out = Vec::with_capacity(y_pred.len() * 16 + 16);
    match y_true {
        Some(y_true) => {
            writeln!(out, "y_true,y_pred")?;
            for (t, p) in y_true.iter().zip(y_pred) {
                writeln!(out, "{t},{p}")?;
            }
        }
        None => {
            writeln!(out, "y_pred")?;
            for p in y_pred {
                writeln!(out, "{p}")?;
            }
        }
    }
    fs::write(dir.join(EVAL_PREDICTIONS_FILE), out)?;
    Ok(())
}

/// Execute an evaluation run, reporting progress through `sink`.
///
/// Event contract matches [`crate::train::run_training`]: success emits
/// everything including `run_finished`, errors are left to the caller.
pub fn run_evaluation(req: &EvalRequest, sink: &dyn EventSink) -> Result<EvalOutcome> {
    let start_all = Instant::now();

    check_run_dir(&req.model_dir)?;
    sink.emit(&Event::info("Loading model + schema"));
    let artifact = ModelArtifact::load(&req.model_dir)?;
    let schema_path = req.model_dir.join(SCHEMA_FILE);
    let schema = Schema::load(&schema_path)?;

    if schema.feature_columns.is_empty() {
        return Err(EngineError::ArtifactLoad {
            path: schema_path,
            message: "schema has no feature_columns".to_string(),
        });
    }
    let target = Some(schema.target.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let csv_path = validate_csv_path(&req.csv_path)?;
    sink.emit(&Event::info("Loading dataset"));
    let mut df = read_table(&csv_path)?;

    if df.height() > req.max_rows {
        sink.emit(&Event::warn(format!(
            "Dataset has {} rows; evaluating only first {} rows.",
            df.height(),
            req.max_rows
        )));
        df = df.slice(0, req.max_rows);
    }

    let missing: Vec<String> = schema
        .feature_columns
        .iter()
        .filter(|name| df.column(name).is_err())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::MissingFeatureColumns { missing });
    }

    let mut features = schema
        .feature_columns
        .iter()
        .map(|name| column_to_raw(df.column(name)?))
        .collect::<Result<Vec<_>>>()?;

    let mut y_true: Option<Vec<f64>> = None;
    if let Some(target) = &target
        && let Ok(col) = df.column(target)
    {
        let coerced = coerce_numeric(col.as_materialized_series())?;
        let bad = coerced.iter().filter(|v| v.is_none()).count();
        if bad > 0 {
            sink.emit(&Event::warn(format!(
                "Target has {bad} non-numeric values; dropping those rows."
            )));
            let keep: Vec<usize> = coerced
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|_| i))
                .collect();
            features = features
                .iter()
                .map(|c| crate::preprocess::take_rows(c, &keep))
                .collect();
        }
        y_true = Some(coerced.into_iter().flatten().collect());
    }

    let n_rows = features.first().map_or(0, |c| c.len());

    let runs_root = match &req.runs_root {
        Some(root) => {
            fs::create_dir_all(root)?;
            root.clone()
        }
        None => runs_dir()?,
    };
    let run_dir = runs_root.join(format!("eval_{}", run_id()));
    let plots_dir = run_dir.join(PLOTS_DIR);
    fs::create_dir_all(&plots_dir)?;

    sink.emit(&Event::RunStarted {
        run_dir: run_dir.display().to_string(),
    });

    sink.emit(&Event::info("Running predictions"));
    let y_pred = artifact.predict(&features)?;

    let metrics = match &y_true {
        Some(y_true) => MetricSet::scored(
            r2_score(y_true, &y_pred),
            mean_absolute_error(y_true, &y_pred),
            root_mean_squared_error(y_true, &y_pred),
        ),
        None => MetricSet::absent(),
    };

    let summary = EvalSummary {
        model_dir: req.model_dir.clone(),
        csv_path,
        target,
        target_present: y_true.is_some(),
        n_rows,
        created_at: local_timestamp(),
        metrics,
    };
    write_json_atomic(&run_dir.join(EVAL_METRICS_FILE), &summary)?;
    write_eval_predictions(&run_dir, y_true.as_deref(), &y_pred)?;

    if let Err(e) = render_evaluation_plots(&plots_dir, y_true.as_deref(), &y_pred) {
        sink.emit(&Event::warn(format!("Plot generation failed: {e}")));
    }
    info!(n_rows, target_present = y_true.is_some(), "evaluation complete");

    let seconds = start_all.elapsed().as_secs_f64();
    sink.emit(&Event::RunFinished {
        run_dir: run_dir.display().to_string(),
        outcome: RunOutcome::Evaluation {
            target_present: y_true.is_some(),
            n_rows,
            metrics,
        },
        seconds,
    });

    Ok(EvalOutcome {
        run_dir,
        target_present: y_true.is_some(),
        n_rows,
        metrics,
        seconds,
    })
}
