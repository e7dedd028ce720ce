//! The training run: load, split, fit five candidates, pick a winner and
//! persist the run directory.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::time::Instant;

use tracing::info;

use crate::artifact::{ModelArtifact, PLOTS_DIR, TrainingMetrics, write_val_predictions};
use crate::dataset::{Dataset, read_table, validate_csv_path};
use crate::error::{EngineError, Result};
use crate::events::{Event, EventSink, RunOutcome};
use crate::metrics::{ModelScore, mean_absolute_error, r2_score, root_mean_squared_error};
use crate::models::{CandidateRoster, CandidateSpec, FittedEstimator, fit_candidate};
use crate::paths::runs_dir;
use crate::plots::render_training_plots;
use crate::preprocess::{Preprocessor, take_rows};
use crate::schema::{Schema, local_timestamp, run_id};
use crate::split::train_val_split;
use crate::utils::list_preview;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// Inputs of one training run.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub csv_path: PathBuf,
    pub target: String,
    pub seed: u64,
    pub test_size: f64,
    /// Where to create the run directory; defaults to the shared runs dir.
    pub runs_root: Option<PathBuf>,
}

impl TrainRequest {
    pub fn new(csv_path: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            csv_path: csv_path.into(),
            target: target.into(),
            seed: DEFAULT_SEED,
            test_size: DEFAULT_TEST_SIZE,
            runs_root: None,
        }
    }
}

/// What a successful training run produced.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub run_dir: PathBuf,
    pub best_model: String,
    pub best_r2: f64,
    pub seconds: f64,
}

fn fit_and_score(
    spec: &CandidateSpec,
    x_train: &[Vec<f64>],
    y_train: &[f64],
    x_val: &[Vec<f64>],
) -> Result<(FittedEstimator, Vec<f64>)> {
    // Candidate failures, including panics deep inside an estimator, must not
    // take down the run while other candidates can still compete.
    let result = catch_unwind(AssertUnwindSafe(|| {
        let model = fit_candidate(spec, x_train, y_train)?;
        let preds = model.predict(x_val)?;
        Ok((model, preds))
    }));
    match result {
        Ok(inner) => inner,
        Err(_) => Err(EngineError::Estimator {
            name: spec.name.to_string(),
            message: "estimator panicked".to_string(),
        }),
    }
}

/// Execute a training run, reporting progress through `sink`.
///
/// Emits every protocol event for a successful run, `run_finished` included.
/// On `Err` the terminal `error` event is the caller's job so the exit code
/// and the event stay paired in one place.
pub fn run_training(req: &TrainRequest, sink: &dyn EventSink) -> Result<TrainOutcome> {
    let start_all = Instant::now();

    let csv_path = validate_csv_path(&req.csv_path)?;
    sink.emit(&Event::info("Loading dataset"));
    let table = read_table(&csv_path)?;
    let dataset = Dataset::from_table(table, csv_path, &req.target)?;

    if dataset.dropped_target_rows > 0 {
        sink.emit(&Event::warn(format!(
            "Target contains {} non-numeric values; dropping those rows.",
            dataset.dropped_target_rows
        )));
    }
    if dataset.n_rows < 2 {
        return Err(EngineError::TooFewRows {
            n_rows: dataset.n_rows,
        });
    }

    sink.emit(&Event::info(format!(
        "Splitting data (test_size={:.2}, seed={})",
        req.test_size, req.seed
    )));
    let split = train_val_split(dataset.n_rows, req.test_size, req.seed);

    let train_columns: Vec<_> = dataset
        .features
        .iter()
        .map(|c| take_rows(c, &split.train))
        .collect();
    let val_columns: Vec<_> = dataset
        .features
        .iter()
        .map(|c| take_rows(c, &split.validation))
        .collect();
    let y_train: Vec<f64> = split.train.iter().map(|&i| dataset.y[i]).collect();
    let y_val: Vec<f64> = split.validation.iter().map(|&i| dataset.y[i]).collect();

    let built = Preprocessor::fit(&train_columns);
    if !built.dropped_categorical.is_empty() {
        sink.emit(&Event::warn(format!(
            "Dropping high-cardinality categorical columns: {}",
            list_preview(&built.dropped_categorical, 8)
        )));
    }
    sink.emit(&Event::info(format!(
        "Features: {} columns (numeric={}, categorical={})",
        dataset.features.len(),
        built.numeric_columns.len(),
        built.categorical_columns.len()
    )));

    let runs_root = match &req.runs_root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            root.clone()
        }
        None => runs_dir()?,
    };
    let run_dir = runs_root.join(run_id());
    let plots_dir = run_dir.join(PLOTS_DIR);
    std::fs::create_dir_all(&plots_dir)?;

    sink.emit(&Event::RunStarted {
        run_dir: run_dir.display().to_string(),
    });

    let schema = Schema {
        csv_path: dataset.csv_path.clone(),
        target: dataset.target.clone(),
        n_rows: dataset.n_rows,
        n_cols: dataset.n_cols,
        feature_columns: dataset.features.iter().map(|c| c.name().to_string()).collect(),
        numeric_columns: built.numeric_columns.clone(),
        categorical_columns: built.categorical_columns.clone(),
        dtypes: dataset.dtypes.iter().cloned().collect(),
        seed: req.seed,
        test_size: req.test_size,
        created_at: local_timestamp(),
    };
    schema.save(&run_dir.join(crate::artifact::SCHEMA_FILE))?;

    let x_train = built.preprocessor.transform(&train_columns)?;
    let x_val = built.preprocessor.transform(&val_columns)?;

    let mut scores: Vec<(String, ModelScore)> = Vec::new();
    let mut best: Option<(String, f64, FittedEstimator, Vec<f64>)> = None;

    for spec in CandidateRoster::current().candidates {
        sink.emit(&Event::ModelStarted {
            name: spec.name.to_string(),
        });
        sink.emit(&Event::info(format!("Training {}", spec.name)));

        let t0 = Instant::now();
        let (model, preds) = match fit_and_score(spec, &x_train, &y_train, &x_val) {
            Ok(pair) => pair,
            Err(e) => {
                sink.emit(&Event::error_log(format!("{} failed: {e}", spec.name)));
                continue;
            }
        };
        let seconds = t0.elapsed().as_secs_f64();

        let score = ModelScore {
            r2: r2_score(&y_val, &preds),
            mae: mean_absolute_error(&y_val, &preds),
            rmse: root_mean_squared_error(&y_val, &preds),
            seconds,
        };
        scores.push((spec.name.to_string(), score));
        sink.emit(&Event::ModelFinished {
            name: spec.name.to_string(),
            r2: score.r2,
            mae: score.mae,
            rmse: score.rmse,
            seconds,
        });

        // Strictly greater keeps the earlier candidate on a tie.
        if best.as_ref().is_none_or(|(_, r2, _, _)| score.r2 > *r2) {
            best = Some((spec.name.to_string(), score.r2, model, preds));
        }
    }

    let Some((best_model, best_r2, estimator, best_preds)) = best else {
        return Err(EngineError::AllModelsFailed);
    };

    sink.emit(&Event::success(format!(
        "Best model: {best_model} (R²={best_r2:.3})"
    )));
    info!(best_model = %best_model, best_r2, "training complete");

    let artifact = ModelArtifact::new(best_model.clone(), built.preprocessor, estimator);
    artifact.save(&run_dir)?;

    let metrics = TrainingMetrics {
        best_model: best_model.clone(),
        best_r2,
        per_model: scores
            .iter()
            .cloned()
            .collect::<BTreeMap<String, ModelScore>>(),
    };
    metrics.save(&run_dir)?;

    write_val_predictions(&run_dir, &y_val, &best_preds)?;

    if let Err(e) = render_training_plots(&plots_dir, &scores, &best_model, &y_val, &best_preds) {
        sink.emit(&Event::warn(format!("Plot generation failed: {e}")));
    }

    let seconds = start_all.elapsed().as_secs_f64();
    sink.emit(&Event::RunFinished {
        run_dir: run_dir.display().to_string(),
        outcome: RunOutcome::Training {
            best_model: best_model.clone(),
            best_r2,
        },
        seconds,
    });

    Ok(TrainOutcome {
        run_dir,
        best_model,
        best_r2,
        seconds,
    })
}
