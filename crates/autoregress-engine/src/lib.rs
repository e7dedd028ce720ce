//! CSV Regression AutoML Engine
//!
//! An automated regression pipeline built on Polars and smartcore: point it
//! at a CSV and a target column and it loads and cleans the data, builds a
//! preprocessing pipeline, races a fixed roster of five candidate models, and
//! persists the winner as a reloadable run directory. A second entry point
//! evaluates a saved run against new CSVs.
//!
//! # Overview
//!
//! - **Dataset loading**: dirty-CSV tolerant reading, empty row/column
//!   removal, numeric target coercion with row-level fallout reporting
//! - **Preprocessing**: numeric-text coercion, median imputation, standard
//!   scaling, most-frequent imputation and one-hot encoding
//! - **Model selection**: five fixed candidates scored on a deterministic
//!   validation split, strictly-better R² wins
//! - **Artifacts**: every run is a self-contained directory with the model
//!   bundle, schema, metrics, predictions and plots
//! - **Event protocol**: workers report progress as JSON lines on stdout for
//!   a supervising controller
//! - **History**: evaluation runs are remembered in a pin-aware, capped store
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use autoregress_engine::events::StdoutSink;
//! use autoregress_engine::train::{TrainRequest, run_training};
//!
//! let request = TrainRequest::new("data/houses.csv", "price");
//! let outcome = run_training(&request, &StdoutSink::new())?;
//! println!("best: {} (R²={:.3})", outcome.best_model, outcome.best_r2);
//! ```

pub mod artifact;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod events;
pub mod history;
pub mod metrics;
pub mod models;
pub mod paths;
pub mod plots;
pub mod preprocess;
pub mod schema;
pub mod split;
pub mod train;
pub mod utils;

// Re-exports for convenient access
pub use artifact::{ModelArtifact, TrainingMetrics};
pub use error::{EngineError, Result};
pub use eval::{EvalOutcome, EvalRequest, EvalSummary, run_evaluation};
pub use events::{CollectingSink, Event, EventSink, LogLevel, MetricSet, RunOutcome, StdoutSink};
pub use history::{HistoryItem, HistoryStore};
pub use models::{CandidateKind, CandidateRoster, CandidateSpec};
pub use schema::Schema;
pub use train::{TrainOutcome, TrainRequest, run_training};

/// Initialize stderr tracing for a worker process.
///
/// Stdout belongs to the event protocol, so diagnostics must go to stderr.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_worker_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
