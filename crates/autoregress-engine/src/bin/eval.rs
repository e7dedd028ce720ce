//! Evaluation worker: scores a saved run directory against a new CSV,
//! reporting progress as JSON lines on stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use autoregress_engine::eval::{DEFAULT_MAX_ROWS, EvalRequest, run_evaluation};
use autoregress_engine::events::{Event, EventSink, StdoutSink};

#[derive(Debug, Parser)]
#[command(name = "autoregress-eval", about = "Evaluate a saved model on a CSV")]
struct Args {
    /// Run directory holding model.json and schema.json
    #[arg(long)]
    model_dir: PathBuf,

    /// Path to the evaluation CSV
    #[arg(long)]
    csv: PathBuf,

    /// Evaluate at most this many rows
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
    max_rows: usize,
}

fn main() -> ExitCode {
    autoregress_engine::init_worker_tracing();
    let args = Args::parse();

    let request = EvalRequest {
        model_dir: args.model_dir,
        csv_path: args.csv,
        max_rows: args.max_rows,
        runs_root: None,
    };

    let sink = StdoutSink::new();
    match run_evaluation(&request, &sink) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            sink.emit(&Event::Error {
                message: e.to_string(),
            });
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
