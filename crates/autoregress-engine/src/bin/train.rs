//! Training worker: fits the candidate roster on a CSV and writes a run
//! directory, reporting progress as JSON lines on stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use autoregress_engine::events::{Event, EventSink, StdoutSink};
use autoregress_engine::train::{DEFAULT_SEED, DEFAULT_TEST_SIZE, TrainRequest, run_training};

#[derive(Debug, Parser)]
#[command(name = "autoregress-train", about = "Train regression models on a CSV")]
struct Args {
    /// Path to the training CSV
    #[arg(long)]
    csv: PathBuf,

    /// Name of the target column
    #[arg(long)]
    target: String,

    /// Seed for the train/validation split
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Fraction of rows held out for validation
    #[arg(long, default_value_t = DEFAULT_TEST_SIZE)]
    test_size: f64,
}

fn main() -> ExitCode {
    autoregress_engine::init_worker_tracing();
    let args = Args::parse();

    let request = TrainRequest {
        csv_path: args.csv,
        target: args.target,
        seed: args.seed,
        test_size: args.test_size,
        runs_root: None,
    };

    let sink = StdoutSink::new();
    match run_training(&request, &sink) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            sink.emit(&Event::Error {
                message: e.to_string(),
            });
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
