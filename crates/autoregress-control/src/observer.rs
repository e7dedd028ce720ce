//! Run outcome classification.
//!
//! A worker's exit code alone is not enough to call a run successful: a
//! killed process can exit 0 on some platforms, and a crash after
//! `run_started` leaves a half-written run directory. The observer folds the
//! event stream, stderr and the exit report into a single end state, and only
//! reports success when it saw a terminal `run_finished` event *and* a clean
//! exit.

use autoregress_engine::events::{Event, RunOutcome};
use autoregress_engine::history::{DEFAULT_KEEP, HistoryItem, HistoryStore};
use std::path::Path;

use crate::supervisor::ExitReport;

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEndState {
    /// `run_finished` was observed and the worker exited cleanly.
    Completed { run_dir: String, outcome: RunOutcome },
    /// The controller requested cancellation.
    Canceled { run_dir: Option<String> },
    /// Anything else: error event, dirty exit, or exit without a terminal
    /// event.
    Failed {
        run_dir: Option<String>,
        message: String,
    },
}

/// Folds worker output into a [`RunEndState`].
#[derive(Debug, Default)]
pub struct RunObserver {
    run_dir: Option<String>,
    finished: Option<(String, RunOutcome)>,
    error_message: Option<String>,
    last_stderr: Option<String>,
}

impl RunObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one protocol event.
    pub fn observe(&mut self, event: &Event) {
        match event {
            Event::RunStarted { run_dir } => self.run_dir = Some(run_dir.clone()),
            Event::RunFinished {
                run_dir, outcome, ..
            } => {
                self.run_dir = Some(run_dir.clone());
                self.finished = Some((run_dir.clone(), outcome.clone()));
            }
            Event::Error { message } => self.error_message = Some(message.clone()),
            _ => {}
        }
    }

    /// Record one stderr line; the last one seen becomes the fallback
    /// failure message.
    pub fn observe_stderr(&mut self, line: &str) {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            self.last_stderr = Some(trimmed.to_string());
        }
    }

    /// The run directory, once the worker has announced it.
    pub fn run_dir(&self) -> Option<&str> {
        self.run_dir.as_deref()
    }

    /// Classify the run after the worker has exited.
    pub fn finish(self, exit: &ExitReport) -> RunEndState {
        if exit.canceled {
            return RunEndState::Canceled {
                run_dir: self.run_dir,
            };
        }
        if exit.success
            && let Some((run_dir, outcome)) = self.finished
        {
            return RunEndState::Completed { run_dir, outcome };
        }
        let message = self
            .error_message
            .or(self.last_stderr)
            .unwrap_or_else(|| match exit.code {
                Some(code) => format!("worker exited with code {code} without finishing"),
                None => "worker terminated by signal".to_string(),
            });
        RunEndState::Failed {
            run_dir: self.run_dir,
            message,
        }
    }
}

/// Record a completed evaluation run in the history store.
///
/// Training completions and non-completed runs are left alone; only a
/// finished evaluation produces a history entry.
pub fn promote_completed_evaluation(
    store: &HistoryStore,
    end: &RunEndState,
) -> crate::error::Result<Option<Vec<HistoryItem>>> {
    if let RunEndState::Completed {
        run_dir,
        outcome: RunOutcome::Evaluation { .. },
    } = end
    {
        let items = store.add_from_run_dir(Path::new(run_dir), DEFAULT_KEEP)?;
        return Ok(Some(items));
    }
    Ok(None)
}
