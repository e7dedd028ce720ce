//! Spawning and supervising worker processes.
//!
//! A worker is one of the engine binaries run as a child process. The
//! supervisor wires its stdout through the protocol decoder, forwards stderr
//! lines as diagnostics, supports cooperative kill-based cancellation, and
//! always delivers a final [`WorkerMessage::Exited`] report.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use autoregress_engine::events::Event;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Notify, mpsc};
use tracing::debug;

use crate::decode::{LineDecoder, parse_event};
use crate::error::{ControlError, Result};
use crate::observer::{RunEndState, RunObserver};

/// What to run and how.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Exit summary of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    /// Whether the exit followed a cancellation request.
    pub canceled: bool,
}

/// One message out of a supervised worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// A decoded protocol event from stdout.
    Event(Event),
    /// One line of stderr.
    Stderr(String),
    /// The process has exited. Always the last message of its kind, though
    /// late stdout/stderr lines may still follow on the channel.
    Exited(ExitReport),
}

/// Cancellation handle for a running worker. Cheap to clone; all clones
/// control the same process.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    cancel: Arc<Notify>,
    canceled: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

static_assertions::assert_impl_all!(WorkerHandle: Send, Sync);

impl WorkerHandle {
    /// Request cancellation: the worker is killed and its run reported as
    /// canceled. Idempotent.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.cancel.notify_one();
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Whether the process has exited.
    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// A spawned worker: its message stream plus the control handle.
#[derive(Debug)]
pub struct Worker {
    pub handle: WorkerHandle,
    pub messages: mpsc::UnboundedReceiver<WorkerMessage>,
}

/// Spawn a worker process and start pumping its output.
pub fn spawn_worker(spec: &WorkerSpec) -> Result<Worker> {
    let program = spec.program.display().to_string();
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ControlError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().ok_or(ControlError::MissingPipe {
        program: program.clone(),
        stream: "stdout",
    })?;
    let stderr = child.stderr.take().ok_or(ControlError::MissingPipe {
        program: program.clone(),
        stream: "stderr",
    })?;

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = Arc::new(Notify::new());
    let canceled = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));

    // stdout pump: raw chunks through the line decoder.
    let stdout_tx = tx.clone();
    tokio::spawn(async move {
        let mut stdout = stdout;
        let mut decoder = LineDecoder::new();
        let mut chunk = [0u8; 8192];
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    for line in decoder.push(&chunk[..n]) {
                        if let Some(event) = parse_event(&line) {
                            let _ = stdout_tx.send(WorkerMessage::Event(event));
                        }
                    }
                }
            }
        }
        if let Some(line) = decoder.finish()
            && let Some(event) = parse_event(&line)
        {
            let _ = stdout_tx.send(WorkerMessage::Event(event));
        }
    });

    // stderr pump: line-buffered diagnostics.
    let stderr_tx = tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = stderr_tx.send(WorkerMessage::Stderr(line));
        }
    });

    // wait/cancel task: owns the child for its whole life.
    let wait_cancel = Arc::clone(&cancel);
    let wait_canceled = Arc::clone(&canceled);
    let wait_done = Arc::clone(&done);
    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = wait_cancel.notified() => {
                debug!("cancellation requested; killing worker");
                let _ = child.start_kill();
                child.wait().await
            }
        };
        let report = match status {
            Ok(status) => ExitReport {
                code: status.code(),
                success: status.success(),
                canceled: wait_canceled.load(Ordering::SeqCst),
            },
            Err(_) => ExitReport {
                code: None,
                success: false,
                canceled: wait_canceled.load(Ordering::SeqCst),
            },
        };
        wait_done.store(true, Ordering::SeqCst);
        let _ = tx.send(WorkerMessage::Exited(report));
    });

    Ok(Worker {
        handle: WorkerHandle {
            cancel,
            canceled,
            done,
        },
        messages: rx,
    })
}

/// Drain a worker to completion, forwarding each protocol event to
/// `on_event`, and classify how the run ended.
pub async fn drive_worker<F>(worker: &mut Worker, mut on_event: F) -> RunEndState
where
    F: FnMut(&Event),
{
    let mut observer = RunObserver::new();
    let mut exit = None;
    while let Some(message) = worker.messages.recv().await {
        match message {
            WorkerMessage::Event(event) => {
                observer.observe(&event);
                on_event(&event);
            }
            WorkerMessage::Stderr(line) => observer.observe_stderr(&line),
            WorkerMessage::Exited(report) => exit = Some(report),
        }
    }
    let exit = exit.unwrap_or(ExitReport {
        code: None,
        success: false,
        canceled: worker.handle.is_canceled(),
    });
    observer.finish(&exit)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use autoregress_engine::events::RunOutcome;
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> WorkerSpec {
        WorkerSpec::new("/bin/sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_successful_run_is_completed() {
        let script = concat!(
            r#"printf '{"event":"run_started","run_dir":"/tmp/r1"}\n'; "#,
            r#"printf '{"event":"run_finished","run_dir":"/tmp/r1","best_model":"SVR","best_r2":0.5,"seconds":0.1}\n'"#,
        );
        let mut worker = spawn_worker(&sh(script)).unwrap();
        let mut seen = Vec::new();
        let end = drive_worker(&mut worker, |e| seen.push(e.clone())).await;

        assert_eq!(seen.len(), 2);
        match end {
            RunEndState::Completed { run_dir, outcome } => {
                assert_eq!(run_dir, "/tmp/r1");
                assert_eq!(
                    outcome,
                    RunOutcome::Training {
                        best_model: "SVR".to_string(),
                        best_r2: 0.5,
                    }
                );
            }
            other => panic!("unexpected end state: {other:?}"),
        }
        assert!(worker.handle.is_finished());
    }

    #[tokio::test]
    async fn test_error_event_and_exit_two_is_failed() {
        let script =
            r#"printf '{"event":"error","message":"CSV path is invalid"}\n'; exit 2"#;
        let mut worker = spawn_worker(&sh(script)).unwrap();
        let end = drive_worker(&mut worker, |_| {}).await;
        match end {
            RunEndState::Failed { message, .. } => {
                assert_eq!(message, "CSV path is invalid");
            }
            other => panic!("unexpected end state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clean_exit_without_run_finished_is_failed() {
        let mut worker = spawn_worker(&sh("exit 0")).unwrap();
        let end = drive_worker(&mut worker, |_| {}).await;
        assert!(matches!(end, RunEndState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_kills_and_reports_canceled() {
        let script = concat!(
            r#"printf '{"event":"run_started","run_dir":"/tmp/r2"}\n'; "#,
            "sleep 30"
        );
        let mut worker = spawn_worker(&sh(script)).unwrap();

        // wait for the first event so the run dir is known
        let first = worker.messages.recv().await.unwrap();
        assert!(matches!(first, WorkerMessage::Event(Event::RunStarted { .. })));

        worker.handle.cancel();
        let mut observer = RunObserver::new();
        observer.observe(&Event::RunStarted {
            run_dir: "/tmp/r2".to_string(),
        });
        let mut exit = None;
        while let Some(message) = worker.messages.recv().await {
            if let WorkerMessage::Exited(report) = message {
                exit = Some(report);
            }
        }
        let exit = exit.unwrap();
        assert!(exit.canceled);
        let end = observer.finish(&exit);
        assert_eq!(
            end,
            RunEndState::Canceled {
                run_dir: Some("/tmp/r2".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let err = spawn_worker(&WorkerSpec::new("/nonexistent/worker-binary")).unwrap_err();
        assert!(matches!(err, ControlError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_stderr_lines_are_forwarded() {
        let mut worker = spawn_worker(&sh("echo oops >&2; exit 1")).unwrap();
        let mut stderr_lines = Vec::new();
        while let Some(message) = worker.messages.recv().await {
            if let WorkerMessage::Stderr(line) = message {
                stderr_lines.push(line);
            }
        }
        assert_eq!(stderr_lines, vec!["oops".to_string()]);
    }
}
