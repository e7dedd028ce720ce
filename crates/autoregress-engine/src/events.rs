//! The worker-to-controller event protocol.
//!
//! A worker process communicates with its controller over a single append-only
//! channel: one JSON object per stdout line, flushed immediately. The `event`
//! field discriminates the message type. Line order on the pipe is the
//! authoritative event order; consumers must ignore unknown fields so the
//! protocol can grow without breaking older controllers.
//!
//! Anything a worker writes to stderr is *not* part of this protocol and is
//! treated by consumers as an unstructured ERROR-level diagnostic.
//!
//! # Example
//!
//! ```
//! use autoregress_engine::events::{Event, LogLevel};
//!
//! let event = Event::Log {
//!     level: LogLevel::Info,
//!     message: "Loading dataset".to_string(),
//! };
//! let line = serde_json::to_string(&event).unwrap();
//! assert_eq!(line, r#"{"event":"log","level":"INFO","message":"Loading dataset"}"#);
//! ```

use std::io::Write;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Severity of a `log` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

/// Per-run evaluation metrics; each field is `null` when no usable target was
/// available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricSet {
    pub r2: Option<f64>,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
}

impl MetricSet {
    /// Metrics computed against a present target.
    pub fn scored(r2: f64, mae: f64, rmse: f64) -> Self {
        Self {
            r2: Some(r2),
            mae: Some(mae),
            rmse: Some(rmse),
        }
    }

    /// The all-null set used when the target column is absent.
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Terminal payload of a `run_finished` event.
///
/// Training and evaluation runs finish with different payloads under the same
/// discriminator; the variant is inferred from which fields are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutcome {
    /// A training run: the winning candidate and its validation R².
    Training { best_model: String, best_r2: f64 },
    /// An evaluation run: scoring summary for the evaluated rows.
    Evaluation {
        target_present: bool,
        n_rows: usize,
        metrics: MetricSet,
    },
}

/// One protocol message.
///
/// Serialized as a single JSON object with an `event` discriminator, exactly
/// one object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Structured diagnostic; never terminal.
    Log { level: LogLevel, message: String },
    /// The run directory exists; emitted before any candidate training so the
    /// controller always learns the storage location.
    RunStarted { run_dir: String },
    /// A candidate is about to be fitted.
    ModelStarted { name: String },
    /// A candidate was fitted and scored on the validation split.
    ModelFinished {
        name: String,
        r2: f64,
        mae: f64,
        rmse: f64,
        seconds: f64,
    },
    /// Terminal success.
    RunFinished {
        run_dir: String,
        #[serde(flatten)]
        outcome: RunOutcome,
        seconds: f64,
    },
    /// Terminal failure. Paired with exit code 2 for validation errors.
    Error { message: String },
}

impl Event {
    pub fn info(message: impl Into<String>) -> Self {
        Event::Log {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Event::Log {
            level: LogLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error_log(message: impl Into<String>) -> Self {
        Event::Log {
            level: LogLevel::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Event::Log {
            level: LogLevel::Success,
            message: message.into(),
        }
    }

    /// Whether this event ends the run (`run_finished` or `error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::RunFinished { .. } | Event::Error { .. })
    }
}

/// Where a worker writes protocol events.
///
/// Emission is infallible by design: a worker that cannot report progress has
/// nothing useful left to do with the failure either, so sinks swallow write
/// errors after a best-effort stderr note.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// The production sink: one JSON line per event on stdout, flushed per line.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for StdoutSink {
    fn emit(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(json) => {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                if writeln!(lock, "{json}").and_then(|()| lock.flush()).is_err() {
                    eprintln!("failed to write protocol event to stdout");
                }
            }
            Err(e) => eprintln!("failed to serialize protocol event: {e}"),
        }
    }
}

/// A sink that records events in memory, for tests and in-process embedding.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_log_wire_format() {
        let event = Event::warn("Target contains 3 non-numeric values; dropping those rows.");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"event":"log","level":"WARN","message":"Target contains 3 non-numeric values; dropping those rows."}"#
        );
    }

    #[test]
    fn test_model_finished_wire_format() {
        let event = Event::ModelFinished {
            name: "Ridge Regression".to_string(),
            r2: 0.91,
            mae: 1.5,
            rmse: 2.0,
            seconds: 0.25,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"event":"model_finished","name":"Ridge Regression","r2":0.91,"mae":1.5,"rmse":2.0,"seconds":0.25}"#
        );
    }

    #[test]
    fn test_run_finished_training_roundtrip() {
        let event = Event::RunFinished {
            run_dir: "/runs/20260826_120000".to_string(),
            outcome: RunOutcome::Training {
                best_model: "Random Forest".to_string(),
                best_r2: 0.95,
            },
            seconds: 3.5,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"run_finished""#));
        assert!(json.contains(r#""best_model":"Random Forest""#));

        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_run_finished_evaluation_roundtrip() {
        let event = Event::RunFinished {
            run_dir: "/runs/eval_20260826_120000".to_string(),
            outcome: RunOutcome::Evaluation {
                target_present: false,
                n_rows: 42,
                metrics: MetricSet::absent(),
            },
            seconds: 0.8,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""target_present":false"#));
        assert!(json.contains(r#""metrics":{"r2":null,"mae":null,"rmse":null}"#));

        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_consumer_ignores_unknown_fields() {
        let line = r#"{"event":"error","message":"CSV path is invalid","csv":"/tmp/x.csv"}"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert_eq!(
            event,
            Event::Error {
                message: "CSV path is invalid".to_string()
            }
        );
    }

    #[test]
    fn test_terminal_classification() {
        assert!(Event::Error { message: "x".into() }.is_terminal());
        assert!(!Event::info("hello").is_terminal());
        assert!(!Event::ModelStarted { name: "SVR".into() }.is_terminal());
    }

    #[test]
    fn test_collecting_sink_preserves_order() {
        let sink = CollectingSink::new();
        sink.emit(&Event::info("one"));
        sink.emit(&Event::warn("two"));
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::info("one"));
        assert_eq!(events[1], Event::warn("two"));
    }
}
