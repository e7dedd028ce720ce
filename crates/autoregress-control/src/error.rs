//! Error types for worker supervision.

use thiserror::Error;

/// The main error type for controller operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ControlError {
    /// The worker binary could not be started.
    #[error("Failed to spawn worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A spawned worker came back without the requested stdio pipe.
    #[error("Worker '{program}' has no {stream} pipe")]
    MissingPipe {
        program: String,
        stream: &'static str,
    },

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Engine-side error surfaced through the controller, e.g. while
    /// promoting a finished evaluation into history.
    #[error(transparent)]
    Engine(#[from] autoregress_engine::EngineError),
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControlError>;
