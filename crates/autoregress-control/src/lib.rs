//! Controller-side harness for autoregress worker processes.
//!
//! The engine binaries report progress as JSON lines on stdout; this crate is
//! the other half of that conversation. It spawns workers, reassembles and
//! decodes their event stream, supervises cancellation, classifies how each
//! run ended, and promotes completed evaluations into the shared history.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use autoregress_control::{WorkerSpec, drive_worker, spawn_worker};
//!
//! let spec = WorkerSpec::new("autoregress-train")
//!     .arg("--csv").arg("data/houses.csv")
//!     .arg("--target").arg("price");
//! let mut worker = spawn_worker(&spec)?;
//! let cancel_handle = worker.handle.clone();
//!
//! let end = drive_worker(&mut worker, |event| {
//!     // forward to the UI
//!     println!("{event:?}");
//! }).await;
//! ```

pub mod decode;
pub mod error;
pub mod observer;
pub mod slots;
pub mod supervisor;

// Re-exports for convenient access
pub use decode::{LineDecoder, parse_event};
pub use error::{ControlError, Result};
pub use observer::{RunEndState, RunObserver, promote_completed_evaluation};
pub use slots::{WorkerSlot, WorkerSlots};
pub use supervisor::{
    ExitReport, Worker, WorkerHandle, WorkerMessage, WorkerSpec, drive_worker, spawn_worker,
};
