//! One-worker-per-kind admission control.
//!
//! The app runs at most one training worker and one evaluation worker at a
//! time. A slot remembers the handle of its current worker; claiming a busy
//! slot is refused rather than queued, mirroring a UI button that simply
//! stays disabled while a run is active.

use parking_lot::Mutex;

use crate::supervisor::WorkerHandle;

/// The two worker kinds the controller manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSlot {
    Training,
    Evaluation,
}

/// Tracks the active worker per slot.
#[derive(Debug, Default)]
pub struct WorkerSlots {
    training: Mutex<Option<WorkerHandle>>,
    evaluation: Mutex<Option<WorkerHandle>>,
}

static_assertions::assert_impl_all!(WorkerSlots: Send, Sync);

impl WorkerSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, slot: WorkerSlot) -> &Mutex<Option<WorkerHandle>> {
        match slot {
            WorkerSlot::Training => &self.training,
            WorkerSlot::Evaluation => &self.evaluation,
        }
    }

    /// Claim a slot for a new worker.
    ///
    /// Returns `false` and leaves the slot untouched when a live worker
    /// still occupies it. A finished worker's stale handle does not block.
    pub fn try_claim(&self, slot: WorkerSlot, handle: WorkerHandle) -> bool {
        let mut guard = self.slot(slot).lock();
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *guard = Some(handle);
        true
    }

    /// Whether a live worker currently occupies the slot.
    pub fn is_busy(&self, slot: WorkerSlot) -> bool {
        self.slot(slot)
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Cancel the slot's worker, if any. Returns whether a cancellation was
    /// sent.
    pub fn cancel(&self, slot: WorkerSlot) -> bool {
        match self.slot(slot).lock().as_ref() {
            Some(handle) if !handle.is_finished() => {
                handle.cancel();
                true
            }
            _ => false,
        }
    }

    /// Drop the slot's handle once its run has been fully processed.
    pub fn release(&self, slot: WorkerSlot) {
        *self.slot(slot).lock() = None;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::supervisor::{WorkerMessage, WorkerSpec, spawn_worker};

    fn sleeper() -> WorkerSpec {
        WorkerSpec::new("/bin/sh").arg("-c").arg("sleep 30")
    }

    #[tokio::test]
    async fn test_busy_slot_refuses_second_claim() {
        let slots = WorkerSlots::new();
        let worker = spawn_worker(&sleeper()).unwrap();
        let other = spawn_worker(&sleeper()).unwrap();

        assert!(slots.try_claim(WorkerSlot::Training, worker.handle.clone()));
        assert!(slots.is_busy(WorkerSlot::Training));
        assert!(!slots.try_claim(WorkerSlot::Training, other.handle.clone()));

        // the evaluation slot is independent
        assert!(slots.try_claim(WorkerSlot::Evaluation, other.handle.clone()));

        worker.handle.cancel();
        other.handle.cancel();
    }

    #[tokio::test]
    async fn test_finished_worker_does_not_block_slot() {
        let slots = WorkerSlots::new();
        let mut worker =
            spawn_worker(&WorkerSpec::new("/bin/sh").arg("-c").arg("exit 0")).unwrap();
        slots.try_claim(WorkerSlot::Training, worker.handle.clone());

        // drain until exit so is_finished flips
        while let Some(message) = worker.messages.recv().await {
            if matches!(message, WorkerMessage::Exited(_)) {
                break;
            }
        }
        assert!(!slots.is_busy(WorkerSlot::Training));

        let next = spawn_worker(&sleeper()).unwrap();
        assert!(slots.try_claim(WorkerSlot::Training, next.handle.clone()));
        next.handle.cancel();
    }

    #[tokio::test]
    async fn test_cancel_and_release() {
        let slots = WorkerSlots::new();
        assert!(!slots.cancel(WorkerSlot::Evaluation));

        let worker = spawn_worker(&sleeper()).unwrap();
        slots.try_claim(WorkerSlot::Evaluation, worker.handle.clone());
        assert!(slots.cancel(WorkerSlot::Evaluation));
        assert!(worker.handle.is_canceled());

        slots.release(WorkerSlot::Evaluation);
        assert!(!slots.is_busy(WorkerSlot::Evaluation));
    }
}
