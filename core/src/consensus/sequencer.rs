//! # Serialized Execution Slot
//!
//! Every tip-mutating operation — accepting a block, resolving a received
//! broadcast, syncing with a peer — is admitted through a single FIFO slot.
//! At most one such operation executes system-wide at any instant, which
//! makes every rollback/apply pair race-free and the tip's history
//! linearizable. Read-only queries do not take the slot and may proceed
//! concurrently with a pending mutation.
//!
//! The slot is a fairness-preserving `tokio::sync::Mutex`: waiters are
//! admitted in arrival order, and holding the guard across `.await` points
//! is exactly the intent — a block acceptance that suspends on storage or
//! network I/O keeps every other acceptance out until it completes or fails.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard};

/// Admission control for the tip-mutation path, plus the two process-wide
/// flags the core consults.
#[derive(Debug, Default)]
pub struct Sequencer {
    slot: Mutex<()>,
    shutting_down: AtomicBool,
    sync_in_progress: AtomicBool,
}

/// Proof of admission. Mutating the tip without holding one of these is a
/// bug by construction; inner pipeline stages take it by reference.
pub type Admission<'a> = MutexGuard<'a, ()>;

impl Sequencer {
    /// Creates an idle sequencer with both flags cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the execution slot. FIFO across all callers.
    pub async fn admit(&self) -> Admission<'_> {
        self.slot.lock().await
    }

    /// Raised once at shutdown; `process_block` refuses new work after this.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Whether the node is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Marks a full resync as underway (or finished). While raised, the
    /// fork resolver defers unsolicited broadcast blocks instead of queuing
    /// them behind the sync.
    pub fn set_sync_in_progress(&self, active: bool) {
        self.sync_in_progress.store(active, Ordering::SeqCst);
    }

    /// Whether a full resync is underway.
    pub fn is_sync_in_progress(&self) -> bool {
        self.sync_in_progress.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn slot_admits_one_operation_at_a_time() {
        let seq = Arc::new(Sequencer::new());
        let active = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let completed = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let seq = Arc::clone(&seq);
            let active = Arc::clone(&active);
            let completed = Arc::clone(&completed);
            handles.push(tokio::spawn(async move {
                let _slot = seq.admit().await;
                assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                // Suspend mid-operation; nobody else may be admitted.
                tokio::task::yield_now().await;
                assert_eq!(active.load(Ordering::SeqCst), 1);
                active.fetch_sub(1, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert_eq!(completed.load(Ordering::SeqCst), 8);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn flags_default_clear() {
        let seq = Sequencer::new();
        assert!(!seq.is_shutting_down());
        assert!(!seq.is_sync_in_progress());

        seq.begin_shutdown();
        seq.set_sync_in_progress(true);
        assert!(seq.is_shutting_down());
        assert!(seq.is_sync_in_progress());

        seq.set_sync_in_progress(false);
        assert!(!seq.is_sync_in_progress());
    }
}
