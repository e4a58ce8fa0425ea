//! Sync scheduler state
//!
//! Holds the flags that drive a controller's polling loop: the continue flag
//! (cleared only at disposal), the re-entrancy guard, and the single pending
//! timer. Arming the timer always replaces the previous one; a timer that has
//! fired releases its slot before running the job, so re-arming from inside
//! the job, or from a settings change while the job runs, never cancels the
//! cycle in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::Instant;

// Stand-in deadline for delays that overflow `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

struct PendingSync {
    generation: u64,
    due: Instant,
    handle: JoinHandle<()>,
}

pub struct SyncScheduler {
    should_sync: AtomicBool,
    is_syncing: AtomicBool,
    generation: AtomicU64,
    completed_cycles: AtomicU64,
    pending: Mutex<Option<PendingSync>>,
}

impl SyncScheduler {
    pub fn new() -> Self {
        Self {
            should_sync: AtomicBool::new(false),
            is_syncing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            completed_cycles: AtomicU64::new(0),
            pending: Mutex::new(None),
        }
    }

    pub fn should_sync(&self) -> bool {
        self.should_sync.load(Ordering::SeqCst)
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::SeqCst)
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles.load(Ordering::SeqCst)
    }

    pub fn resume(&self) {
        self.should_sync.store(true, Ordering::SeqCst);
    }

    /// Enter a cycle. Returns false when stopped or a cycle is already running.
    pub fn try_begin(&self) -> bool {
        if !self.should_sync() {
            return false;
        }
        self.is_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn finish(&self) {
        self.completed_cycles.fetch_add(1, Ordering::SeqCst);
        self.is_syncing.store(false, Ordering::SeqCst);
    }

    /// Time left until the pending timer fires
    pub fn next_due_in(&self) -> Option<Duration> {
        self.lock_pending()
            .as_ref()
            .map(|p| p.due.saturating_duration_since(Instant::now()))
    }

    /// Arm the timer, cancelling any pending one. Returns false without
    /// arming once the scheduler has been stopped.
    pub fn arm<F>(self: &Arc<Self>, delay: Duration, job: F) -> bool
    where
        F: FnOnce() -> BoxFuture<'static, bool> + Send + 'static,
    {
        let mut pending = self.lock_pending();

        // `stop` clears the flag under this lock, so the check cannot race it
        if !self.should_sync() {
            return false;
        }

        if let Some(previous) = pending.take() {
            previous.handle.abort();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let scheduler = Arc::clone(self);
        let now = Instant::now();
        let due = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(due).await;
            scheduler.release(generation);
            job().await;
        });

        *pending = Some(PendingSync {
            generation,
            due,
            handle,
        });
        true
    }

    /// Cancel the pending timer, if any
    pub fn cancel(&self) -> bool {
        Self::abort_pending(&mut self.lock_pending())
    }

    /// Clear the continue flag and the pending timer. A cycle in flight runs
    /// to completion but will not re-arm.
    pub fn stop(&self) {
        let mut pending = self.lock_pending();
        self.should_sync.store(false, Ordering::SeqCst);
        Self::abort_pending(&mut pending);
    }

    fn abort_pending(pending: &mut Option<PendingSync>) -> bool {
        match pending.take() {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        }
    }

    fn release(&self, generation: u64) {
        let mut pending = self.lock_pending();
        if pending.as_ref().map(|p| p.generation) == Some(generation) {
            pending.take();
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingSync>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}
