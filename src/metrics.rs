// Operation metrics
//
// Lock-free counters for what the engine did during one run

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Engine metrics
///
/// Uses atomic operations so the engine, the profile operator and the state
/// manager can share one instance behind an `Arc` without locking. Logged on
/// shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Modifications applied successfully
    pub modifications_applied: AtomicUsize,

    /// Modifications whose apply or revert failed
    pub modifications_failed: AtomicUsize,

    /// Modifications reverted successfully
    pub modifications_reverted: AtomicUsize,

    /// Missions added to live list files by merging
    pub lst_missions_merged: AtomicUsize,

    /// Pristine list files captured into the base store
    pub base_captures: AtomicUsize,

    /// Pristine list files restored from the base store
    pub base_restores: AtomicUsize,

    /// Per-file backups written before an overwrite
    pub file_backups: AtomicUsize,

    /// Total time spent in profile-level operations in milliseconds
    pub total_operation_time_ms: AtomicU64,

    /// Number of state updates performed
    pub state_updates: AtomicU64,

    /// Number of state broadcasts sent
    pub state_broadcasts: AtomicU64,

    /// Number of state broadcasts with no receiver
    pub state_broadcast_errors: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            modifications_applied: AtomicUsize::new(0),
            modifications_failed: AtomicUsize::new(0),
            modifications_reverted: AtomicUsize::new(0),
            lst_missions_merged: AtomicUsize::new(0),
            base_captures: AtomicUsize::new(0),
            base_restores: AtomicUsize::new(0),
            file_backups: AtomicUsize::new(0),
            total_operation_time_ms: AtomicU64::new(0),
            state_updates: AtomicU64::new(0),
            state_broadcasts: AtomicU64::new(0),
            state_broadcast_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_applied(&self) {
        self.modifications_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.modifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reverted(&self) {
        self.modifications_reverted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missions_merged(&self, count: usize) {
        self.lst_missions_merged.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_base_capture(&self) {
        self.base_captures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_base_restores(&self, count: usize) {
        self.base_restores.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_file_backup(&self) {
        self.file_backups.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the wall time of one profile-level operation
    pub fn record_operation_time(&self, duration: Duration) {
        self.total_operation_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_state_update(&self) {
        self.state_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_broadcast(&self) {
        self.state_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_broadcast_error(&self) {
        self.state_broadcast_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Total modifications touched, successful or not
    pub fn modifications_processed(&self) -> usize {
        self.modifications_applied.load(Ordering::Relaxed)
            + self.modifications_reverted.load(Ordering::Relaxed)
            + self.modifications_failed.load(Ordering::Relaxed)
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Operation Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Modifications: {} applied, {} reverted, {} failed",
            self.modifications_applied.load(Ordering::Relaxed),
            self.modifications_reverted.load(Ordering::Relaxed),
            self.modifications_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "List files: {} missions merged, {} base captures, {} base restores",
            self.lst_missions_merged.load(Ordering::Relaxed),
            self.base_captures.load(Ordering::Relaxed),
            self.base_restores.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Per-file backups: {}, operation time: {:.2}s",
            self.file_backups.load(Ordering::Relaxed),
            self.total_operation_time_ms.load(Ordering::Relaxed) as f64 / 1000.0
        );
        tracing::info!(
            "State updates: {}, broadcasts: {}, errors: {}",
            self.state_updates.load(Ordering::Relaxed),
            self.state_broadcasts.load(Ordering::Relaxed),
            self.state_broadcast_errors.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
