use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Reconcile loop counters
#[derive(Debug, Default)]
pub struct ReconcileMetrics {
    pub reconciles: AtomicU64,
    pub skipped: AtomicU64,
    pub entries_completed: AtomicU64,
    pub entries_waiting: AtomicU64,
    pub entries_failed: AtomicU64,
    pub status_writes: AtomicU64,
    pub errors: AtomicU64,
}

impl ReconcileMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reconcile(&self) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
    }

    /// Workflow was deleting, ready, or still transitioning
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.entries_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_waiting(&self) {
        self.entries_waiting.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.entries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status_write(&self) {
        self.status_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ReconcileStats {
        ReconcileStats {
            reconciles: self.reconciles.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            entries_completed: self.entries_completed.load(Ordering::Relaxed),
            entries_waiting: self.entries_waiting.load(Ordering::Relaxed),
            entries_failed: self.entries_failed.load(Ordering::Relaxed),
            status_writes: self.status_writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            reconciles = stats.reconciles,
            skipped = stats.skipped,
            completed = stats.entries_completed,
            waiting = stats.entries_waiting,
            failed = stats.entries_failed,
            status_writes = stats.status_writes,
            errors = stats.errors,
            "Reconcile metrics"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileStats {
    pub reconciles: u64,
    pub skipped: u64,
    pub entries_completed: u64,
    pub entries_waiting: u64,
    pub entries_failed: u64,
    pub status_writes: u64,
    pub errors: u64,
}

/// Logs how long an operation took when dropped
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        debug!("Starting operation: {}", operation);
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        debug!(
            operation = %self.operation,
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            "Operation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = ReconcileMetrics::new();
        metrics.record_reconcile();
        metrics.record_reconcile();
        metrics.record_skip();
        metrics.record_completed();
        metrics.record_status_write();

        let stats = metrics.get_stats();
        assert_eq!(stats.reconciles, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.entries_completed, 1);
        assert_eq!(stats.status_writes, 1);
        assert_eq!(stats.errors, 0);
    }
}
