//! # Metrics
//!
//! Operation counters for the manifest manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector
#[derive(Clone, Default)]
pub struct ManifestMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    // Operation metrics
    puts: AtomicU64,
    gets: AtomicU64,
    finds: AtomicU64,
    deletes: AtomicU64,

    // Persistence metrics
    flushes: AtomicU64,
    blocks_written: AtomicU64,
    bytes_written: AtomicU64,
    blocks_loaded: AtomicU64,
    compactions: AtomicU64,
    blocks_retired: AtomicU64,

    // Failures
    integrity_failures: AtomicU64,
}

impl ManifestMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_put(&self) {
        self.inner.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_get(&self) {
        self.inner.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_find(&self) {
        self.inner.finds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.inner.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush that wrote one block of `bytes`
    pub fn record_flush(&self, bytes: u64) {
        self.inner.flushes.fetch_add(1, Ordering::Relaxed);
        self.record_block_written(bytes);
    }

    pub fn record_block_written(&self, bytes: u64) {
        self.inner.blocks_written.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_blocks_loaded(&self, count: u64) {
        self.inner.blocks_loaded.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a compaction that retired `retired` blocks
    pub fn record_compaction(&self, retired: u64) {
        self.inner.compactions.fetch_add(1, Ordering::Relaxed);
        self.inner.blocks_retired.fetch_add(retired, Ordering::Relaxed);
    }

    pub fn record_integrity_failure(&self) {
        self.inner.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            puts: self.inner.puts.load(Ordering::Relaxed),
            gets: self.inner.gets.load(Ordering::Relaxed),
            finds: self.inner.finds.load(Ordering::Relaxed),
            deletes: self.inner.deletes.load(Ordering::Relaxed),
            flushes: self.inner.flushes.load(Ordering::Relaxed),
            blocks_written: self.inner.blocks_written.load(Ordering::Relaxed),
            bytes_written: self.inner.bytes_written.load(Ordering::Relaxed),
            blocks_loaded: self.inner.blocks_loaded.load(Ordering::Relaxed),
            compactions: self.inner.compactions.load(Ordering::Relaxed),
            blocks_retired: self.inner.blocks_retired.load(Ordering::Relaxed),
            integrity_failures: self.inner.integrity_failures.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub puts: u64,
    pub gets: u64,
    pub finds: u64,
    pub deletes: u64,
    pub flushes: u64,
    pub blocks_written: u64,
    pub bytes_written: u64,
    pub blocks_loaded: u64,
    pub compactions: u64,
    pub blocks_retired: u64,
    pub integrity_failures: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    /// Start new timer
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer and log duration
    pub fn stop(self) -> Duration {
        let duration = self.elapsed();
        tracing::debug!(
            name = self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_shared_between_clones() {
        let metrics = ManifestMetrics::new();
        let clone = metrics.clone();

        metrics.record_put();
        clone.record_put();
        clone.record_flush(128);
        metrics.record_compaction(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.puts, 2);
        assert_eq!(snap.flushes, 1);
        assert_eq!(snap.blocks_written, 1);
        assert_eq!(snap.bytes_written, 128);
        assert_eq!(snap.compactions, 1);
        assert_eq!(snap.blocks_retired, 3);
    }
}
