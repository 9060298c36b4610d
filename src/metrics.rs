// Save/load performance metrics
//
// Lock-free counters that accumulate for the life of an engine and are reset
// only on explicit request.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time copy of the recorder's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_saves: u64,
    pub successful_saves: u64,
    pub failed_saves: u64,
    /// Mean duration of successful saves, in milliseconds
    pub average_save_time: f64,
    /// Duration of the most recent successful save, in milliseconds
    pub last_save_time: u64,
    pub total_loads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
}

/// Thread-safe accumulator for save, load and conflict counters.
///
/// When constructed disabled every `record_*` call is a no-op, so callers do
/// not need to check `performance_tracking` themselves.
#[derive(Debug)]
pub struct PerformanceRecorder {
    enabled: AtomicBool,
    total_saves: AtomicU64,
    successful_saves: AtomicU64,
    failed_saves: AtomicU64,
    total_save_time_ms: AtomicU64,
    last_save_time_ms: AtomicU64,
    total_loads: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    conflicts_detected: AtomicU64,
    conflicts_resolved: AtomicU64,
}

impl PerformanceRecorder {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            total_saves: AtomicU64::new(0),
            successful_saves: AtomicU64::new(0),
            failed_saves: AtomicU64::new(0),
            total_save_time_ms: AtomicU64::new(0),
            last_save_time_ms: AtomicU64::new(0),
            total_loads: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            conflicts_detected: AtomicU64::new(0),
            conflicts_resolved: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn bump(&self, counter: &AtomicU64) {
        if self.is_enabled() {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A save attempt failed validation or reached the store
    pub fn record_save_attempt(&self) {
        self.bump(&self.total_saves);
    }

    pub fn record_save_success(&self, duration: Duration) {
        if !self.is_enabled() {
            return;
        }
        let ms = duration.as_millis() as u64;
        self.successful_saves.fetch_add(1, Ordering::Relaxed);
        self.total_save_time_ms.fetch_add(ms, Ordering::Relaxed);
        self.last_save_time_ms.store(ms, Ordering::Relaxed);
    }

    pub fn record_save_failure(&self) {
        self.bump(&self.failed_saves);
    }

    pub fn record_load(&self) {
        self.bump(&self.total_loads);
    }

    pub fn record_cache_hit(&self) {
        self.bump(&self.cache_hits);
    }

    pub fn record_cache_miss(&self) {
        self.bump(&self.cache_misses);
    }

    pub fn record_conflict_detected(&self) {
        self.bump(&self.conflicts_detected);
    }

    pub fn record_conflict_resolved(&self) {
        self.bump(&self.conflicts_resolved);
    }

    pub fn successful_saves(&self) -> u64 {
        self.successful_saves.load(Ordering::Relaxed)
    }

    pub fn average_save_time_ms(&self) -> f64 {
        let total = self.total_save_time_ms.load(Ordering::Relaxed);
        let count = self.successful_saves.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            total_saves: self.total_saves.load(Ordering::Relaxed),
            successful_saves: self.successful_saves.load(Ordering::Relaxed),
            failed_saves: self.failed_saves.load(Ordering::Relaxed),
            average_save_time: self.average_save_time_ms(),
            last_save_time: self.last_save_time_ms.load(Ordering::Relaxed),
            total_loads: self.total_loads.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total_saves,
            &self.successful_saves,
            &self.failed_saves,
            &self.total_save_time_ms,
            &self.last_save_time_ms,
            &self.total_loads,
            &self.cache_hits,
            &self.cache_misses,
            &self.conflicts_detected,
            &self.conflicts_resolved,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        tracing::debug!("Performance metrics reset");
    }

    pub fn log_summary(&self) {
        let m = self.snapshot();
        tracing::info!("=== Persistence Metrics Summary ===");
        tracing::info!(
            "Saves: {} total, {} succeeded, {} failed (avg: {:.2}ms, last: {}ms)",
            m.total_saves,
            m.successful_saves,
            m.failed_saves,
            m.average_save_time,
            m.last_save_time
        );
        tracing::info!(
            "Loads: {} total, cache hits: {}, cache misses: {}",
            m.total_loads,
            m.cache_hits,
            m.cache_misses
        );
        tracing::info!(
            "Conflicts: {} detected, {} resolved",
            m.conflicts_detected,
            m.conflicts_resolved
        );
    }
}

impl Default for PerformanceRecorder {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_starts_empty() {
        let recorder = PerformanceRecorder::new(true);
        assert_eq!(recorder.snapshot(), PerformanceMetrics::default());
    }

    #[test]
    fn test_average_save_time() {
        let recorder = PerformanceRecorder::new(true);

        recorder.record_save_success(Duration::from_millis(100));
        recorder.record_save_success(Duration::from_millis(200));

        let m = recorder.snapshot();
        assert_eq!(m.successful_saves, 2);
        assert_eq!(m.average_save_time, 150.0);
        assert_eq!(m.last_save_time, 200);
    }

    #[test]
    fn test_disabled_recorder_ignores_everything() {
        let recorder = PerformanceRecorder::new(false);

        recorder.record_save_attempt();
        recorder.record_save_failure();
        recorder.record_cache_hit();
        recorder.record_conflict_detected();
        recorder.record_save_success(Duration::from_millis(5));

        assert_eq!(recorder.snapshot(), PerformanceMetrics::default());
    }

    #[test]
    fn test_reset_clears_counters() {
        let recorder = PerformanceRecorder::new(true);
        recorder.record_save_attempt();
        recorder.record_load();
        recorder.record_cache_miss();
        recorder.record_conflict_resolved();

        recorder.reset();

        assert_eq!(recorder.snapshot(), PerformanceMetrics::default());
    }
}
