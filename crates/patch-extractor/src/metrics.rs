//! Extraction metrics.
//!
//! Every event is reported twice: to the global `metrics` recorder (a no-op
//! unless the application installs one) and to atomic counters owned by the
//! pipeline, so callers can inspect counts without a recorder.

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Counters for one extraction run.
#[derive(Debug, Default)]
pub struct ExtractionMetrics {
    pub windows_created: AtomicU64,
    pub window_groups_created: AtomicU64,
    pub groups_read: AtomicU64,
    pub windows_read: AtomicU64,
    pub raster_read_errors: AtomicU64,
    pub points_out_of_bounds: AtomicU64,
    pub window_planning_errors: AtomicU64,
    read_times: Mutex<TimingStats>,
}

#[derive(Debug, Default)]
struct TimingStats {
    count: u64,
    total_us: u64,
    max_us: u64,
}

impl TimingStats {
    fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.max_us = self.max_us.max(duration_us);
    }

    fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_us as f64 / self.count as f64) / 1000.0
        }
    }

    fn max_ms(&self) -> f64 {
        self.max_us as f64 / 1000.0
    }
}

impl ExtractionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record windows planned for one raster
    pub fn record_windows_created(&self, count: usize) {
        self.windows_created.fetch_add(count as u64, Ordering::Relaxed);
        counter!("windows_created").increment(count as u64);
    }

    /// Record groups built for one raster
    pub fn record_groups_created(&self, count: usize) {
        self.window_groups_created.fetch_add(count as u64, Ordering::Relaxed);
        counter!("window_groups_created").increment(count as u64);
    }

    /// Record a group whose patches were all produced
    pub fn record_group_read(&self, windows: usize) {
        self.groups_read.fetch_add(1, Ordering::Relaxed);
        self.windows_read.fetch_add(windows as u64, Ordering::Relaxed);
        counter!("groups_read").increment(1);
        counter!("windows_read").increment(windows as u64);
    }

    /// Record a skipped group
    pub fn record_read_error(&self) {
        self.raster_read_errors.fetch_add(1, Ordering::Relaxed);
        counter!("raster_read_errors").increment(1);
    }

    /// Record time spent on one group read, successful or not
    pub fn record_read_time(&self, duration: Duration) {
        self.read_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(duration.as_micros() as u64);
        histogram!("raster_read_time_ms").record(duration.as_secs_f64() * 1000.0);
    }

    /// Record a point outside a raster
    pub fn record_out_of_bounds(&self) {
        self.points_out_of_bounds.fetch_add(1, Ordering::Relaxed);
        counter!("points_out_of_bounds").increment(1);
    }

    /// Record a point whose window could not be computed
    pub fn record_planning_error(&self) {
        self.window_planning_errors.fetch_add(1, Ordering::Relaxed);
        counter!("window_planning_errors").increment(1);
    }

    /// Get a point-in-time copy of all counters.
    pub fn snapshot(&self) -> ExtractionStats {
        let read_times = self
            .read_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        ExtractionStats {
            windows_created: self.windows_created.load(Ordering::Relaxed),
            window_groups_created: self.window_groups_created.load(Ordering::Relaxed),
            groups_read: self.groups_read.load(Ordering::Relaxed),
            windows_read: self.windows_read.load(Ordering::Relaxed),
            raster_read_errors: self.raster_read_errors.load(Ordering::Relaxed),
            points_out_of_bounds: self.points_out_of_bounds.load(Ordering::Relaxed),
            window_planning_errors: self.window_planning_errors.load(Ordering::Relaxed),
            reads_timed: read_times.count,
            read_avg_ms: read_times.avg_ms(),
            read_max_ms: read_times.max_ms(),
        }
    }
}

/// Serializable snapshot of [`ExtractionMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub windows_created: u64,
    pub window_groups_created: u64,
    pub groups_read: u64,
    pub windows_read: u64,
    pub raster_read_errors: u64,
    pub points_out_of_bounds: u64,
    pub window_planning_errors: u64,

    // Read timing
    pub reads_timed: u64,
    pub read_avg_ms: f64,
    pub read_max_ms: f64,
}
