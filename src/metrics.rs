// Build metrics module
//
// Provides lightweight counters of build outcomes and timings for one orchestrator

use crate::models::{BuildOutcome, BuildReport, Severity};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Build metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// The orchestrator records every finished build; the CLI logs the summary on exit.
#[derive(Debug)]
pub struct BuildMetrics {
    pub builds_succeeded: AtomicU64,

    pub builds_failed: AtomicU64,

    pub builds_cancelled: AtomicU64,

    /// Total wall-clock build time in milliseconds
    pub total_build_time_ms: AtomicU64,

    /// Lines of compiler and archiver output streamed to subscribers
    pub output_lines: AtomicU64,

    pub errors_reported: AtomicU64,

    pub warnings_reported: AtomicU64,

    /// Total size of all produced archives in bytes
    pub bytes_archived: AtomicU64,

    start_time: Instant,
}

impl BuildMetrics {
    pub fn new() -> Self {
        Self {
            builds_succeeded: AtomicU64::new(0),
            builds_failed: AtomicU64::new(0),
            builds_cancelled: AtomicU64::new(0),
            total_build_time_ms: AtomicU64::new(0),
            output_lines: AtomicU64::new(0),
            errors_reported: AtomicU64::new(0),
            warnings_reported: AtomicU64::new(0),
            bytes_archived: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome, duration and diagnostic counts of a finished build
    pub fn record_report(&self, report: &BuildReport) {
        let counter = match report.outcome {
            BuildOutcome::Succeeded => &self.builds_succeeded,
            BuildOutcome::Failed => &self.builds_failed,
            BuildOutcome::Cancelled => &self.builds_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.record_build_time(report.duration);
        self.errors_reported
            .fetch_add(report.count(Severity::Error) as u64, Ordering::Relaxed);
        self.warnings_reported
            .fetch_add(report.count(Severity::Warning) as u64, Ordering::Relaxed);
        self.bytes_archived
            .fetch_add(report.artifact_size, Ordering::Relaxed);
    }

    pub fn record_build_time(&self, duration: Duration) {
        self.total_build_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record one streamed output line
    pub fn record_output_line(&self) {
        self.output_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_builds(&self) -> u64 {
        self.builds_succeeded.load(Ordering::Relaxed)
            + self.builds_failed.load(Ordering::Relaxed)
            + self.builds_cancelled.load(Ordering::Relaxed)
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get average build time in milliseconds
    pub fn avg_build_time_ms(&self) -> f64 {
        let total = self.total_build_time_ms.load(Ordering::Relaxed);
        let count = self.total_builds();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Build Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Builds: {} succeeded, {} failed, {} cancelled",
            self.builds_succeeded.load(Ordering::Relaxed),
            self.builds_failed.load(Ordering::Relaxed),
            self.builds_cancelled.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total build time: {:.2}s (avg: {:.2}ms per build)",
            self.total_build_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_build_time_ms()
        );
        tracing::info!(
            "Diagnostics: {} errors, {} warnings; {} output lines streamed; {} bytes archived",
            self.errors_reported.load(Ordering::Relaxed),
            self.warnings_reported.load(Ordering::Relaxed),
            self.output_lines.load(Ordering::Relaxed),
            self.bytes_archived.load(Ordering::Relaxed)
        );
    }
}

impl Default for BuildMetrics {
    fn default() -> Self {
        Self::new()
    }
}
