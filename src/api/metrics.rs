//! Request counters for `GET /metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Lock-free request counters shared by every handler.
pub struct ServiceMetrics {
    started: Instant,
    requests: AtomicU64,
    errors: AtomicU64,
    total_micros: AtomicU64,
}

/// Point-in-time view of [`ServiceMetrics`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub error_count: u64,
    /// Percentage, one decimal place.
    pub error_rate: f64,
    /// Milliseconds.
    pub avg_processing_time: f64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
        }
    }

    pub fn record(&self, elapsed: Duration, failed: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let micros = self.total_micros.load(Ordering::Relaxed);

        let (error_rate, avg_processing_time) = if requests == 0 {
            (0.0, 0.0)
        } else {
            (
                (errors as f64 / requests as f64 * 1000.0).round() / 10.0,
                micros as f64 / requests as f64 / 1000.0,
            )
        };

        MetricsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs(),
            total_requests: requests,
            error_count: errors,
            error_rate,
            avg_processing_time,
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metrics_are_zero() {
        let snapshot = ServiceMetrics::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.avg_processing_time, 0.0);
    }

    #[test]
    fn rates_and_averages() {
        let metrics = ServiceMetrics::new();
        metrics.record(Duration::from_millis(10), false);
        metrics.record(Duration::from_millis(20), false);
        metrics.record(Duration::from_millis(30), true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.error_rate, 33.3);
        assert!((snapshot.avg_processing_time - 20.0).abs() < 1e-9);
    }
}
