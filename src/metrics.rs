//! Prometheus metrics for report generation.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::report::ReportSummary;

/// Global metrics registry instance
pub static METRICS: Lazy<Arc<MetricsCollector>> = Lazy::new(|| Arc::new(MetricsCollector::new()));

/// Labels for report request metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    /// Request status ("success" or "error")
    pub status: String,
}

/// Labels for error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// Error category, e.g. "source_unavailable"
    pub category: String,
}

pub struct MetricsCollector {
    registry: RwLock<Registry>,

    /// Total report requests by status
    pub report_requests_total: Family<RequestLabels, Counter>,

    /// Report generation latency in seconds
    pub report_duration_seconds: Histogram,

    /// Reports currently being generated
    pub report_active_requests: Gauge,

    /// Worksheet rows per generated report
    pub report_rows: Histogram,

    /// Size of generated workbooks in bytes
    pub report_bytes: Histogram,

    /// Total failures by error category
    pub report_errors_total: Family<ErrorLabels, Counter>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let report_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "report_requests",
            "Total number of report requests",
            report_requests_total.clone(),
        );

        // Buckets: 10ms .. ~40s
        let report_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.5, 10));
        registry.register(
            "report_duration_seconds",
            "Report generation latency in seconds",
            report_duration_seconds.clone(),
        );

        let report_active_requests = Gauge::default();
        registry.register(
            "report_active_requests",
            "Number of reports currently being generated",
            report_active_requests.clone(),
        );

        let report_rows = Histogram::new(exponential_buckets(4.0, 4.0, 10));
        registry.register(
            "report_rows",
            "Worksheet rows per generated report",
            report_rows.clone(),
        );

        let report_bytes = Histogram::new(exponential_buckets(4096.0, 4.0, 10));
        registry.register(
            "report_bytes",
            "Size of generated workbooks in bytes",
            report_bytes.clone(),
        );

        let report_errors_total = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "report_errors",
            "Total number of report failures by error category",
            report_errors_total.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            report_requests_total,
            report_duration_seconds,
            report_active_requests,
            report_rows,
            report_bytes,
            report_errors_total,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(error) = encode(&mut buffer, &registry) {
            tracing::warn!(%error, "failed to encode metrics");
        }
        buffer
    }

    pub fn record_success(&self, duration: Duration, summary: &ReportSummary, bytes: usize) {
        self.report_requests_total
            .get_or_create(&RequestLabels {
                status: "success".to_string(),
            })
            .inc();
        self.report_duration_seconds.observe(duration.as_secs_f64());
        self.report_rows.observe(f64::from(summary.rows));
        self.report_bytes.observe(bytes as f64);
    }

    pub fn record_error(&self, duration: Duration, category: &str) {
        self.report_requests_total
            .get_or_create(&RequestLabels {
                status: "error".to_string(),
            })
            .inc();
        self.report_duration_seconds.observe(duration.as_secs_f64());
        self.report_errors_total
            .get_or_create(&ErrorLabels {
                category: category.to_string(),
            })
            .inc();
    }

    pub fn success_count(&self) -> u64 {
        self.report_requests_total
            .get_or_create(&RequestLabels {
                status: "success".to_string(),
            })
            .get()
    }

    pub fn error_count(&self, category: &str) -> u64 {
        self.report_errors_total
            .get_or_create(&ErrorLabels {
                category: category.to_string(),
            })
            .get()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for automatic request timing and metric recording
///
/// A guard dropped without calling [`ReportMetrics::success`] or
/// [`ReportMetrics::error`] is recorded as an error of category "unknown".
pub struct ReportMetrics {
    collector: Arc<MetricsCollector>,
    start: Instant,
    completed: bool,
}

impl ReportMetrics {
    pub fn new() -> Self {
        Self::with_collector(METRICS.clone())
    }

    pub fn with_collector(collector: Arc<MetricsCollector>) -> Self {
        collector.report_active_requests.inc();
        Self {
            collector,
            start: Instant::now(),
            completed: false,
        }
    }

    pub fn success(mut self, summary: &ReportSummary, bytes: usize) {
        self.collector
            .record_success(self.start.elapsed(), summary, bytes);
        self.finish();
    }

    pub fn error(mut self, category: &str) {
        self.collector.record_error(self.start.elapsed(), category);
        self.finish();
    }

    fn finish(&mut self) {
        self.completed = true;
        self.collector.report_active_requests.dec();
    }
}

impl Default for ReportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReportMetrics {
    fn drop(&mut self) {
        if !self.completed {
            self.collector
                .record_error(self.start.elapsed(), "unknown");
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_records_success() {
        let collector = Arc::new(MetricsCollector::new());
        let guard = ReportMetrics::with_collector(collector.clone());
        assert_eq!(collector.report_active_requests.get(), 1);

        guard.success(
            &ReportSummary {
                customers: 2,
                calls: 1,
                rows: 9,
                cells: 17,
            },
            5000,
        );
        assert_eq!(collector.success_count(), 1);
        assert_eq!(collector.report_active_requests.get(), 0);
    }

    #[test]
    fn dropped_guard_counts_as_unknown_error() {
        let collector = Arc::new(MetricsCollector::new());
        drop(ReportMetrics::with_collector(collector.clone()));
        assert_eq!(collector.error_count("unknown"), 1);
        assert_eq!(collector.report_active_requests.get(), 0);
    }

    #[test]
    fn encode_lists_report_metrics() {
        let collector = MetricsCollector::new();
        collector.record_error(Duration::from_millis(5), "source_unavailable");
        let text = collector.encode();
        assert!(text.contains("report_requests_total"));
        assert!(text.contains("source_unavailable"));
    }
}
