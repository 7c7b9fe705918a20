//! # Metrics Collector
//!
//! Records per-error metrics into a TTL window, persists them in batches to
//! the key-value store and answers rate, snapshot, aggregate and trend queries.

pub mod collector;
pub mod types;

pub use collector::{metric_from_error, window_start, MetricsCollector, MAX_WINDOW_MINUTES};
pub use types::{CollectorStatistics, DataPoint, MetricType, MetricsError, RealTimeMetrics, TrendPoint};
