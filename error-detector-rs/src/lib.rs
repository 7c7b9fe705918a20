//! # Error Detector
//!
//! Classifies raw API errors into a category and a severity using ordered
//! regex pattern tables and status-code shortcuts.

mod patterns;

pub mod detector;
pub mod sink;

pub use detector::{assess_severity, classify, DetectorStatistics, ErrorDetector};
pub use sink::{FacadeMetricSink, MetricSink, NoopMetricSink, RecordingMetricSink, SinkError};
