// metrics-collector-rs/src/types.rs
// Metric query types and snapshots

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_types::StoreError;

#[derive(Debug, Clone, Error)]
pub enum MetricsError {
    #[error("Metrics store error: {0}")]
    Store(#[from] StoreError),

    #[error("Metric serialization error: {0}")]
    Serialization(String),

    #[error("Unknown metric type: {0}")]
    UnknownMetricType(String),

    #[error("Invalid window: {0} minutes")]
    InvalidWindow(i64),
}

impl From<serde_json::Error> for MetricsError {
    fn from(err: serde_json::Error) -> Self {
        MetricsError::Serialization(err.to_string())
    }
}

impl From<MetricsError> for error_handling::Error {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::Store(e) => e.into(),
            MetricsError::UnknownMetricType(_) => {
                error_handling::Error::validation(err.to_string()).code("UNKNOWN_METRIC_TYPE")
            }
            MetricsError::InvalidWindow(_) => {
                error_handling::Error::validation(err.to_string()).code("INVALID_FIELD")
            }
            MetricsError::Serialization(_) => error_handling::Error::internal(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    ErrorCount,
    ErrorRate,
    ResponseTime,
}

impl MetricType {
    pub const ALL: [MetricType; 3] = [MetricType::ErrorCount, MetricType::ErrorRate, MetricType::ResponseTime];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::ErrorCount => "error_count",
            MetricType::ErrorRate => "error_rate",
            MetricType::ResponseTime => "response_time",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MetricsError::UnknownMetricType(s.to_string()))
    }
}

/// One aggregated value, per service or across all services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric_type: MetricType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub sample_count: u64,
}

/// Snapshot of the in-memory window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealTimeMetrics {
    pub timestamp: Option<DateTime<Utc>>,
    pub window_minutes: i64,
    pub total_errors: u64,
    pub critical_errors: u64,
    pub high_errors: u64,
    pub by_service: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub by_error_type: BTreeMap<String, u64>,
    pub by_endpoint: BTreeMap<String, u64>,
    pub average_response_time_ms: Option<f64>,
}

/// Error counts of one time bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket_start: DateTime<Utc>,
    pub total: u64,
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorStatistics {
    pub cache_keys: usize,
    pub cached_entries: usize,
    pub pending_writes: usize,
    pub flushed_total: u64,
    pub flush_failures: u64,
    pub rate_cache_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_type_names() {
        assert_eq!("error_rate".parse::<MetricType>().unwrap(), MetricType::ErrorRate);
        assert!(matches!(
            "latency_p99".parse::<MetricType>(),
            Err(MetricsError::UnknownMetricType(_))
        ));
    }
}
