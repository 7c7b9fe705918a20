// error-detector-rs/src/detector.rs
// Category and severity assignment for raw errors

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use shared_types::config::ClassifierConfig;
use shared_types::{ClassifiedError, ErrorCategory, RawError, Severity};

use crate::patterns::{CATEGORY_PATTERNS, SEVERITY_PATTERNS};
use crate::sink::{FacadeMetricSink, MetricSink};

/// Maps a message and status code onto an error category.
///
/// Status shortcuts win over message patterns. With no match, server errors
/// fall back to `resource` and everything else to `unknown`.
pub fn classify(message: &str, status_code: u16) -> ErrorCategory {
    match status_code {
        401 => return ErrorCategory::Authentication,
        403 => return ErrorCategory::Authorization,
        404 => return ErrorCategory::Resource,
        429 => return ErrorCategory::RateLimit,
        504 => return ErrorCategory::Timeout,
        _ => {}
    }

    for (category, patterns) in CATEGORY_PATTERNS.iter() {
        if patterns.iter().any(|p| p.is_match(message)) {
            return *category;
        }
    }

    if status_code >= 500 {
        ErrorCategory::Resource
    } else {
        ErrorCategory::Unknown
    }
}

/// Assigns a severity to an already categorized error
pub fn assess_severity(message: &str, status_code: u16, category: ErrorCategory) -> Severity {
    if status_code >= 500 {
        if status_code != 503
            && matches!(category, ErrorCategory::Database | ErrorCategory::Authentication)
        {
            return Severity::Critical;
        }
        return Severity::High;
    }

    for (severity, patterns) in SEVERITY_PATTERNS.iter() {
        if patterns.iter().any(|p| p.is_match(message)) {
            return *severity;
        }
    }

    if status_code >= 400 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Counters kept over the lifetime of a detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorStatistics {
    pub total: u64,
    pub by_category: BTreeMap<ErrorCategory, u64>,
    pub by_severity: BTreeMap<Severity, u64>,
    pub by_service: BTreeMap<String, u64>,
    pub metric_failures: u64,
    pub last_detected_at: Option<DateTime<Utc>>,
}

/// Classifies raw errors and keeps running statistics
pub struct ErrorDetector {
    config: ClassifierConfig,
    sink: Arc<dyn MetricSink>,
    stats: DetectorStatistics,
}

impl std::fmt::Debug for ErrorDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorDetector")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for ErrorDetector {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl ErrorDetector {
    pub fn new(config: ClassifierConfig) -> Self {
        Self::with_sink(config, Arc::new(FacadeMetricSink))
    }

    pub fn with_sink(config: ClassifierConfig, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            config,
            sink,
            stats: DetectorStatistics::default(),
        }
    }

    pub fn classify(&self, message: &str, status_code: u16) -> ErrorCategory {
        classify(message, status_code)
    }

    pub fn assess_severity(&self, message: &str, status_code: u16, category: ErrorCategory) -> Severity {
        assess_severity(message, status_code, category)
    }

    /// Classifies a raw error into a full [`ClassifiedError`]
    pub fn detect(&mut self, raw: RawError) -> ClassifiedError {
        self.detect_at(raw, Utc::now())
    }

    pub fn detect_at(&mut self, raw: RawError, now: DateTime<Utc>) -> ClassifiedError {
        let category = classify(&raw.message, raw.status_code);
        let severity = assess_severity(&raw.message, raw.status_code, category);
        let response_time_ms = raw.response_time_ms;

        let error = ClassifiedError::from_raw(raw, category, severity, now);

        self.stats.total += 1;
        *self.stats.by_category.entry(category).or_insert(0) += 1;
        *self.stats.by_severity.entry(severity).or_insert(0) += 1;
        *self.stats.by_service.entry(error.service.clone()).or_insert(0) += 1;
        self.stats.last_detected_at = Some(now);

        if self.config.emit_metrics {
            if let Err(e) = self.sink.record(&error, response_time_ms) {
                self.stats.metric_failures += 1;
                warn!(error_id = %error.id, error = %e, "Failed to record classification metric");
            }
        }

        debug!(
            error_id = %error.id,
            category = %category,
            severity = %severity,
            status_code = error.status_code,
            "Error classified"
        );
        error_handling::log_classified_error(&error);

        error
    }

    pub fn statistics(&self) -> &DetectorStatistics {
        &self.stats
    }

    pub fn reset_statistics(&mut self) {
        self.stats = DetectorStatistics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{RecordingMetricSink, SinkError};

    struct FailingSink;

    impl MetricSink for FailingSink {
        fn record(&self, _error: &ClassifiedError, _ms: Option<f64>) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("backend down".to_string()))
        }
    }

    fn raw(status_code: u16, message: &str) -> RawError {
        RawError {
            status_code,
            message: message.to_string(),
            service: "health-monitor".to_string(),
            endpoint: "/api/health".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_database_failure_is_critical() {
        let category = classify("Database connection failed", 500);
        assert_eq!(category, ErrorCategory::Database);
        assert_eq!(assess_severity("Database connection failed", 500, category), Severity::Critical);
    }

    #[test]
    fn test_rate_limit_shortcut_is_medium() {
        let category = classify("Rate limit exceeded", 429);
        assert_eq!(category, ErrorCategory::RateLimit);
        assert_eq!(assess_severity("Rate limit exceeded", 429, category), Severity::Medium);
    }

    #[test]
    fn test_status_shortcuts_beat_patterns() {
        assert_eq!(classify("Database is fine, token bad", 401), ErrorCategory::Authentication);
        assert_eq!(classify("Database row", 403), ErrorCategory::Authorization);
        assert_eq!(classify("anything", 404), ErrorCategory::Resource);
        assert_eq!(classify("Database slow", 504), ErrorCategory::Timeout);
    }

    #[test]
    fn test_database_checked_before_timeout_and_resource() {
        assert_eq!(classify("Database query timeout", 500), ErrorCategory::Database);
        assert_eq!(classify("DB instance not found", 400), ErrorCategory::Database);
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(classify("something odd happened", 500), ErrorCategory::Resource);
        assert_eq!(classify("something odd happened", 418), ErrorCategory::Unknown);
    }

    #[test]
    fn test_service_unavailable_is_high_not_critical() {
        assert_eq!(assess_severity("Database unavailable", 503, ErrorCategory::Database), Severity::High);
        assert_eq!(assess_severity("boom", 502, ErrorCategory::Network), Severity::High);
    }

    #[test]
    fn test_severity_patterns_and_bands() {
        assert_eq!(assess_severity("data corruption detected", 400, ErrorCategory::Unknown), Severity::Critical);
        assert_eq!(assess_severity("Authentication failed", 401, ErrorCategory::Authentication), Severity::High);
        assert_eq!(assess_severity("Invalid parameter", 400, ErrorCategory::Unknown), Severity::Medium);
        assert_eq!(assess_severity("cache miss", 200, ErrorCategory::Resource), Severity::Low);
        assert_eq!(assess_severity("teapot", 418, ErrorCategory::Unknown), Severity::Medium);
        assert_eq!(assess_severity("redirect", 302, ErrorCategory::Unknown), Severity::Low);
    }

    #[test]
    fn test_classification_is_deterministic() {
        for (status, message) in [(500, "Database connection failed"), (429, "Rate limit exceeded"), (418, "?")] {
            let first = classify(message, status);
            assert_eq!(first, classify(message, status));
            assert_eq!(assess_severity(message, status, first), assess_severity(message, status, first));
        }
    }

    #[test]
    fn test_detect_builds_classified_error_and_statistics() {
        let sink = Arc::new(RecordingMetricSink::new());
        let mut detector = ErrorDetector::with_sink(ClassifierConfig::default(), sink.clone());

        let mut input = raw(500, "Database connection failed");
        input.request_id = Some("req-1".to_string());
        let error = detector.detect(input);

        assert_eq!(error.category, ErrorCategory::Database);
        assert_eq!(error.severity, Severity::Critical);
        assert_eq!(error.request_id, "req-1");
        assert_eq!(sink.recorded(), vec![error.id.clone()]);

        detector.detect(raw(429, "Rate limit exceeded"));
        let stats = detector.statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_category[&ErrorCategory::RateLimit], 1);
        assert_eq!(stats.by_severity[&Severity::Critical], 1);
        assert_eq!(stats.by_service["health-monitor"], 2);
    }

    #[test]
    fn test_sink_failure_never_blocks_classification() {
        let mut detector = ErrorDetector::with_sink(ClassifierConfig::default(), Arc::new(FailingSink));
        let error = detector.detect(raw(500, "Database connection failed"));

        assert_eq!(error.category, ErrorCategory::Database);
        assert_eq!(detector.statistics().metric_failures, 1);
    }

    #[test]
    fn test_metrics_can_be_disabled() {
        let sink = Arc::new(RecordingMetricSink::new());
        let mut detector = ErrorDetector::with_sink(ClassifierConfig { emit_metrics: false }, sink.clone());
        detector.detect(raw(500, "boom"));
        assert!(sink.recorded().is_empty());
    }
}
