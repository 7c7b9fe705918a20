// dashboard-rs/src/widgets.rs
// Widget formatters: raw snapshots in, display payloads out

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use alert_engine::AlertStatistics;
use metrics_collector::{RealTimeMetrics, TrendPoint};
use resolution_engine::ResolutionStatistics;
use shared_types::Alert;

use crate::source::WidgetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    ErrorMetrics,
    SystemHealth,
    ErrorTrends,
    AlertSummary,
    ResolutionSummary,
}

impl WidgetKind {
    pub const ALL: [WidgetKind; 5] = [
        WidgetKind::ErrorMetrics,
        WidgetKind::SystemHealth,
        WidgetKind::ErrorTrends,
        WidgetKind::AlertSummary,
        WidgetKind::ResolutionSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::ErrorMetrics => "error_metrics",
            WidgetKind::SystemHealth => "system_health",
            WidgetKind::ErrorTrends => "error_trends",
            WidgetKind::AlertSummary => "alert_summary",
            WidgetKind::ResolutionSummary => "resolution_summary",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            WidgetKind::ErrorMetrics => "Error Metrics",
            WidgetKind::SystemHealth => "System Health",
            WidgetKind::ErrorTrends => "Error Trends",
            WidgetKind::AlertSummary => "Active Alerts",
            WidgetKind::ResolutionSummary => "Automated Resolution",
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WidgetKind {
    type Err = WidgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WidgetKind::ALL
            .iter()
            .copied()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| WidgetError::UnknownWidget(s.to_string()))
    }
}

/// Qualitative health derived from a 0-100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    MinorIssues,
    Warning,
    Degraded,
    Critical,
    Unknown,
}

impl HealthStatus {
    pub fn from_score(score: u8) -> Self {
        match score {
            100 => HealthStatus::Healthy,
            75 => HealthStatus::MinorIssues,
            50 => HealthStatus::Warning,
            25 => HealthStatus::Degraded,
            0 => HealthStatus::Critical,
            _ => HealthStatus::Unknown,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "green",
            HealthStatus::MinorIssues => "yellow",
            HealthStatus::Warning => "orange",
            HealthStatus::Degraded | HealthStatus::Critical => "red",
            HealthStatus::Unknown => "gray",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::MinorIssues => "minor_issues",
            HealthStatus::Warning => "warning",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }
}

/// `critical` with any critical error, `warning` above 10 errors, else `healthy`
pub fn error_metrics_status(metrics: &RealTimeMetrics) -> &'static str {
    if metrics.critical_errors > 0 {
        "critical"
    } else if metrics.total_errors > 10 {
        "warning"
    } else {
        "healthy"
    }
}

pub fn health_score(metrics: &RealTimeMetrics) -> u8 {
    if metrics.critical_errors > 0 {
        0
    } else if metrics.high_errors > 5 {
        25
    } else if metrics.total_errors > 20 {
        50
    } else if metrics.total_errors > 0 {
        75
    } else {
        100
    }
}

fn envelope(kind: WidgetKind, status: &str, data: Value, now: DateTime<Utc>) -> Value {
    json!({
        "widget_id": kind.as_str(),
        "title": kind.title(),
        "status": status,
        "data": data,
        "last_updated": now.to_rfc3339(),
    })
}

/// Payload of a widget that failed to compute
pub fn error_widget(widget_id: &str, error: &WidgetError) -> Value {
    json!({
        "widget_id": widget_id,
        "status": "error",
        "error": error.to_string(),
    })
}

pub fn format_error_metrics(metrics: &RealTimeMetrics, now: DateTime<Utc>) -> Value {
    let data = json!({
        "total_errors": metrics.total_errors,
        "critical_errors": metrics.critical_errors,
        "high_errors": metrics.high_errors,
        "errors_by_service": metrics.by_service,
        "errors_by_severity": metrics.by_severity,
        "errors_by_type": metrics.by_error_type,
        "errors_by_endpoint": metrics.by_endpoint,
        "average_response_time_ms": metrics.average_response_time_ms,
        "window_minutes": metrics.window_minutes,
    });
    envelope(WidgetKind::ErrorMetrics, error_metrics_status(metrics), data, now)
}

pub fn format_system_health(metrics: &RealTimeMetrics, now: DateTime<Utc>) -> Value {
    let score = health_score(metrics);
    let health = HealthStatus::from_score(score);
    let data = json!({
        "health_score": score,
        "health_status": health.as_str(),
        "color": health.color(),
        "total_errors": metrics.total_errors,
        "critical_errors": metrics.critical_errors,
        "high_errors": metrics.high_errors,
        "services_affected": metrics.by_service.len(),
    });
    envelope(WidgetKind::SystemHealth, health.as_str(), data, now)
}

pub fn format_error_trends(points: &[TrendPoint], bucket_minutes: i64, now: DateTime<Utc>) -> Value {
    let labels: Vec<String> = points.iter().map(|p| p.bucket_start.format("%H:%M").to_string()).collect();
    let series = |name: &str, color: &str, pick: fn(&TrendPoint) -> u64| {
        json!({
            "label": name,
            "color": color,
            "data": points.iter().map(pick).collect::<Vec<u64>>(),
        })
    };
    let total: u64 = points.iter().map(|p| p.total).sum();
    let peak = points.iter().map(|p| p.total).max().unwrap_or(0);

    let data = json!({
        "labels": labels,
        "bucket_minutes": bucket_minutes,
        "datasets": [
            series("Critical", "red", |p| p.critical),
            series("High", "orange", |p| p.high),
            series("Medium", "yellow", |p| p.medium),
            series("Low", "green", |p| p.low),
        ],
        "total_errors": total,
        "peak_errors": peak,
    });
    let status = if points.last().map_or(false, |p| p.critical > 0) {
        "critical"
    } else if total > 0 {
        "active"
    } else {
        "healthy"
    };
    envelope(WidgetKind::ErrorTrends, status, data, now)
}

pub fn format_alert_summary(stats: &AlertStatistics, recent: &[Alert], now: DateTime<Utc>) -> Value {
    let recent_alerts: Vec<Value> = recent
        .iter()
        .map(|a| {
            json!({
                "id": a.id,
                "title": a.title,
                "severity": a.severity,
                "status": a.status,
                "service": a.service,
                "error_count": a.error_count,
                "escalation_level": a.escalation_level,
                "incident_ticket": a.incident_ticket(),
                "last_occurrence": a.last_occurrence.to_rfc3339(),
            })
        })
        .collect();

    let critical_active = stats.by_severity.get("critical").copied().unwrap_or(0);
    let status = if critical_active > 0 {
        "critical"
    } else if stats.active_alerts > 0 {
        "warning"
    } else {
        "healthy"
    };
    let data = json!({
        "active_alerts": stats.active_alerts,
        "alerts_by_severity": stats.by_severity,
        "alerts_by_status": stats.by_status,
        "total_created": stats.total_created,
        "total_resolved": stats.total_resolved,
        "total_escalations": stats.total_escalations,
        "recent_alerts": recent_alerts,
    });
    envelope(WidgetKind::AlertSummary, status, data, now)
}

pub fn format_resolution_summary(stats: &ResolutionStatistics, now: DateTime<Utc>) -> Value {
    let status = if stats.total_attempts == 0 || stats.success_rate >= 80.0 {
        "healthy"
    } else if stats.success_rate >= 50.0 {
        "warning"
    } else {
        "critical"
    };
    let data = json!({
        "total_attempts": stats.total_attempts,
        "successful": stats.successful,
        "failed": stats.failed,
        "rolled_back": stats.rolled_back,
        "rollback_failed": stats.rollback_failed,
        "success_rate": (stats.success_rate * 100.0).round() / 100.0,
        "by_strategy": stats.by_strategy,
    });
    envelope(WidgetKind::ResolutionSummary, status, data, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(total: u64, critical: u64, high: u64) -> RealTimeMetrics {
        RealTimeMetrics {
            total_errors: total,
            critical_errors: critical,
            high_errors: high,
            ..Default::default()
        }
    }

    #[test]
    fn test_error_metrics_status() {
        assert_eq!(error_metrics_status(&metrics(1, 1, 0)), "critical");
        assert_eq!(error_metrics_status(&metrics(11, 0, 0)), "warning");
        assert_eq!(error_metrics_status(&metrics(10, 0, 0)), "healthy");
    }

    #[test]
    fn test_health_score_ladder() {
        assert_eq!(health_score(&metrics(1, 1, 0)), 0);
        assert_eq!(health_score(&metrics(6, 0, 6)), 25);
        assert_eq!(health_score(&metrics(21, 0, 5)), 50);
        assert_eq!(health_score(&metrics(3, 0, 0)), 75);
        assert_eq!(health_score(&metrics(0, 0, 0)), 100);
    }

    #[test]
    fn test_health_labels_and_colors() {
        let expected = [
            (100, "healthy", "green"),
            (75, "minor_issues", "yellow"),
            (50, "warning", "orange"),
            (25, "degraded", "red"),
            (0, "critical", "red"),
            (60, "unknown", "gray"),
        ];
        for (score, label, color) in expected {
            let status = HealthStatus::from_score(score);
            assert_eq!(status.as_str(), label);
            assert_eq!(status.color(), color);
        }
    }

    #[test]
    fn test_system_health_payload() {
        let payload = format_system_health(&metrics(3, 0, 1), Utc::now());
        assert_eq!(payload["status"], "minor_issues");
        assert_eq!(payload["data"]["health_score"], 75);
        assert_eq!(payload["data"]["color"], "yellow");
    }

    #[test]
    fn test_widget_names() {
        for kind in WidgetKind::ALL {
            assert_eq!(kind.as_str().parse::<WidgetKind>().unwrap(), kind);
        }
        assert!("weather".parse::<WidgetKind>().is_err());
    }
}
