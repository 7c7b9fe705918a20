// shared-types-rs/src/models.rs
// Data model shared by the detector, resolution, alerting, metrics and dashboard crates

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category assigned to a classified error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    Database,
    Network,
    Timeout,
    RateLimit,
    Configuration,
    Resource,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::Authentication,
        ErrorCategory::Authorization,
        ErrorCategory::Database,
        ErrorCategory::Network,
        ErrorCategory::Timeout,
        ErrorCategory::RateLimit,
        ErrorCategory::Configuration,
        ErrorCategory::Resource,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Database => "database",
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseEnumError::UnknownCategory(s.to_string()))
    }
}

/// Severity of a classified error. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .iter()
            .copied()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| ParseEnumError::UnknownSeverity(s.to_string()))
    }
}

/// Failure to map a string onto one of the closed enums of the data model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseEnumError {
    #[error("Unknown error category: {0}")]
    UnknownCategory(String),

    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("Unknown resolution strategy: {0}")]
    UnknownStrategy(String),
}

/// An error as reported by a caller, before classification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawError {
    pub status_code: u16,
    pub message: String,
    pub service: String,
    pub endpoint: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub response_time_ms: Option<f64>,
}

/// An error after category and severity have been assigned.
///
/// Built once per raw error and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub status_code: u16,
    pub message: String,
    pub service: String,
    pub endpoint: String,
    pub request_id: String,
    pub user_id: Option<String>,
    pub category: ErrorCategory,
    pub severity: Severity,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    pub stack_trace: Option<String>,
}

impl ClassifiedError {
    /// Builds a classified error from a raw error and an already computed classification
    pub fn from_raw(raw: RawError, category: ErrorCategory, severity: Severity, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4().to_string();
        let request_id = raw.request_id.unwrap_or_else(|| id.clone());
        Self {
            id,
            timestamp: now,
            status_code: raw.status_code,
            message: raw.message,
            service: raw.service,
            endpoint: raw.endpoint,
            request_id,
            user_id: raw.user_id,
            category,
            severity,
            context: raw.context,
            stack_trace: raw.stack_trace,
        }
    }
}

/// The eight named remediation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    RetryWithBackoff,
    CircuitBreakerReset,
    RefreshCredentials,
    DatabaseReconnect,
    CacheClear,
    ServiceRestart,
    ManualIntervention,
    NoAction,
}

impl ResolutionStrategy {
    pub const ALL: [ResolutionStrategy; 8] = [
        ResolutionStrategy::RetryWithBackoff,
        ResolutionStrategy::CircuitBreakerReset,
        ResolutionStrategy::RefreshCredentials,
        ResolutionStrategy::DatabaseReconnect,
        ResolutionStrategy::CacheClear,
        ResolutionStrategy::ServiceRestart,
        ResolutionStrategy::ManualIntervention,
        ResolutionStrategy::NoAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::RetryWithBackoff => "retry_with_backoff",
            ResolutionStrategy::CircuitBreakerReset => "circuit_breaker_reset",
            ResolutionStrategy::RefreshCredentials => "refresh_credentials",
            ResolutionStrategy::DatabaseReconnect => "database_reconnect",
            ResolutionStrategy::CacheClear => "cache_clear",
            ResolutionStrategy::ServiceRestart => "service_restart",
            ResolutionStrategy::ManualIntervention => "manual_intervention",
            ResolutionStrategy::NoAction => "no_action",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ParseEnumError;

    /// Unknown names are reported, never coerced to a default strategy
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResolutionStrategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ParseEnumError::UnknownStrategy(s.to_string()))
    }
}

/// Lifecycle of a resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    RollbackRequired,
    RollbackSuccess,
    RollbackFailed,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Pending => "pending",
            ResolutionStatus::InProgress => "in_progress",
            ResolutionStatus::Success => "success",
            ResolutionStatus::Failed => "failed",
            ResolutionStatus::RollbackRequired => "rollback_required",
            ResolutionStatus::RollbackSuccess => "rollback_success",
            ResolutionStatus::RollbackFailed => "rollback_failed",
        }
    }

    /// Whether the attempt has reached a state it only leaves through rollback (or never)
    pub fn is_concluded(&self) -> bool {
        !matches!(
            self,
            ResolutionStatus::Pending | ResolutionStatus::InProgress | ResolutionStatus::RollbackRequired
        )
    }

    /// Legal edges of the attempt state machine
    pub fn can_transition_to(&self, next: ResolutionStatus) -> bool {
        use ResolutionStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Success)
                | (InProgress, Failed)
                | (Success, RollbackRequired)
                | (RollbackRequired, RollbackSuccess)
                | (RollbackRequired, RollbackFailed)
        )
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single run of a remediation strategy against a classified error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAttempt {
    pub id: String,
    pub error_id: String,
    pub strategy: ResolutionStrategy,
    pub status: ResolutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub error_message: Option<String>,
    /// Opaque state consumed only by the matching rollback routine
    pub rollback_data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Conditions of an alert rule. Every present key must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertConditions {
    #[serde(default)]
    pub status_codes: Option<Vec<u16>>,
    #[serde(default)]
    pub categories: Option<Vec<ErrorCategory>>,
    #[serde(default)]
    pub services: Option<Vec<String>>,
    /// Not evaluated yet; always passes
    #[serde(default)]
    pub error_rate_threshold: Option<f64>,
    /// Not evaluated yet; always passes
    #[serde(default)]
    pub consecutive_errors: Option<u32>,
}

/// Declarative alerting rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub conditions: AlertConditions,
    pub notification_channels: Vec<String>,
    pub escalation_delay_minutes: i64,
    pub max_escalations: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Escalated,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Escalated => "escalated",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live alert, unique per (rule, service, endpoint)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub error_id: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub title: String,
    pub description: String,
    pub service: String,
    pub endpoint: String,
    pub error_count: u64,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub escalation_level: u32,
    pub next_escalation_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Alert {
    /// Deduplication key of the alert
    pub fn key(&self) -> String {
        alert_key(&self.rule_id, &self.service, &self.endpoint)
    }

    pub fn incident_ticket(&self) -> Option<&str> {
        self.metadata.get("incident_ticket").and_then(|v| v.as_str())
    }
}

/// Builds the `rule_id#service#endpoint` deduplication key
pub fn alert_key(rule_id: &str, service: &str, endpoint: &str) -> String {
    format!("{}#{}#{}", rule_id, service, endpoint)
}

/// One recorded error occurrence as seen by the metrics collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetric {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub endpoint: String,
    pub error_type: String,
    pub severity: Severity,
    pub count: u64,
    #[serde(default)]
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub resolution_attempt_id: Option<String>,
}

impl ErrorMetric {
    /// Cache key `service:endpoint:error_type`
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.service, self.endpoint, self.error_type)
    }
}
