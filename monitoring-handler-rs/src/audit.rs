// monitoring-handler-rs/src/audit.rs
// Append-only audit trail of classification, resolution and alert events.
//
// Events are written to the `audit_log` table of the key-value store, one
// record per event keyed by event id. Existing records are never rewritten.
// Write failures are logged and counted but never surface to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_types::{Alert, ClassifiedError, KeyValueStore, ResolutionAttempt, StoreError};

pub const AUDIT_TABLE: &str = "audit_log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    ErrorClassified,
    ResolutionAttempted,
    ResolutionRolledBack,
    AlertCreated,
    AlertAcknowledged,
    AlertResolved,
    AlertEscalated,
    DashboardExported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub kind: AuditEventKind,
    /// Id of the error, attempt or alert the event is about
    pub subject_id: String,
    pub service: Option<String>,
    pub request_id: Option<String>,
    pub actor: Option<String>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new<S: Into<String>>(kind: AuditEventKind, subject_id: S, details: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            subject_id: subject_id.into(),
            service: None,
            request_id: error_handling::current_correlation_id(),
            actor: None,
            details,
            created_at: Utc::now(),
        }
    }

    pub fn service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn actor<S: Into<String>>(mut self, actor: S) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn classified(error: &ClassifiedError) -> Self {
        let mut event = Self::new(
            AuditEventKind::ErrorClassified,
            &error.id,
            json!({
                "category": error.category,
                "severity": error.severity,
                "status_code": error.status_code,
                "endpoint": error.endpoint,
            }),
        )
        .service(&error.service);
        event.request_id = Some(error.request_id.clone());
        event
    }

    pub fn resolution(attempt: &ResolutionAttempt) -> Self {
        Self::new(
            AuditEventKind::ResolutionAttempted,
            &attempt.id,
            json!({
                "error_id": attempt.error_id,
                "strategy": attempt.strategy,
                "status": attempt.status,
                "success": attempt.success,
                "error_message": attempt.error_message,
            }),
        )
    }

    /// Outcome of a rollback that ran, successful or not
    pub fn rollback(attempt: &ResolutionAttempt, rolled_back: bool) -> Self {
        let mut event = Self::new(
            AuditEventKind::ResolutionRolledBack,
            &attempt.id,
            json!({
                "error_id": attempt.error_id,
                "strategy": attempt.strategy,
                "status": attempt.status,
                "rolled_back": rolled_back,
                "rollback_error": attempt.metadata.get("rollback_error"),
            }),
        );
        event.service = attempt.metadata.get("service").and_then(Value::as_str).map(str::to_string);
        event
    }

    /// Full alert snapshot; resolved alerts are archived through this record
    pub fn alert(kind: AuditEventKind, alert: &Alert) -> Self {
        let snapshot = serde_json::to_value(alert).unwrap_or(Value::Null);
        Self::new(kind, &alert.id, snapshot).service(&alert.service)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub written: u64,
    pub failed: u64,
}

/// Best-effort audit writer
pub struct AuditLogger {
    store: Arc<dyn KeyValueStore>,
    table: String,
    written: AtomicU64,
    failed: AtomicU64,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_table(store, AUDIT_TABLE)
    }

    pub fn with_table<S: Into<String>>(store: Arc<dyn KeyValueStore>, table: S) -> Self {
        Self {
            store,
            table: table.into(),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Writes one event; returns whether it was stored
    pub async fn record(&self, event: AuditEvent) -> bool {
        let item = match serde_json::to_value(&event) {
            Ok(item) => item,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(event_id = %event.id, error = %e, "Failed to serialize audit event");
                return false;
            }
        };

        match self.store.put(&self.table, &event.id, item).await {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
                debug!(event_id = %event.id, kind = ?event.kind, subject_id = %event.subject_id, "Audit event recorded");
                true
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(event_id = %event.id, kind = ?event.kind, error = %e, "Failed to write audit event");
                false
            }
        }
    }

    pub async fn record_all(&self, events: Vec<AuditEvent>) {
        for event in events {
            self.record(event).await;
        }
    }

    /// Events about one subject, oldest first
    pub async fn events_for(&self, subject_id: &str) -> Result<Vec<AuditEvent>, StoreError> {
        let mut events: Vec<AuditEvent> = self
            .store
            .scan(&self.table)
            .await?
            .into_iter()
            .filter_map(|item| serde_json::from_value::<AuditEvent>(item).ok())
            .filter(|e| e.subject_id == subject_id)
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    pub fn statistics(&self) -> AuditStatistics {
        AuditStatistics {
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
