// monitoring-handler-rs/src/pipeline.rs
// End-to-end flow for one raw error: classify, resolve and alert, record metrics

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use metrics_collector::metric_from_error;
use shared_types::{Alert, ClassifiedError, RawError, ResolutionAttempt};

use crate::audit::{AuditEvent, AuditEventKind};
use crate::context::ProcessContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub error: ClassifiedError,
    pub resolution: ResolutionAttempt,
    /// Alerts created or updated by this error
    pub alerts: Vec<Alert>,
}

/// Runs one raw error through the whole core.
///
/// Every classified error counts as a failure on its service's circuit before
/// a strategy is chosen. Resolution and alert evaluation run concurrently on independent engines.
/// Metric recording and auditing are best-effort and never fail the call.
#[instrument(skip(ctx, raw), fields(service = %raw.service, status_code = raw.status_code))]
pub async fn process_error(ctx: &ProcessContext, raw: RawError) -> PipelineOutcome {
    let response_time_ms = raw.response_time_ms;
    let error = ctx.detector.lock().await.detect(raw);

    let (resolution, alerts) = tokio::join!(
        async {
            let mut resolutions = ctx.resolutions.lock().await;
            resolutions.record_service_failure(&error);
            resolutions.resolve(&error, None, None).await
        },
        async { ctx.alerts.lock().await.evaluate(&error).await },
    );

    let metric = metric_from_error(&error, response_time_ms, Some(resolution.id.clone()));
    ctx.metrics.lock().await.collect(metric).await;

    let mut events = vec![AuditEvent::classified(&error), AuditEvent::resolution(&resolution)];
    events.extend(
        alerts
            .iter()
            .filter(|a| a.error_count == 1)
            .map(|a| AuditEvent::alert(AuditEventKind::AlertCreated, a)),
    );
    ctx.audit.record_all(events).await;

    info!(
        error_id = %error.id,
        category = %error.category,
        severity = %error.severity,
        strategy = %resolution.strategy,
        resolution_status = %resolution.status,
        alerts = alerts.len(),
        "Error processed"
    );

    PipelineOutcome {
        error,
        resolution,
        alerts,
    }
}

/// Escalates every overdue alert and audits the escalations
pub async fn process_escalations(ctx: &ProcessContext) -> Vec<Alert> {
    let escalated = ctx.alerts.lock().await.process_escalations().await;
    ctx.audit
        .record_all(
            escalated
                .iter()
                .map(|a| AuditEvent::alert(AuditEventKind::AlertEscalated, a))
                .collect(),
        )
        .await;
    escalated
}

#[cfg(test)]
mod tests {
    use super::*;
    use error_handling::CircuitState;
    use shared_types::{ErrorCategory, MonitoringConfig, ResolutionStatus, ResolutionStrategy, Severity};

    fn raw(status_code: u16, message: &str) -> RawError {
        RawError {
            status_code,
            message: message.to_string(),
            service: "rds-discovery".to_string(),
            endpoint: "/api/instances".to_string(),
            response_time_ms: Some(120.0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_database_error_runs_every_stage() {
        let ctx = ProcessContext::in_memory(MonitoringConfig::for_tests());
        let outcome = process_error(&ctx, raw(500, "Database connection failed")).await;

        assert_eq!(outcome.error.category, ErrorCategory::Database);
        assert_eq!(outcome.error.severity, Severity::Critical);
        assert!(outcome.resolution.status.is_concluded());
        assert_eq!(outcome.resolution.status, ResolutionStatus::Success);
        assert!(!outcome.alerts.is_empty());

        let snapshot = ctx.metrics.lock().await.real_time_metrics();
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.critical_errors, 1);

        let audit = ctx.audit.events_for(&outcome.error.id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].kind, AuditEventKind::ErrorClassified);
    }

    #[tokio::test]
    async fn test_classified_errors_open_the_service_circuit() {
        let ctx = ProcessContext::in_memory(MonitoringConfig::for_tests());
        let mut last = None;
        for _ in 0..5 {
            last = Some(process_error(&ctx, raw(500, "Database connection failed")).await);
        }
        let error = last.unwrap().error;

        let mut resolutions = ctx.resolutions.lock().await;
        let health = resolutions.circuit_health();
        assert_eq!(health["rds-discovery"].state, CircuitState::Open);
        assert_eq!(health["rds-discovery"].failure_count, 5);

        let reset = resolutions
            .resolve(&error, Some(ResolutionStrategy::CircuitBreakerReset), None)
            .await;
        let rollback_data = reset.rollback_data.clone().unwrap();
        assert_eq!(rollback_data["previous_state"], "open");
        assert_eq!(resolutions.circuit_health()["rds-discovery"].state, CircuitState::Closed);

        assert!(resolutions.rollback(&reset.id).await.unwrap());
        assert_eq!(resolutions.circuit_health()["rds-discovery"].state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_low_severity_error_raises_no_alert() {
        let ctx = ProcessContext::in_memory(MonitoringConfig::for_tests());
        let outcome = process_error(&ctx, raw(404, "Instance not found")).await;

        assert!(outcome.alerts.is_empty());
        assert!(outcome.resolution.status.is_concluded());
    }
}
