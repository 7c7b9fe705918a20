// monitoring-handler-rs/src/handler.rs
// Lambda-style request router.
//
// Every event is a JSON object carrying an `operation` (or `action`) field,
// either at the top level or inside a string `body` as API Gateway delivers
// it. Every response is `{statusCode, headers, body}` with CORS headers
// attached, and failures use the `{error, message[, remediation]}` body.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use dashboard::{export_dashboard, DashboardData, EngineSource};
use error_handling::{Error, Result};
use metrics_collector::{MetricType, MAX_WINDOW_MINUTES};
use shared_types::{AlertStatus, ClassifiedError, RawError, ResolutionStatus, Severity};

use crate::audit::{AuditEvent, AuditEventKind};
use crate::context::ProcessContext;
use crate::pipeline;

const DEFAULT_ERROR_RATE_WINDOW_MINUTES: i64 = 5;
const DEFAULT_METRICS_WINDOW_MINUTES: i64 = 60;
const DEFAULT_EXPORT_PREFIX: &str = "dashboards";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    DetectError,
    ProcessError,
    ResolveError,
    RollbackResolution,
    GetResolution,
    EvaluateAlerts,
    AcknowledgeAlert,
    ResolveAlert,
    ListAlerts,
    ProcessEscalations,
    GetMetrics,
    GetErrorRate,
    GetDashboard,
    ExportDashboard,
    HealthCheck,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Operation::DetectError,
        Operation::ProcessError,
        Operation::ResolveError,
        Operation::RollbackResolution,
        Operation::GetResolution,
        Operation::EvaluateAlerts,
        Operation::AcknowledgeAlert,
        Operation::ResolveAlert,
        Operation::ListAlerts,
        Operation::ProcessEscalations,
        Operation::GetMetrics,
        Operation::GetErrorRate,
        Operation::GetDashboard,
        Operation::ExportDashboard,
        Operation::HealthCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::DetectError => "detect_error",
            Operation::ProcessError => "process_error",
            Operation::ResolveError => "resolve_error",
            Operation::RollbackResolution => "rollback_resolution",
            Operation::GetResolution => "get_resolution",
            Operation::EvaluateAlerts => "evaluate_alerts",
            Operation::AcknowledgeAlert => "acknowledge_alert",
            Operation::ResolveAlert => "resolve_alert",
            Operation::ListAlerts => "list_alerts",
            Operation::ProcessEscalations => "process_escalations",
            Operation::GetMetrics => "get_metrics",
            Operation::GetErrorRate => "get_error_rate",
            Operation::GetDashboard => "get_dashboard",
            Operation::ExportDashboard => "export_dashboard",
            Operation::HealthCheck => "health_check",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                Error::validation(format!("Unknown operation: {}", s))
                    .code("UNKNOWN_OPERATION")
                    .context("supported", Operation::ALL.iter().map(Operation::as_str).collect::<Vec<_>>())
            })
    }
}

/// API Gateway proxy response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl LambdaResponse {
    pub fn json(status_code: u16, body: &Value) -> Self {
        Self {
            status_code,
            headers: cors_headers(),
            body: body.to_string(),
        }
    }

    pub fn ok(body: &Value) -> Self {
        Self::json(200, body)
    }

    pub fn from_error(err: &Error) -> Self {
        Self::json(err.status_code(), &err.to_body())
    }

    /// Parsed body
    pub fn body_json(&self) -> std::result::Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

pub fn cors_headers() -> BTreeMap<String, String> {
    [
        ("Content-Type", "application/json"),
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "Content-Type,X-Api-Key,Authorization"),
        ("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Handles one invocation. Never fails: errors become error responses.
pub async fn handle_event(ctx: &ProcessContext, event: Value) -> LambdaResponse {
    let started = Instant::now();
    let invocation = ctx.begin_invocation();
    let request_id = request_id(&event);
    error_handling::set_correlation_id(request_id.clone());

    let (operation, result) = match unwrap_payload(event) {
        Ok(payload) => match operation_of(&payload) {
            Ok(op) => {
                debug!(operation = %op, invocation, request_id = %request_id, "Dispatching operation");
                (Some(op), dispatch(ctx, op, &payload).await)
            }
            Err(e) => (None, Err(e)),
        },
        Err(e) => (None, Err(e)),
    };

    let op_name = operation.map_or("unknown", |op| op.as_str());
    let response = match result {
        Ok(body) => LambdaResponse::ok(&body),
        Err(mut err) => {
            err.correlation_id.get_or_insert_with(|| request_id.clone());
            let err = err.with_detected_remediation();
            error_handling::log_handler_error(&err);
            LambdaResponse::from_error(&err)
        }
    };

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    counter!(
        "handler.requests",
        1,
        "operation" => op_name,
        "status" => response.status_code.to_string()
    );
    histogram!("handler.duration_ms", elapsed_ms, "operation" => op_name);
    info!(
        operation = op_name,
        status_code = response.status_code,
        duration_ms = elapsed_ms,
        request_id = %request_id,
        "Request completed"
    );
    error_handling::logging::clear_correlation_id();
    response
}

fn request_id(event: &Value) -> String {
    event
        .pointer("/requestContext/requestId")
        .or_else(|| event.get("request_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Extracts the operation payload, decoding a string `body` when present
fn unwrap_payload(event: Value) -> Result<Map<String, Value>> {
    let payload = match event {
        Value::Object(mut map) => match map.remove("body") {
            Some(Value::String(body)) => serde_json::from_str::<Value>(&body)?,
            Some(body @ Value::Object(_)) => body,
            Some(_) | None => Value::Object(map),
        },
        _ => return Err(Error::validation("Request must be a JSON object").code("INVALID_REQUEST")),
    };
    match payload {
        Value::Object(map) => Ok(map),
        _ => Err(Error::validation("Request body must be a JSON object").code("INVALID_REQUEST")),
    }
}

fn operation_of(payload: &Map<String, Value>) -> Result<Operation> {
    payload
        .get("operation")
        .or_else(|| payload.get("action"))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::validation("Missing required field: operation").code("MISSING_FIELD"))?
        .parse()
}

async fn dispatch(ctx: &ProcessContext, op: Operation, payload: &Map<String, Value>) -> Result<Value> {
    match op {
        Operation::DetectError => detect_error(ctx, payload).await,
        Operation::ProcessError => process_error(ctx, payload).await,
        Operation::ResolveError => resolve_error(ctx, payload).await,
        Operation::RollbackResolution => rollback_resolution(ctx, payload).await,
        Operation::GetResolution => get_resolution(ctx, payload).await,
        Operation::EvaluateAlerts => evaluate_alerts(ctx, payload).await,
        Operation::AcknowledgeAlert => acknowledge_alert(ctx, payload).await,
        Operation::ResolveAlert => resolve_alert(ctx, payload).await,
        Operation::ListAlerts => list_alerts(ctx, payload).await,
        Operation::ProcessEscalations => process_escalations(ctx).await,
        Operation::GetMetrics => get_metrics(ctx, payload).await,
        Operation::GetErrorRate => get_error_rate(ctx, payload).await,
        Operation::GetDashboard => get_dashboard(ctx, payload).await,
        Operation::ExportDashboard => export(ctx, payload).await,
        Operation::HealthCheck => health_check(ctx).await,
    }
}

// ---- field helpers ----

fn required_str<'a>(payload: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::validation(format!("Missing required field: {}", field)).code("MISSING_FIELD"))
}

fn optional<T: DeserializeOwned>(payload: &Map<String, Value>, field: &str) -> Result<Option<T>> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
            Error::validation(format!("Invalid field {}: {}", field, e)).code("INVALID_FIELD")
        }),
    }
}

fn required<T: DeserializeOwned>(payload: &Map<String, Value>, field: &str) -> Result<T> {
    optional(payload, field)?
        .ok_or_else(|| Error::validation(format!("Missing required field: {}", field)).code("MISSING_FIELD"))
}

fn raw_error(payload: &Map<String, Value>) -> Result<RawError> {
    let raw: RawError = required(payload, "error")?;
    if raw.service.trim().is_empty() {
        return Err(Error::validation("error.service must not be empty").code("INVALID_FIELD"));
    }
    Ok(raw)
}

/// An already classified error, or a raw one classified on the spot
async fn classified_error(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<ClassifiedError> {
    let value = payload
        .get("error")
        .ok_or_else(|| Error::validation("Missing required field: error").code("MISSING_FIELD"))?;
    if let Ok(error) = serde_json::from_value::<ClassifiedError>(value.clone()) {
        return Ok(error);
    }
    let raw = raw_error(payload)?;
    let error = ctx.detector.lock().await.detect(raw);
    ctx.audit.record(AuditEvent::classified(&error)).await;
    Ok(error)
}

// ---- operations ----

async fn detect_error(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let raw = raw_error(payload)?;
    let error = ctx.detector.lock().await.detect(raw);
    ctx.audit.record(AuditEvent::classified(&error)).await;
    Ok(json!({ "error": error }))
}

async fn process_error(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let raw = raw_error(payload)?;
    let outcome = pipeline::process_error(ctx, raw).await;
    Ok(serde_json::to_value(outcome)?)
}

async fn resolve_error(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let strategy: Option<String> = optional(payload, "strategy")?;
    let context: Option<Map<String, Value>> = optional(payload, "context")?;
    let error = classified_error(ctx, payload).await?;

    let attempt = ctx
        .resolutions
        .lock()
        .await
        .resolve_named(&error, strategy.as_deref(), context)
        .await?;
    ctx.audit.record(AuditEvent::resolution(&attempt)).await;
    Ok(json!({ "attempt": attempt }))
}

async fn rollback_resolution(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let attempt_id = required_str(payload, "attempt_id")?;
    let mut resolutions = ctx.resolutions.lock().await;
    // Refused rollbacks leave the attempt untouched and are not audited
    let attempted = resolutions
        .get_attempt(attempt_id)
        .map_or(false, |a| a.status == ResolutionStatus::Success);
    let rolled_back = resolutions.rollback(attempt_id).await?;
    let attempt = resolutions.get_attempt(attempt_id).cloned();
    drop(resolutions);

    if let Some(attempt) = attempt.as_ref().filter(|_| attempted) {
        ctx.audit.record(AuditEvent::rollback(attempt, rolled_back)).await;
    }
    Ok(json!({
        "attempt_id": attempt_id,
        "rolled_back": rolled_back,
        "attempt": attempt,
    }))
}

async fn get_resolution(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let resolutions = ctx.resolutions.lock().await;
    if let Some(attempt_id) = payload.get("attempt_id").and_then(Value::as_str) {
        let attempt = resolutions.get_attempt(attempt_id).ok_or_else(|| {
            Error::not_found(format!("Resolution attempt not found: {}", attempt_id)).code("RESOLUTION_NOT_FOUND")
        })?;
        return Ok(json!({ "attempt": attempt }));
    }
    if let Some(error_id) = payload.get("error_id").and_then(Value::as_str) {
        let attempts = resolutions.attempts_for_error(error_id);
        return Ok(json!({ "error_id": error_id, "attempts": attempts, "count": attempts.len() }));
    }
    let limit: usize = optional(payload, "limit")?.unwrap_or(20);
    let attempts = resolutions.recent_attempts(limit);
    Ok(json!({
        "attempts": attempts,
        "count": attempts.len(),
        "statistics": resolutions.statistics(),
    }))
}

async fn evaluate_alerts(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let error = classified_error(ctx, payload).await?;
    let alerts = ctx.alerts.lock().await.evaluate(&error).await;
    ctx.audit
        .record_all(
            alerts
                .iter()
                .filter(|a| a.error_count == 1)
                .map(|a| AuditEvent::alert(AuditEventKind::AlertCreated, a))
                .collect(),
        )
        .await;
    Ok(json!({ "error_id": error.id, "alerts": alerts, "count": alerts.len() }))
}

async fn acknowledge_alert(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let alert_id = required_str(payload, "alert_id")?;
    let user = required_str(payload, "acknowledged_by")?;
    let alert = ctx.alerts.lock().await.acknowledge(alert_id, user)?;
    ctx.audit
        .record(AuditEvent::alert(AuditEventKind::AlertAcknowledged, &alert).actor(user))
        .await;
    Ok(json!({ "alert": alert }))
}

async fn resolve_alert(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let alert_id = required_str(payload, "alert_id")?;
    let alert = ctx.alerts.lock().await.resolve(alert_id)?;

    let mut event = AuditEvent::alert(AuditEventKind::AlertResolved, &alert);
    if let Some(user) = payload.get("resolved_by").and_then(Value::as_str) {
        event = event.actor(user);
    }
    let archived = ctx.audit.record(event).await;
    Ok(json!({ "alert": alert, "archived": archived }))
}

async fn list_alerts(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let severity: Option<Severity> = optional(payload, "severity")?;
    let status: Option<AlertStatus> = optional(payload, "status")?;
    let service: Option<String> = optional(payload, "service")?;

    let engine = ctx.alerts.lock().await;
    let alerts: Vec<_> = engine
        .active_alerts()
        .into_iter()
        .filter(|a| severity.map_or(true, |s| a.severity == s))
        .filter(|a| status.map_or(true, |s| a.status == s))
        .filter(|a| service.as_deref().map_or(true, |s| a.service == s))
        .collect();
    Ok(json!({
        "alerts": alerts,
        "count": alerts.len(),
        "statistics": engine.statistics(),
    }))
}

async fn process_escalations(ctx: &ProcessContext) -> Result<Value> {
    let escalated = pipeline::process_escalations(ctx).await;
    Ok(json!({ "escalated": escalated, "count": escalated.len() }))
}

fn check_window(window_minutes: i64) -> Result<()> {
    if !(1..=MAX_WINDOW_MINUTES).contains(&window_minutes) {
        return Err(Error::validation(format!(
            "window_minutes must be between 1 and {}",
            MAX_WINDOW_MINUTES
        ))
        .code("INVALID_FIELD"));
    }
    Ok(())
}

async fn get_metrics(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let names: Option<Vec<String>> = optional(payload, "metric_types")?;
    let window_minutes: i64 = optional(payload, "window_minutes")?.unwrap_or(DEFAULT_METRICS_WINDOW_MINUTES);
    let group_by_service: bool = optional(payload, "group_by_service")?.unwrap_or(false);
    check_window(window_minutes)?;

    let mut metrics = ctx.metrics.lock().await;
    let real_time = metrics.real_time_metrics();
    let aggregated = match names {
        Some(names) => {
            let types = names
                .iter()
                .map(|n| n.parse::<MetricType>())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let points = metrics.aggregated_metrics(&types, window_minutes, group_by_service).await?;
            Some(points)
        }
        None => None,
    };
    Ok(json!({
        "real_time": real_time,
        "aggregated": aggregated,
        "window_minutes": window_minutes,
        "collector": metrics.statistics(),
    }))
}

async fn get_error_rate(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let service = required_str(payload, "service")?;
    let window_minutes: i64 = optional(payload, "window_minutes")?.unwrap_or(DEFAULT_ERROR_RATE_WINDOW_MINUTES);
    check_window(window_minutes)?;
    let rate = ctx.metrics.lock().await.error_rate(service, window_minutes).await?;
    Ok(json!({
        "service": service,
        "window_minutes": window_minutes,
        "error_rate": rate,
    }))
}

async fn build_dashboard(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<DashboardData> {
    let widgets: Vec<String> = optional(payload, "widgets")?.unwrap_or_default();

    let mut metrics = ctx.metrics.lock().await;
    let alerts = ctx.alerts.lock().await;
    let resolutions = ctx.resolutions.lock().await;
    let mut source = EngineSource {
        metrics: &mut metrics,
        alerts: &alerts,
        resolutions: &resolutions,
    };
    Ok(ctx.dashboard.build(&mut source, &widgets).await)
}

async fn get_dashboard(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let data = build_dashboard(ctx, payload).await?;
    Ok(serde_json::to_value(data)?)
}

async fn export(ctx: &ProcessContext, payload: &Map<String, Value>) -> Result<Value> {
    let prefix: String = optional(payload, "prefix")?.unwrap_or_else(|| DEFAULT_EXPORT_PREFIX.to_string());
    let data = build_dashboard(ctx, payload).await?;
    let key = export_dashboard(&data, ctx.backends.objects.as_ref(), &prefix).await?;

    ctx.audit
        .record(AuditEvent::new(
            AuditEventKind::DashboardExported,
            &key,
            json!({ "widgets": data.widgets.len(), "failed_widgets": data.failed_widgets }),
        ))
        .await;
    Ok(json!({
        "key": key,
        "generated_at": data.generated_at,
        "widgets": data.widgets.keys().collect::<Vec<_>>(),
        "failed_widgets": data.failed_widgets,
    }))
}

async fn health_check(ctx: &ProcessContext) -> Result<Value> {
    let detector = ctx.detector.lock().await.statistics().clone();
    let (resolutions, circuits) = {
        let mut executor = ctx.resolutions.lock().await;
        (executor.statistics(), executor.circuit_health())
    };
    let alerts = ctx.alerts.lock().await.statistics();
    let metrics = ctx.metrics.lock().await.statistics();
    Ok(json!({
        "status": "healthy",
        "service": ctx.config.service_name,
        "environment": ctx.config.environment,
        "uptime_secs": ctx.uptime_secs(),
        "invocations": ctx.invocations(),
        "components": {
            "error_detector": detector,
            "resolution_engine": resolutions,
            "circuits": circuits,
            "alert_engine": alerts,
            "metrics_collector": metrics,
            "audit": ctx.audit.statistics(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::MonitoringConfig;

    fn ctx() -> ProcessContext {
        ProcessContext::in_memory(MonitoringConfig::for_tests())
    }

    #[test]
    fn test_operation_names() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        let err = "drop_tables".parse::<Operation>().unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_string_body_is_decoded() {
        let event = json!({ "body": "{\"operation\":\"health_check\"}", "headers": {} });
        let payload = unwrap_payload(event).unwrap();
        assert_eq!(operation_of(&payload).unwrap(), Operation::HealthCheck);
    }

    #[test]
    fn test_action_alias() {
        let payload = unwrap_payload(json!({ "action": "list_alerts" })).unwrap();
        assert_eq!(operation_of(&payload).unwrap(), Operation::ListAlerts);
    }

    #[tokio::test]
    async fn test_responses_carry_cors_headers() {
        let ctx = ctx();
        let ok = handle_event(&ctx, json!({ "operation": "health_check" })).await;
        let failed = handle_event(&ctx, json!({ "operation": "nope" })).await;

        for response in [&ok, &failed] {
            assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
            assert_eq!(response.headers["Content-Type"], "application/json");
        }
        assert_eq!(ok.status_code, 200);
        assert_eq!(failed.status_code, 400);
        assert_eq!(failed.body_json().unwrap()["error"], "ValidationError");
    }

    #[tokio::test]
    async fn test_missing_operation_is_rejected() {
        let response = handle_event(&ctx(), json!({ "error": {} })).await;
        assert_eq!(response.status_code, 400);
        let body = response.body_json().unwrap();
        assert_eq!(body["message"], "Missing required field: operation");
        assert_eq!(body["code"], "MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_metric_windows_out_of_range_are_rejected() {
        let ctx = ctx();
        for window in [json!(-5), json!(0), json!(MAX_WINDOW_MINUTES + 1), json!(100_000_000_000_000i64)] {
            for operation in ["get_error_rate", "get_metrics"] {
                let event = json!({
                    "operation": operation,
                    "service": "rds-discovery",
                    "metric_types": ["error_count"],
                    "window_minutes": window,
                });
                let response = handle_event(&ctx, event).await;
                assert_eq!(response.status_code, 400, "{} accepted window {}", operation, window);
                assert_eq!(response.body_json().unwrap()["code"], "INVALID_FIELD");
            }
        }

        let widest = json!({
            "operation": "get_error_rate",
            "service": "rds-discovery",
            "window_minutes": MAX_WINDOW_MINUTES,
        });
        assert_eq!(handle_event(&ctx, widest).await.status_code, 200);
    }

    #[tokio::test]
    async fn test_request_id_is_echoed_on_errors() {
        let event = json!({
            "operation": "get_resolution",
            "attempt_id": "missing",
            "requestContext": { "requestId": "req-42" },
        });
        let response = handle_event(&ctx(), event).await;
        assert_eq!(response.status_code, 404);
        assert_eq!(response.body_json().unwrap()["request_id"], "req-42");
    }
}
