// alert-engine-rs/src/engine.rs
// Alert lifecycle: evaluation, deduplication, escalation, acknowledgement, resolution

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use error_handling::sanitize_message;
use shared_types::{alert_key, Alert, AlertRule, AlertStatus, ClassifiedError, Severity};

use crate::error::AlertError;
use crate::notifications::NotificationDispatcher;
use crate::rules::{default_rules, matches};

/// `INC-YYYYMMDD-XXXXXXXX`
pub fn incident_ticket_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("INC-{}-{}", now.format("%Y%m%d"), suffix)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub active_alerts: usize,
    pub by_status: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub total_created: u64,
    pub total_resolved: u64,
    pub total_escalations: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
}

/// In-memory alert engine.
///
/// At most one live alert exists per `rule_id#service#endpoint`; repeat
/// matches update it in place.
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    alerts: HashMap<String, Alert>,
    keys_by_id: HashMap<String, String>,
    dispatcher: NotificationDispatcher,
    stats: AlertStatistics,
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("rules", &self.rules.len())
            .field("active_alerts", &self.alerts.len())
            .finish()
    }
}

impl AlertEngine {
    pub fn new(dispatcher: NotificationDispatcher) -> Self {
        Self::with_rules(default_rules(), dispatcher)
    }

    pub fn with_rules(rules: Vec<AlertRule>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            rules,
            alerts: HashMap::new(),
            keys_by_id: HashMap::new(),
            dispatcher,
            stats: AlertStatistics::default(),
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    fn rule(&self, rule_id: &str) -> Option<&AlertRule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }

    pub async fn evaluate(&mut self, error: &ClassifiedError) -> Vec<Alert> {
        self.evaluate_at(error, Utc::now()).await
    }

    /// Creates or updates one alert per matching rule and returns them
    pub async fn evaluate_at(&mut self, error: &ClassifiedError, now: DateTime<Utc>) -> Vec<Alert> {
        let matched: Vec<AlertRule> = self.rules.iter().filter(|r| matches(r, error)).cloned().collect();
        let mut touched = Vec::with_capacity(matched.len());

        for rule in matched {
            let key = alert_key(&rule.id, &error.service, &error.endpoint);
            let notify = match self.alerts.get_mut(&key) {
                Some(alert) => {
                    alert.error_count += 1;
                    alert.last_occurrence = now;
                    alert
                        .metadata
                        .insert("last_error_id".to_string(), json!(error.id));
                    let escalated = Self::escalate_if_due(alert, &rule, now);
                    if escalated {
                        self.stats.total_escalations += 1;
                    }
                    escalated
                }
                None => {
                    let alert = self.create_alert(&rule, error, now);
                    self.keys_by_id.insert(alert.id.clone(), key.clone());
                    self.alerts.insert(key.clone(), alert);
                    self.stats.total_created += 1;
                    counter!("alerts.created", 1, "rule" => rule.id.clone(), "severity" => rule.severity.as_str());
                    true
                }
            };

            if let Some(alert) = self.alerts.get(&key).cloned() {
                if notify {
                    self.notify(&alert, &rule).await;
                }
                touched.push(alert);
            }
        }

        gauge!("alerts.active", self.alerts.len() as f64);
        touched
    }

    fn create_alert(&self, rule: &AlertRule, error: &ClassifiedError, now: DateTime<Utc>) -> Alert {
        let mut alert = Alert {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            error_id: error.id.clone(),
            severity: rule.severity,
            status: AlertStatus::Active,
            title: format!("{}: {} {}", rule.name, error.service, error.endpoint),
            description: sanitize_message(&format!(
                "{} (status {}, category {}, severity {})",
                error.message, error.status_code, error.category, error.severity
            )),
            service: error.service.clone(),
            endpoint: error.endpoint.clone(),
            error_count: 1,
            first_occurrence: now,
            last_occurrence: now,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            escalation_level: 0,
            next_escalation_at: Some(now + Duration::minutes(rule.escalation_delay_minutes)),
            metadata: HashMap::new(),
        };
        alert.metadata.insert("category".to_string(), json!(error.category));
        alert.metadata.insert("status_code".to_string(), json!(error.status_code));
        alert.metadata.insert("request_id".to_string(), json!(error.request_id));

        if alert.severity == Severity::Critical {
            let ticket = incident_ticket_id(now);
            info!(alert_id = %alert.id, ticket = %ticket, "Incident ticket opened");
            alert.metadata.insert("incident_ticket".to_string(), json!(ticket));
        }

        info!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            severity = %alert.severity,
            service = %alert.service,
            "Alert created"
        );
        alert
    }

    /// Escalates when the timer has passed and the rule allows another level.
    ///
    /// The timer is pushed forward on every escalation, including the last one;
    /// the `max_escalations` check is what stops a capped alert.
    fn escalate_if_due(alert: &mut Alert, rule: &AlertRule, now: DateTime<Utc>) -> bool {
        if !matches!(alert.status, AlertStatus::Active | AlertStatus::Escalated) {
            return false;
        }
        let due = alert.next_escalation_at.map_or(false, |at| at <= now);
        if !due || alert.escalation_level >= rule.max_escalations {
            return false;
        }

        alert.escalation_level += 1;
        alert.status = AlertStatus::Escalated;
        alert.next_escalation_at = Some(now + Duration::minutes(rule.escalation_delay_minutes));

        warn!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            level = alert.escalation_level,
            max = rule.max_escalations,
            "Alert escalated"
        );
        counter!("alerts.escalations", 1, "rule" => rule.id.clone());
        true
    }

    async fn notify(&mut self, alert: &Alert, rule: &AlertRule) {
        let results = self.dispatcher.send(alert, rule).await;
        for delivered in results.values() {
            if *delivered {
                self.stats.notifications_sent += 1;
            } else {
                self.stats.notifications_failed += 1;
            }
        }
        if let Some(stored) = self.alerts.get_mut(&alert.key()) {
            stored
                .metadata
                .insert("last_notification".to_string(), json!(results));
        }
    }

    pub async fn process_escalations(&mut self) -> Vec<Alert> {
        self.process_escalations_at(Utc::now()).await
    }

    /// Escalates every due alert and notifies its rule's channels
    pub async fn process_escalations_at(&mut self, now: DateTime<Utc>) -> Vec<Alert> {
        let mut escalated = Vec::new();
        let keys: Vec<String> = self.alerts.keys().cloned().collect();

        for key in keys {
            let Some(rule) = self
                .alerts
                .get(&key)
                .and_then(|alert| self.rule(&alert.rule_id))
                .cloned()
            else {
                continue;
            };
            let changed = match self.alerts.get_mut(&key) {
                Some(alert) => Self::escalate_if_due(alert, &rule, now),
                None => false,
            };
            if !changed {
                continue;
            }
            self.stats.total_escalations += 1;
            if let Some(alert) = self.alerts.get(&key).cloned() {
                self.notify(&alert, &rule).await;
                escalated.push(alert);
            }
        }

        if !escalated.is_empty() {
            info!(count = escalated.len(), "Escalation sweep completed");
        }
        escalated
    }

    pub fn acknowledge(&mut self, alert_id: &str, user: &str) -> Result<Alert, AlertError> {
        self.acknowledge_at(alert_id, user, Utc::now())
    }

    /// Acknowledges an active or escalated alert and stops its escalation timer
    pub fn acknowledge_at(&mut self, alert_id: &str, user: &str, now: DateTime<Utc>) -> Result<Alert, AlertError> {
        let alert = self.alert_mut(alert_id)?;
        if !matches!(alert.status, AlertStatus::Active | AlertStatus::Escalated) {
            return Err(AlertError::InvalidState {
                id: alert_id.to_string(),
                status: alert.status,
                action: "acknowledged",
            });
        }
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(user.to_string());
        alert.acknowledged_at = Some(now);
        alert.next_escalation_at = None;

        info!(alert_id = %alert_id, user = %user, "Alert acknowledged");
        Ok(alert.clone())
    }

    pub fn resolve(&mut self, alert_id: &str) -> Result<Alert, AlertError> {
        self.resolve_at(alert_id, Utc::now())
    }

    /// Resolves an alert and removes it from the engine, returning the final record
    pub fn resolve_at(&mut self, alert_id: &str, now: DateTime<Utc>) -> Result<Alert, AlertError> {
        let key = self
            .keys_by_id
            .remove(alert_id)
            .ok_or_else(|| AlertError::AlertNotFound(alert_id.to_string()))?;
        let mut alert = self
            .alerts
            .remove(&key)
            .ok_or_else(|| AlertError::AlertNotFound(alert_id.to_string()))?;

        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(now);
        alert.next_escalation_at = None;
        self.stats.total_resolved += 1;

        info!(alert_id = %alert_id, rule_id = %alert.rule_id, "Alert resolved");
        gauge!("alerts.active", self.alerts.len() as f64);
        Ok(alert)
    }

    fn alert_mut(&mut self, alert_id: &str) -> Result<&mut Alert, AlertError> {
        let key = self
            .keys_by_id
            .get(alert_id)
            .ok_or_else(|| AlertError::AlertNotFound(alert_id.to_string()))?;
        self.alerts
            .get_mut(key)
            .ok_or_else(|| AlertError::AlertNotFound(alert_id.to_string()))
    }

    pub fn get_alert(&self, alert_id: &str) -> Option<&Alert> {
        self.keys_by_id.get(alert_id).and_then(|key| self.alerts.get(key))
    }

    /// Live alerts, most severe first, then most recent
    pub fn active_alerts(&self) -> Vec<&Alert> {
        let mut alerts: Vec<&Alert> = self.alerts.values().collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.last_occurrence.cmp(&a.last_occurrence))
        });
        alerts
    }

    pub fn statistics(&self) -> AlertStatistics {
        let mut stats = self.stats.clone();
        stats.active_alerts = self.alerts.len();
        for alert in self.alerts.values() {
            *stats.by_status.entry(alert.status.as_str().to_string()).or_insert(0) += 1;
            *stats.by_severity.entry(alert.severity.as_str().to_string()).or_insert(0) += 1;
        }
        stats
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
        self.keys_by_id.clear();
    }
}
