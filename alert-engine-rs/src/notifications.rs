// alert-engine-rs/src/notifications.rs
// Notification channels and best-effort fan-out

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use metrics::counter;
use serde_json::json;
use tracing::{debug, warn};

use error_handling::sanitize_message;
use shared_types::config::AlertConfig;
use shared_types::{Alert, AlertRule, NotificationTopic};

use crate::error::NotificationError;

/// A delivery path for alert notifications
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, alert: &Alert, rule: &AlertRule) -> Result<(), NotificationError>;
}

fn subject(alert: &Alert) -> String {
    let prefix = if alert.escalation_level > 0 {
        format!("[{}][ESCALATION {}]", alert.severity.as_str().to_uppercase(), alert.escalation_level)
    } else {
        format!("[{}]", alert.severity.as_str().to_uppercase())
    };
    format!("{} {}", prefix, alert.title)
}

fn body(alert: &Alert, rule: &AlertRule) -> String {
    let mut lines = vec![
        format!("Alert: {}", alert.title),
        format!("Rule: {} ({})", rule.name, rule.id),
        format!("Severity: {}", alert.severity),
        format!("Service: {}", alert.service),
        format!("Endpoint: {}", alert.endpoint),
        format!("Occurrences: {}", alert.error_count),
        format!("First seen: {}", alert.first_occurrence.to_rfc3339()),
        format!("Last seen: {}", alert.last_occurrence.to_rfc3339()),
        format!("Description: {}", sanitize_message(&alert.description)),
    ];
    if let Some(ticket) = alert.incident_ticket() {
        lines.push(format!("Incident ticket: {}", ticket));
    }
    lines.join("\n")
}

fn delivery_failed(channel: &'static str, err: impl std::fmt::Display) -> NotificationError {
    NotificationError::DeliveryFailed {
        channel,
        reason: err.to_string(),
    }
}

/// Publishes to the SNS alert topic
pub struct SnsChannel {
    topic: Arc<dyn NotificationTopic>,
    topic_arn: Option<String>,
}

impl SnsChannel {
    pub fn new(topic: Arc<dyn NotificationTopic>, topic_arn: Option<String>) -> Self {
        Self { topic, topic_arn }
    }
}

#[async_trait]
impl NotificationChannel for SnsChannel {
    fn name(&self) -> &'static str {
        "sns"
    }

    async fn send(&self, alert: &Alert, rule: &AlertRule) -> Result<(), NotificationError> {
        let arn = self.topic_arn.as_deref().ok_or(NotificationError::NotConfigured("sns"))?;
        let message_id = self
            .topic
            .publish(&subject(alert), &body(alert, rule))
            .await
            .map_err(|e| delivery_failed("sns", e))?;
        debug!(alert_id = %alert.id, topic_arn = %arn, message_id = %message_id, "SNS notification published");
        Ok(())
    }
}

/// Sends an email to the configured recipients
pub struct EmailChannel {
    topic: Arc<dyn NotificationTopic>,
    recipients: Vec<String>,
}

impl EmailChannel {
    pub fn new(topic: Arc<dyn NotificationTopic>, recipients: Vec<String>) -> Self {
        Self { topic, recipients }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &Alert, rule: &AlertRule) -> Result<(), NotificationError> {
        if self.recipients.is_empty() {
            return Err(NotificationError::NotConfigured("email"));
        }
        let message = format!("To: {}\n\n{}", self.recipients.join(", "), body(alert, rule));
        self.topic
            .publish(&format!("[EMAIL] {}", subject(alert)), &message)
            .await
            .map_err(|e| delivery_failed("email", e))?;
        Ok(())
    }
}

/// Posts a Slack message to an incoming webhook
pub struct SlackChannel {
    topic: Arc<dyn NotificationTopic>,
    webhook_url: Option<String>,
}

impl SlackChannel {
    pub fn new(topic: Arc<dyn NotificationTopic>, webhook_url: Option<String>) -> Self {
        Self { topic, webhook_url }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, alert: &Alert, rule: &AlertRule) -> Result<(), NotificationError> {
        let webhook_url = self.webhook_url.as_deref().ok_or(NotificationError::NotConfigured("slack"))?;
        let color = match alert.severity {
            shared_types::Severity::Critical => "danger",
            shared_types::Severity::High => "warning",
            _ => "good",
        };
        let payload = json!({
            "webhook": webhook_url,
            "text": subject(alert),
            "attachments": [{
                "color": color,
                "fields": [
                    {"title": "Service", "value": alert.service, "short": true},
                    {"title": "Endpoint", "value": alert.endpoint, "short": true},
                    {"title": "Occurrences", "value": alert.error_count, "short": true},
                    {"title": "Rule", "value": rule.name, "short": true},
                ],
            }],
        });
        self.topic
            .publish(&format!("[SLACK] {}", subject(alert)), &payload.to_string())
            .await
            .map_err(|e| delivery_failed("slack", e))?;
        Ok(())
    }
}

/// Triggers a PagerDuty incident
pub struct PagerDutyChannel {
    topic: Arc<dyn NotificationTopic>,
    integration_key: Option<String>,
}

impl PagerDutyChannel {
    pub fn new(topic: Arc<dyn NotificationTopic>, integration_key: Option<String>) -> Self {
        Self { topic, integration_key }
    }
}

#[async_trait]
impl NotificationChannel for PagerDutyChannel {
    fn name(&self) -> &'static str {
        "pagerduty"
    }

    async fn send(&self, alert: &Alert, _rule: &AlertRule) -> Result<(), NotificationError> {
        let routing_key = self
            .integration_key
            .as_deref()
            .ok_or(NotificationError::NotConfigured("pagerduty"))?;
        let payload = json!({
            "routing_key": routing_key,
            "event_action": "trigger",
            "dedup_key": alert.key(),
            "payload": {
                "summary": subject(alert),
                "source": alert.service,
                "severity": match alert.severity {
                    shared_types::Severity::Critical => "critical",
                    shared_types::Severity::High => "error",
                    shared_types::Severity::Medium => "warning",
                    shared_types::Severity::Low => "info",
                },
                "custom_details": {
                    "endpoint": alert.endpoint,
                    "error_count": alert.error_count,
                    "incident_ticket": alert.incident_ticket(),
                },
            },
        });
        self.topic
            .publish(&format!("[PAGERDUTY] {}", subject(alert)), &payload.to_string())
            .await
            .map_err(|e| delivery_failed("pagerduty", e))?;
        Ok(())
    }
}

/// Fans an alert out to the channels its rule names.
///
/// Channels are attempted independently. Errors, panics and unknown channel
/// names are reported as `false` for that channel only.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the four standard channels, all publishing through `topic`
    pub fn from_config(config: &AlertConfig, topic: Arc<dyn NotificationTopic>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(SnsChannel::new(topic.clone(), config.sns_topic_arn.clone())));
        dispatcher.register(Arc::new(EmailChannel::new(topic.clone(), config.email_recipients.clone())));
        dispatcher.register(Arc::new(SlackChannel::new(topic.clone(), config.slack_webhook_url.clone())));
        dispatcher.register(Arc::new(PagerDutyChannel::new(
            topic,
            config.pagerduty_integration_key.clone(),
        )));
        dispatcher
    }

    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub async fn send(&self, alert: &Alert, rule: &AlertRule) -> BTreeMap<String, bool> {
        let attempts = rule.notification_channels.iter().map(|name| async move {
            let delivered = match self.channels.get(name) {
                Some(channel) => match AssertUnwindSafe(channel.send(alert, rule)).catch_unwind().await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(alert_id = %alert.id, channel = %name, error = %e, "Notification failed");
                        false
                    }
                    Err(_) => {
                        warn!(alert_id = %alert.id, channel = %name, "Notification channel panicked");
                        false
                    }
                },
                None => {
                    warn!(alert_id = %alert.id, channel = %name, "Unsupported notification channel");
                    false
                }
            };
            let outcome = if delivered { "sent" } else { "failed" };
            counter!("alerts.notifications", 1, "channel" => name.clone(), "outcome" => outcome);
            (name.clone(), delivered)
        });

        join_all(attempts).await.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_types::{AlertConditions, AlertStatus, InMemoryNotificationTopic, Severity};

    struct PanickingChannel;

    #[async_trait]
    impl NotificationChannel for PanickingChannel {
        fn name(&self) -> &'static str {
            "slack"
        }

        async fn send(&self, _alert: &Alert, _rule: &AlertRule) -> Result<(), NotificationError> {
            panic!("webhook client exploded");
        }
    }

    fn rule(channels: &[&str]) -> AlertRule {
        AlertRule {
            id: "database-errors".to_string(),
            name: "Database Errors".to_string(),
            severity: Severity::Critical,
            conditions: AlertConditions::default(),
            notification_channels: channels.iter().map(|c| c.to_string()).collect(),
            escalation_delay_minutes: 10,
            max_escalations: 3,
            enabled: true,
        }
    }

    fn alert() -> Alert {
        let now = Utc::now();
        Alert {
            id: "alert-1".to_string(),
            rule_id: "database-errors".to_string(),
            error_id: "err-1".to_string(),
            severity: Severity::Critical,
            status: AlertStatus::Active,
            title: "Database Errors: rds-operations".to_string(),
            description: "Database connection failed for user dba@example.com".to_string(),
            service: "rds-operations".to_string(),
            endpoint: "/api/operations".to_string(),
            error_count: 1,
            first_occurrence: now,
            last_occurrence: now,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            escalation_level: 0,
            next_escalation_at: None,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_all_configured_channels_deliver() {
        let topic = Arc::new(InMemoryNotificationTopic::new());
        let config = AlertConfig {
            sns_topic_arn: Some("arn:aws:sns:us-east-1:000000000000:alerts".to_string()),
            email_recipients: vec!["oncall@example.com".to_string()],
            slack_webhook_url: Some("https://hooks.slack.com/x".to_string()),
            pagerduty_integration_key: Some("pd-key".to_string()),
        };
        let dispatcher = NotificationDispatcher::from_config(&config, topic.clone());

        let results = dispatcher
            .send(&alert(), &rule(&["sns", "email", "slack", "pagerduty"]))
            .await;

        assert_eq!(results.len(), 4);
        assert!(results.values().all(|delivered| *delivered));
        let published = topic.published().await;
        assert_eq!(published.len(), 4);
        assert!(published.iter().all(|m| !m.message.contains("dba@example.com")));
    }

    #[tokio::test]
    async fn test_unconfigured_and_unknown_channels_report_false() {
        let topic = Arc::new(InMemoryNotificationTopic::new());
        let config = AlertConfig {
            sns_topic_arn: Some("arn:aws:sns:us-east-1:000000000000:alerts".to_string()),
            ..Default::default()
        };
        let dispatcher = NotificationDispatcher::from_config(&config, topic.clone());

        let results = dispatcher.send(&alert(), &rule(&["sns", "email", "carrier-pigeon"])).await;

        assert_eq!(results["sns"], true);
        assert_eq!(results["email"], false);
        assert_eq!(results["carrier-pigeon"], false);
        assert_eq!(topic.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_channel_does_not_stop_others() {
        let topic = Arc::new(InMemoryNotificationTopic::new());
        let config = AlertConfig {
            sns_topic_arn: Some("arn:aws:sns:us-east-1:000000000000:alerts".to_string()),
            ..Default::default()
        };
        let mut dispatcher = NotificationDispatcher::from_config(&config, topic.clone());
        dispatcher.register(Arc::new(PanickingChannel));

        let results = dispatcher.send(&alert(), &rule(&["slack", "sns"])).await;

        assert_eq!(results["slack"], false);
        assert_eq!(results["sns"], true);
    }
}
