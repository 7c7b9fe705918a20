// alert-engine-rs/src/rules.rs
// Built-in alert rules and condition matching

use shared_types::{AlertConditions, AlertRule, ClassifiedError, ErrorCategory, Severity};

fn rule(
    id: &str,
    name: &str,
    severity: Severity,
    conditions: AlertConditions,
    channels: &[&str],
    escalation_delay_minutes: i64,
    max_escalations: u32,
) -> AlertRule {
    AlertRule {
        id: id.to_string(),
        name: name.to_string(),
        severity,
        conditions,
        notification_channels: channels.iter().map(|c| c.to_string()).collect(),
        escalation_delay_minutes,
        max_escalations,
        enabled: true,
    }
}

/// The five rules every engine starts with
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        rule(
            "critical-errors",
            "Critical Server Errors",
            Severity::Critical,
            AlertConditions {
                status_codes: Some(vec![500, 502, 503, 504]),
                ..Default::default()
            },
            &["sns", "email", "pagerduty"],
            15,
            3,
        ),
        rule(
            "authentication-failures",
            "Authentication Failures",
            Severity::High,
            AlertConditions {
                categories: Some(vec![ErrorCategory::Authentication, ErrorCategory::Authorization]),
                ..Default::default()
            },
            &["sns", "email"],
            30,
            2,
        ),
        rule(
            "database-errors",
            "Database Errors",
            Severity::Critical,
            AlertConditions {
                categories: Some(vec![ErrorCategory::Database]),
                ..Default::default()
            },
            &["sns", "email", "slack", "pagerduty"],
            10,
            3,
        ),
        rule(
            "rate-limit-exceeded",
            "Rate Limit Exceeded",
            Severity::Medium,
            AlertConditions {
                status_codes: Some(vec![429]),
                categories: Some(vec![ErrorCategory::RateLimit]),
                ..Default::default()
            },
            &["slack"],
            60,
            1,
        ),
        rule(
            "health-monitor-errors",
            "Health Monitor Errors",
            Severity::High,
            AlertConditions {
                services: Some(vec!["health-monitor".to_string(), "discovery".to_string()]),
                ..Default::default()
            },
            &["sns", "slack"],
            20,
            2,
        ),
    ]
}

/// Whether every present condition of the rule holds for the error.
///
/// `error_rate_threshold` and `consecutive_errors` are not evaluated and always pass.
pub fn matches(rule: &AlertRule, error: &ClassifiedError) -> bool {
    if !rule.enabled {
        return false;
    }
    let conditions = &rule.conditions;

    if let Some(codes) = &conditions.status_codes {
        if !codes.contains(&error.status_code) {
            return false;
        }
    }
    if let Some(categories) = &conditions.categories {
        if !categories.contains(&error.category) {
            return false;
        }
    }
    if let Some(services) = &conditions.services {
        if !services.iter().any(|s| s == &error.service) {
            return false;
        }
    }
    true
}
