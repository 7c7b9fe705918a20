//! # Remediation Guidance
//!
//! Recognizes AWS-style failures in error text and produces an actionable
//! remediation block for JSON error bodies.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The AWS failure families that carry remediation guidance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwsFailure {
    RegionNotEnabled,
    Throttling,
    MissingPermissions,
    AccessDenied,
}

/// Remediation block attached to an error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remediation {
    pub error_type: AwsFailure,
    pub title: String,
    pub steps: Vec<String>,
    /// Whether discovery or the operation can continue without this resource
    pub can_skip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_permission: Option<String>,
}

// Checked in order; the first family whose pattern matches wins
static FAILURE_PATTERNS: Lazy<Vec<(AwsFailure, Regex)>> = Lazy::new(|| {
    vec![
        (
            AwsFailure::RegionNotEnabled,
            Regex::new(r"(?i)optinrequired|region\b.*\bnot (enabled|opted in)|not subscribed to").unwrap(),
        ),
        (
            AwsFailure::Throttling,
            Regex::new(r"(?i)throttl|rate exceeded|requestlimitexceeded|too many requests").unwrap(),
        ),
        (
            AwsFailure::MissingPermissions,
            Regex::new(r"(?i)(missing|insufficient) (iam )?permissions?|iam:passrole").unwrap(),
        ),
        (
            AwsFailure::AccessDenied,
            Regex::new(r"(?i)access ?denied|unauthorizedoperation|not authorized to perform").unwrap(),
        ),
    ]
});

static PERMISSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)perform:?\s+([a-z0-9-]+:[A-Za-z0-9*]+)").unwrap());

/// Returns remediation guidance if the text names a recognized AWS failure
pub fn detect(text: &str) -> Option<Remediation> {
    let failure = FAILURE_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(failure, _)| *failure)?;

    let required_permission = PERMISSION_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    Some(guidance(failure, required_permission))
}

/// Static guidance for a failure family
pub fn guidance(failure: AwsFailure, required_permission: Option<String>) -> Remediation {
    let (title, steps, can_skip): (&str, Vec<String>, bool) = match failure {
        AwsFailure::RegionNotEnabled => (
            "AWS region is not enabled for this account",
            vec![
                "Enable the region in the AWS account settings (Account > AWS Regions)".to_string(),
                "Or remove the region from the monitored region list".to_string(),
            ],
            true,
        ),
        AwsFailure::Throttling => (
            "AWS API requests are being throttled",
            vec![
                "Retry the operation after a short delay".to_string(),
                "Reduce the discovery frequency or number of parallel regions".to_string(),
                "Request a service quota increase if throttling persists".to_string(),
            ],
            false,
        ),
        AwsFailure::MissingPermissions => (
            "The execution role is missing required IAM permissions",
            vec![
                format!(
                    "Add {} to the Lambda execution role policy",
                    required_permission.as_deref().unwrap_or("the missing permission")
                ),
                "Redeploy the IAM stack and retry the operation".to_string(),
            ],
            false,
        ),
        AwsFailure::AccessDenied => (
            "Access denied by AWS",
            vec![
                "Verify the cross-account role trust policy allows the dashboard account".to_string(),
                format!(
                    "Grant {} to the role used for this account",
                    required_permission.as_deref().unwrap_or("the denied action")
                ),
                "Check service control policies that may deny the action".to_string(),
            ],
            true,
        ),
    };

    Remediation {
        error_type: failure,
        title: title.to_string(),
        steps,
        can_skip,
        required_permission,
    }
}
