//! Pattern tables for category and severity classification.
//!
//! Tables are compiled once and evaluated top to bottom. Category order is
//! significant: `database` is checked before the generic `resource` patterns.

use once_cell::sync::Lazy;
use regex::Regex;

use shared_types::{ErrorCategory, Severity};

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = %p, error = %e, "Invalid classification pattern skipped");
                None
            }
        })
        .collect()
}

pub(crate) static CATEGORY_PATTERNS: Lazy<Vec<(ErrorCategory, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (
            ErrorCategory::Database,
            compile(&[
                r"database",
                r"\bdb\b",
                r"\bsql\b",
                r"postgres|mysql|aurora",
                r"connection pool",
                r"deadlock",
                r"query (failed|timeout)",
                r"dynamodb",
            ]),
        ),
        (
            ErrorCategory::Authentication,
            compile(&[
                r"authenticat",
                r"unauthori[sz]ed",
                r"invalid (token|credentials)",
                r"token (expired|invalid)",
                r"\bjwt\b",
                r"login failed",
                r"expiredtoken",
            ]),
        ),
        (
            ErrorCategory::Authorization,
            compile(&[
                r"forbidden",
                r"access ?denied",
                r"permission denied",
                r"not authorized",
                r"insufficient (permissions|privileges)",
            ]),
        ),
        (
            ErrorCategory::Timeout,
            compile(&[r"timeout", r"timed out", r"deadline exceeded"]),
        ),
        (
            ErrorCategory::Network,
            compile(&[
                r"network",
                r"connection (refused|reset|closed)",
                r"econnrefused|econnreset",
                r"\bdns\b",
                r"unreachable",
                r"socket",
            ]),
        ),
        (
            ErrorCategory::RateLimit,
            compile(&[
                r"rate limit",
                r"throttl",
                r"too many requests",
                r"quota exceeded",
            ]),
        ),
        (
            ErrorCategory::Configuration,
            compile(&[
                r"configuration",
                r"misconfigur",
                r"missing (environment|env) variable",
                r"invalid setting",
                r"not configured",
            ]),
        ),
        (
            ErrorCategory::Resource,
            compile(&[
                r"not found",
                r"does not exist",
                r"out of memory",
                r"disk (full|space)",
                r"capacity",
                r"resource",
                r"\bcache\b",
                r"service unavailable",
            ]),
        ),
    ]
});

pub(crate) static SEVERITY_PATTERNS: Lazy<Vec<(Severity, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (
            Severity::Critical,
            compile(&[
                r"data (loss|corruption)",
                r"corrupt",
                r"out of memory",
                r"disk full",
                r"security breach",
                r"system (failure|crash)",
                r"\bfatal\b",
            ]),
        ),
        (
            Severity::High,
            compile(&[
                r"connection (failed|refused|lost)",
                r"unavailable",
                r"timed? ?out",
                r"authentication failed",
                r"(access|permission) denied",
                r"\bfailed\b",
            ]),
        ),
        (
            Severity::Medium,
            compile(&[
                r"invalid",
                r"not found",
                r"rate limit",
                r"bad request",
                r"deprecated",
                r"\bretry",
            ]),
        ),
        (
            Severity::Low,
            compile(&[r"warning", r"\binfo\b", r"notice", r"cache miss"]),
        ),
    ]
});
