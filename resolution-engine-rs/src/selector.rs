// resolution-engine-rs/src/selector.rs
// Strategy selection for classified errors

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use shared_types::{ClassifiedError, ErrorCategory, ResolutionStrategy, Severity};

/// Picks a remediation strategy. First matching rule of the error's category wins.
pub fn select_strategy(error: &ClassifiedError) -> ResolutionStrategy {
    let message = error.message.to_lowercase();

    match error.category {
        ErrorCategory::Authentication => {
            if message.contains("token") || message.contains("jwt") {
                ResolutionStrategy::RefreshCredentials
            } else {
                ResolutionStrategy::RetryWithBackoff
            }
        }
        ErrorCategory::Authorization => {
            if error.severity == Severity::Critical {
                ResolutionStrategy::ManualIntervention
            } else {
                ResolutionStrategy::RefreshCredentials
            }
        }
        ErrorCategory::Database => {
            if message.contains("connection") {
                ResolutionStrategy::DatabaseReconnect
            } else {
                ResolutionStrategy::RetryWithBackoff
            }
        }
        ErrorCategory::Network => ResolutionStrategy::RetryWithBackoff,
        ErrorCategory::Timeout => {
            if error.severity == Severity::Critical {
                ResolutionStrategy::CircuitBreakerReset
            } else {
                ResolutionStrategy::RetryWithBackoff
            }
        }
        ErrorCategory::RateLimit => ResolutionStrategy::RetryWithBackoff,
        ErrorCategory::Configuration => ResolutionStrategy::ManualIntervention,
        ErrorCategory::Resource => {
            if error.status_code >= 500 {
                if message.contains("cache") {
                    ResolutionStrategy::CacheClear
                } else if message.contains("service") {
                    ResolutionStrategy::ServiceRestart
                } else {
                    ResolutionStrategy::RetryWithBackoff
                }
            } else {
                ResolutionStrategy::NoAction
            }
        }
        ErrorCategory::Unknown => ResolutionStrategy::RetryWithBackoff,
    }
}

type CacheKey = (ErrorCategory, Severity, u16, String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// [`select_strategy`] behind an optional cache keyed by (category, severity, status, service).
///
/// The key leaves the message out, so a cached choice is reused for every later
/// error of the same shape from the same service.
#[derive(Debug, Default)]
pub struct StrategySelector {
    enabled: bool,
    cache: HashMap<CacheKey, ResolutionStrategy>,
    hits: u64,
    misses: u64,
}

impl StrategySelector {
    pub fn new(cache_enabled: bool) -> Self {
        Self {
            enabled: cache_enabled,
            ..Default::default()
        }
    }

    pub fn select(&mut self, error: &ClassifiedError) -> ResolutionStrategy {
        if !self.enabled {
            return select_strategy(error);
        }

        let key = (error.category, error.severity, error.status_code, error.service.clone());
        if let Some(strategy) = self.cache.get(&key) {
            self.hits += 1;
            debug!(error_id = %error.id, strategy = %strategy, "Strategy cache hit");
            return *strategy;
        }

        self.misses += 1;
        let strategy = select_strategy(error);
        self.cache.insert(key, strategy);
        strategy
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> SelectorCacheStats {
        SelectorCacheStats {
            entries: self.cache.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_types::RawError;

    fn error(category: ErrorCategory, severity: Severity, status_code: u16, message: &str) -> ClassifiedError {
        ClassifiedError::from_raw(
            RawError {
                status_code,
                message: message.to_string(),
                service: "rds-operations".to_string(),
                endpoint: "/api/operations".to_string(),
                ..Default::default()
            },
            category,
            severity,
            Utc::now(),
        )
    }

    #[test]
    fn test_authentication_rules() {
        let jwt = error(ErrorCategory::Authentication, Severity::High, 401, "JWT token expired");
        let plain = error(ErrorCategory::Authentication, Severity::High, 401, "Authentication failed");
        assert_eq!(select_strategy(&jwt), ResolutionStrategy::RefreshCredentials);
        assert_eq!(select_strategy(&plain), ResolutionStrategy::RetryWithBackoff);
    }

    #[test]
    fn test_severity_dependent_rules() {
        let authz = error(ErrorCategory::Authorization, Severity::Critical, 403, "denied");
        assert_eq!(select_strategy(&authz), ResolutionStrategy::ManualIntervention);
        let authz = error(ErrorCategory::Authorization, Severity::High, 403, "denied");
        assert_eq!(select_strategy(&authz), ResolutionStrategy::RefreshCredentials);

        let timeout = error(ErrorCategory::Timeout, Severity::Critical, 504, "timed out");
        assert_eq!(select_strategy(&timeout), ResolutionStrategy::CircuitBreakerReset);
        let timeout = error(ErrorCategory::Timeout, Severity::High, 504, "timed out");
        assert_eq!(select_strategy(&timeout), ResolutionStrategy::RetryWithBackoff);
    }

    #[test]
    fn test_database_and_fixed_rules() {
        let db = error(ErrorCategory::Database, Severity::Critical, 500, "Database connection failed");
        assert_eq!(select_strategy(&db), ResolutionStrategy::DatabaseReconnect);
        let db = error(ErrorCategory::Database, Severity::Critical, 500, "Deadlock detected");
        assert_eq!(select_strategy(&db), ResolutionStrategy::RetryWithBackoff);

        let cfg = error(ErrorCategory::Configuration, Severity::Medium, 400, "bad config");
        assert_eq!(select_strategy(&cfg), ResolutionStrategy::ManualIntervention);
        let net = error(ErrorCategory::Network, Severity::High, 502, "socket closed");
        assert_eq!(select_strategy(&net), ResolutionStrategy::RetryWithBackoff);
        let unknown = error(ErrorCategory::Unknown, Severity::Medium, 418, "?");
        assert_eq!(select_strategy(&unknown), ResolutionStrategy::RetryWithBackoff);
    }

    #[test]
    fn test_resource_rules() {
        let cache = error(ErrorCategory::Resource, Severity::High, 500, "Cache layer exhausted");
        assert_eq!(select_strategy(&cache), ResolutionStrategy::CacheClear);
        let service = error(ErrorCategory::Resource, Severity::High, 503, "Service unavailable");
        assert_eq!(select_strategy(&service), ResolutionStrategy::ServiceRestart);
        let other = error(ErrorCategory::Resource, Severity::High, 500, "out of capacity");
        assert_eq!(select_strategy(&other), ResolutionStrategy::RetryWithBackoff);
        let missing = error(ErrorCategory::Resource, Severity::Medium, 404, "Instance not found");
        assert_eq!(select_strategy(&missing), ResolutionStrategy::NoAction);
    }

    #[test]
    fn test_cache_hits_and_misses() {
        let mut selector = StrategySelector::new(true);
        let first = error(ErrorCategory::Database, Severity::Critical, 500, "Database connection failed");
        let second = error(ErrorCategory::Database, Severity::Critical, 500, "Database connection failed");

        assert_eq!(selector.select(&first), ResolutionStrategy::DatabaseReconnect);
        assert_eq!(selector.select(&second), ResolutionStrategy::DatabaseReconnect);

        let stats = selector.cache_stats();
        assert_eq!(stats, SelectorCacheStats { entries: 1, hits: 1, misses: 1 });

        selector.clear_cache();
        assert_eq!(selector.cache_stats().entries, 0);
    }

    #[test]
    fn test_disabled_cache_is_pure() {
        let mut selector = StrategySelector::new(false);
        let jwt = error(ErrorCategory::Authentication, Severity::High, 401, "JWT token expired");
        let plain = error(ErrorCategory::Authentication, Severity::High, 401, "Authentication failed");

        assert_eq!(selector.select(&jwt), ResolutionStrategy::RefreshCredentials);
        assert_eq!(selector.select(&plain), ResolutionStrategy::RetryWithBackoff);
        assert_eq!(selector.cache_stats().misses, 0);
    }
}
