// resolution-engine-rs/src/executor.rs
// Resolution attempt lifecycle: execute, record, roll back

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use error_handling::{CircuitHealth, CircuitState};
use shared_types::config::ResolutionConfig;
use shared_types::{ClassifiedError, ResolutionAttempt, ResolutionStatus, ResolutionStrategy};

use crate::error::ResolutionError;
use crate::selector::{SelectorCacheStats, StrategySelector};
use crate::strategies::{StrategyFailure, StrategyOutcome, StrategyRunner};

fn transition(attempt: &mut ResolutionAttempt, next: ResolutionStatus) -> Result<(), ResolutionError> {
    if !attempt.status.can_transition_to(next) {
        return Err(ResolutionError::InvalidTransition {
            id: attempt.id.clone(),
            from: attempt.status,
            to: next,
        });
    }
    attempt.status = next;
    Ok(())
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "strategy panicked".to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStatistics {
    pub attempts: u64,
    pub successes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStatistics {
    pub total_attempts: u64,
    pub successful: u64,
    pub failed: u64,
    pub rolled_back: u64,
    pub rollback_failed: u64,
    /// Percentage of attempts whose strategy succeeded, rolled back or not
    pub success_rate: f64,
    pub by_strategy: BTreeMap<String, StrategyStatistics>,
    pub evicted: u64,
    pub selector_cache: SelectorCacheStats,
}

/// Runs remediation strategies and keeps a bounded history of attempts
#[derive(Debug)]
pub struct ResolutionExecutor {
    selector: StrategySelector,
    runner: StrategyRunner,
    attempts: HashMap<String, ResolutionAttempt>,
    order: VecDeque<String>,
    capacity: usize,
    evicted: u64,
}

impl Default for ResolutionExecutor {
    fn default() -> Self {
        Self::new(&ResolutionConfig::default())
    }
}

impl ResolutionExecutor {
    pub fn new(config: &ResolutionConfig) -> Self {
        Self {
            selector: StrategySelector::new(config.strategy_cache_enabled),
            runner: StrategyRunner::new(config),
            attempts: HashMap::new(),
            order: VecDeque::new(),
            capacity: config.attempt_history_capacity.max(1),
            evicted: 0,
        }
    }

    pub fn select_strategy(&mut self, error: &ClassifiedError) -> ResolutionStrategy {
        self.selector.select(error)
    }

    /// Resolves with a strategy given by name; unknown names are rejected before anything runs
    pub async fn resolve_named(
        &mut self,
        error: &ClassifiedError,
        strategy: Option<&str>,
        context: Option<Map<String, Value>>,
    ) -> Result<ResolutionAttempt, ResolutionError> {
        let strategy = strategy.map(str::parse::<ResolutionStrategy>).transpose()?;
        Ok(self.resolve(error, strategy, context).await)
    }

    /// Runs one resolution attempt to a concluded state.
    ///
    /// Strategy failures and panics are recorded on the attempt as `failed`;
    /// they never escape this call.
    pub async fn resolve(
        &mut self,
        error: &ClassifiedError,
        strategy: Option<ResolutionStrategy>,
        context: Option<Map<String, Value>>,
    ) -> ResolutionAttempt {
        let strategy = match strategy {
            Some(strategy) => strategy,
            None => self.selector.select(error),
        };
        let context = context.unwrap_or_default();

        let mut attempt = ResolutionAttempt {
            id: Uuid::new_v4().to_string(),
            error_id: error.id.clone(),
            strategy,
            status: ResolutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            success: false,
            error_message: None,
            rollback_data: None,
            metadata: Map::new(),
        };
        attempt.metadata.insert("service".to_string(), json!(error.service));
        attempt.metadata.insert("category".to_string(), json!(error.category));
        attempt.metadata.insert("severity".to_string(), json!(error.severity));

        // Pending -> InProgress is always legal for a fresh attempt
        attempt.status = ResolutionStatus::InProgress;
        info!(attempt_id = %attempt.id, error_id = %error.id, strategy = %strategy, "Resolution started");

        let result = AssertUnwindSafe(self.runner.execute(strategy, error, &context))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(StrategyFailure(panic_message(payload))));

        self.conclude(&mut attempt, result);
        self.store(attempt.clone());
        attempt
    }

    fn conclude(&self, attempt: &mut ResolutionAttempt, result: Result<StrategyOutcome, StrategyFailure>) {
        let completed_at = Utc::now().max(attempt.started_at);
        attempt.completed_at = Some(completed_at);

        let next = match result {
            Ok(outcome) => {
                attempt.success = true;
                attempt.rollback_data = outcome.rollback_data;
                attempt.metadata.insert("message".to_string(), json!(outcome.message));
                if !outcome.details.is_empty() {
                    attempt.metadata.insert("details".to_string(), Value::Object(outcome.details));
                }
                ResolutionStatus::Success
            }
            Err(failure) => {
                attempt.success = false;
                attempt.error_message = Some(failure.0);
                ResolutionStatus::Failed
            }
        };
        if let Err(e) = transition(attempt, next) {
            error!(error = %e, "Resolution attempt left its state machine");
            attempt.status = next;
        }

        let duration_ms = (completed_at - attempt.started_at).num_milliseconds().max(0) as f64;
        let outcome = if attempt.success { "success" } else { "failed" };
        counter!("resolution.attempts", 1, "strategy" => attempt.strategy.as_str(), "outcome" => outcome);
        histogram!("resolution.duration_ms", duration_ms, "strategy" => attempt.strategy.as_str());

        if attempt.success {
            info!(attempt_id = %attempt.id, strategy = %attempt.strategy, duration_ms, "Resolution succeeded");
        } else {
            warn!(
                attempt_id = %attempt.id,
                strategy = %attempt.strategy,
                error = attempt.error_message.as_deref().unwrap_or(""),
                "Resolution failed"
            );
        }
    }

    fn store(&mut self, attempt: ResolutionAttempt) {
        while self.attempts.len() >= self.capacity {
            let oldest_concluded = self
                .order
                .iter()
                .position(|id| self.attempts.get(id).map_or(true, |a| a.status.is_concluded()));
            match oldest_concluded.and_then(|pos| self.order.remove(pos)) {
                Some(id) => {
                    if self.attempts.remove(&id).is_some() {
                        self.evicted += 1;
                    }
                }
                None => break,
            }
        }
        self.order.push_back(attempt.id.clone());
        self.attempts.insert(attempt.id.clone(), attempt);
    }

    /// Rolls back a successful attempt.
    ///
    /// Returns `Ok(false)` when the attempt is not in `success` (including one
    /// already rolled back) or when the rollback routine fails.
    pub async fn rollback(&mut self, attempt_id: &str) -> Result<bool, ResolutionError> {
        self.rollback_at(attempt_id, Utc::now()).await
    }

    pub async fn rollback_at(&mut self, attempt_id: &str, now: DateTime<Utc>) -> Result<bool, ResolutionError> {
        let (strategy, rollback_data) = {
            let attempt = self
                .attempts
                .get_mut(attempt_id)
                .ok_or_else(|| ResolutionError::AttemptNotFound(attempt_id.to_string()))?;

            if attempt.status != ResolutionStatus::Success {
                warn!(attempt_id = %attempt_id, status = %attempt.status, "Rollback refused");
                return Ok(false);
            }
            transition(attempt, ResolutionStatus::RollbackRequired)?;
            (attempt.strategy, attempt.rollback_data.clone())
        };

        let result = AssertUnwindSafe(self.runner.rollback(strategy, rollback_data.as_ref()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(StrategyFailure(panic_message(payload))));

        let attempt = self
            .attempts
            .get_mut(attempt_id)
            .ok_or_else(|| ResolutionError::AttemptNotFound(attempt_id.to_string()))?;
        attempt.metadata.insert("rolled_back_at".to_string(), json!(now));

        let succeeded = match result {
            Ok(outcome) => {
                transition(attempt, ResolutionStatus::RollbackSuccess)?;
                attempt.metadata.insert("rollback_message".to_string(), json!(outcome.message));
                info!(attempt_id = %attempt_id, strategy = %strategy, "Rollback succeeded");
                true
            }
            Err(failure) => {
                transition(attempt, ResolutionStatus::RollbackFailed)?;
                attempt.metadata.insert("rollback_error".to_string(), json!(failure.0));
                warn!(attempt_id = %attempt_id, strategy = %strategy, error = %failure, "Rollback failed");
                false
            }
        };
        counter!(
            "resolution.rollbacks",
            1,
            "strategy" => strategy.as_str(),
            "outcome" => if succeeded { "success" } else { "failed" }
        );
        Ok(succeeded)
    }

    pub fn get_attempt(&self, attempt_id: &str) -> Option<&ResolutionAttempt> {
        self.attempts.get(attempt_id)
    }

    /// Attempts made for one error, oldest first
    pub fn attempts_for_error(&self, error_id: &str) -> Vec<&ResolutionAttempt> {
        self.order
            .iter()
            .filter_map(|id| self.attempts.get(id))
            .filter(|a| a.error_id == error_id)
            .collect()
    }

    /// Most recent attempts, newest first
    pub fn recent_attempts(&self, limit: usize) -> Vec<&ResolutionAttempt> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.attempts.get(id))
            .take(limit)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn statistics(&self) -> ResolutionStatistics {
        let mut stats = ResolutionStatistics {
            evicted: self.evicted,
            selector_cache: self.selector.cache_stats(),
            ..Default::default()
        };

        for attempt in self.attempts.values() {
            stats.total_attempts += 1;
            match attempt.status {
                ResolutionStatus::Success => stats.successful += 1,
                ResolutionStatus::Failed => stats.failed += 1,
                ResolutionStatus::RollbackSuccess => stats.rolled_back += 1,
                ResolutionStatus::RollbackFailed => stats.rollback_failed += 1,
                _ => {}
            }
            let entry = stats.by_strategy.entry(attempt.strategy.as_str().to_string()).or_default();
            entry.attempts += 1;
            if attempt.success {
                entry.successes += 1;
            }
        }

        if stats.total_attempts > 0 {
            let succeeded = self.attempts.values().filter(|a| a.success).count() as f64;
            stats.success_rate = succeeded / stats.total_attempts as f64 * 100.0;
        }
        stats
    }

    /// Counts a classified error against its service's circuit
    pub fn record_service_failure(&mut self, error: &ClassifiedError) -> CircuitState {
        self.runner.breakers().record_failure(&error.service)
    }

    /// Health of every tracked circuit, keyed by service
    pub fn circuit_health(&mut self) -> BTreeMap<String, CircuitHealth> {
        let breakers = self.runner.breakers();
        breakers
            .services()
            .into_iter()
            .map(|service| {
                let health = breakers.get_health(&service);
                (service, health)
            })
            .collect()
    }

    pub fn runner(&mut self) -> &mut StrategyRunner {
        &mut self.runner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{FORCE_FAILURE, FORCE_ROLLBACK_FAILURE};
    use shared_types::{ErrorCategory, RawError, Severity};

    fn executor(capacity: usize) -> ResolutionExecutor {
        ResolutionExecutor::new(&ResolutionConfig {
            latency_scale: 0.0,
            fault_injection: true,
            attempt_history_capacity: capacity,
            ..Default::default()
        })
    }

    fn db_error() -> ClassifiedError {
        ClassifiedError::from_raw(
            RawError {
                status_code: 500,
                message: "Database connection failed".to_string(),
                service: "rds-operations".to_string(),
                endpoint: "/api/operations".to_string(),
                ..Default::default()
            },
            ErrorCategory::Database,
            Severity::Critical,
            Utc::now(),
        )
    }

    fn ctx(key: &str) -> Option<Map<String, Value>> {
        let mut map = Map::new();
        map.insert(key.to_string(), json!(true));
        Some(map)
    }

    #[tokio::test]
    async fn test_resolve_selects_and_concludes() {
        let mut executor = executor(10);
        let error = db_error();
        let attempt = executor.resolve(&error, None, None).await;

        assert_eq!(attempt.strategy, ResolutionStrategy::DatabaseReconnect);
        assert_eq!(attempt.status, ResolutionStatus::Success);
        assert!(attempt.success);
        assert!(attempt.completed_at.unwrap() >= attempt.started_at);
        assert_eq!(executor.get_attempt(&attempt.id), Some(&attempt));
        assert_eq!(executor.attempts_for_error(&error.id).len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_raised() {
        let mut executor = executor(10);
        let attempt = executor
            .resolve(&db_error(), Some(ResolutionStrategy::CacheClear), ctx(FORCE_FAILURE))
            .await;

        assert_eq!(attempt.status, ResolutionStatus::Failed);
        assert!(!attempt.success);
        assert!(attempt.error_message.is_some());
        assert!(attempt.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_strategy_name_is_surfaced() {
        let mut executor = executor(10);
        let result = executor.resolve_named(&db_error(), Some("reboot_everything"), None).await;
        assert!(matches!(result, Err(ResolutionError::UnknownStrategy(_))));
        assert!(executor.is_empty());

        let attempt = executor
            .resolve_named(&db_error(), Some("cache_clear"), None)
            .await
            .unwrap();
        assert_eq!(attempt.strategy, ResolutionStrategy::CacheClear);
    }

    #[tokio::test]
    async fn test_rollback_at_most_once() {
        let mut executor = executor(10);
        let attempt = executor.resolve(&db_error(), None, None).await;

        assert_eq!(executor.rollback(&attempt.id).await, Ok(true));
        assert_eq!(
            executor.get_attempt(&attempt.id).unwrap().status,
            ResolutionStatus::RollbackSuccess
        );
        assert_eq!(executor.rollback(&attempt.id).await, Ok(false));
        assert_eq!(
            executor.get_attempt(&attempt.id).unwrap().status,
            ResolutionStatus::RollbackSuccess
        );
    }

    #[tokio::test]
    async fn test_rollback_of_failed_or_unknown_attempt() {
        let mut executor = executor(10);
        let failed = executor
            .resolve(&db_error(), Some(ResolutionStrategy::ServiceRestart), ctx(FORCE_FAILURE))
            .await;

        assert_eq!(executor.rollback(&failed.id).await, Ok(false));
        assert_eq!(executor.get_attempt(&failed.id).unwrap().status, ResolutionStatus::Failed);
        assert_eq!(
            executor.rollback("missing").await,
            Err(ResolutionError::AttemptNotFound("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_rollback_routine() {
        let mut executor = executor(10);
        let attempt = executor
            .resolve(&db_error(), Some(ResolutionStrategy::CacheClear), ctx(FORCE_ROLLBACK_FAILURE))
            .await;
        assert!(attempt.success);

        assert_eq!(executor.rollback(&attempt.id).await, Ok(false));
        let stored = executor.get_attempt(&attempt.id).unwrap();
        assert_eq!(stored.status, ResolutionStatus::RollbackFailed);
        assert!(stored.metadata.contains_key("rollback_error"));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let mut executor = executor(3);
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(executor.resolve(&db_error(), Some(ResolutionStrategy::NoAction), None).await.id);
        }

        assert_eq!(executor.len(), 3);
        assert!(executor.get_attempt(&ids[0]).is_none());
        assert!(executor.get_attempt(&ids[1]).is_none());
        assert!(executor.get_attempt(&ids[4]).is_some());
        assert_eq!(executor.statistics().evicted, 2);
        assert_eq!(executor.recent_attempts(1)[0].id, ids[4]);
    }

    #[tokio::test]
    async fn test_statistics() {
        let mut executor = executor(10);
        let ok = executor.resolve(&db_error(), None, None).await;
        executor
            .resolve(&db_error(), Some(ResolutionStrategy::CacheClear), ctx(FORCE_FAILURE))
            .await;
        executor.rollback(&ok.id).await.unwrap();

        let stats = executor.statistics();
        assert_eq!(stats.total_attempts, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.rolled_back, 1);
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.by_strategy["database_reconnect"].successes, 1);
        assert_eq!(stats.by_strategy["cache_clear"].attempts, 1);
    }
}
