// resolution-engine-rs/src/strategies.rs
// Simulated remediation actions and their rollback counterparts

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use error_handling::{CircuitBreaker, CircuitState, RetryConfig, RetryPolicy};
use shared_types::config::ResolutionConfig;
use shared_types::{ClassifiedError, ResolutionStrategy};

/// Context flags below are read only when `ResolutionConfig::fault_injection` is on.
///
/// Context flag that makes a strategy fail
pub const FORCE_FAILURE: &str = "force_failure";
/// Context flag that makes the later rollback of a successful strategy fail
pub const FORCE_ROLLBACK_FAILURE: &str = "force_rollback_failure";
/// Context value: how many retry attempts fail before the retried call succeeds
pub const SUCCEED_AFTER_ATTEMPTS: &str = "succeed_after_attempts";

const ROLLBACK_FAILS: &str = "rollback_fails";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct StrategyFailure(pub String);

/// Result of a successful strategy or rollback run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyOutcome {
    pub message: String,
    /// Opaque data handed back to the matching rollback routine
    pub rollback_data: Option<Map<String, Value>>,
    pub details: Map<String, Value>,
}

impl StrategyOutcome {
    fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    fn rollback_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.rollback_data = Some(map);
        }
        self
    }

    fn detail<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

fn flag(context: &Map<String, Value>, key: &str) -> bool {
    context.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn text<'a>(data: &'a Map<String, Value>, key: &str) -> Result<&'a str, StrategyFailure> {
    data.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| StrategyFailure(format!("rollback data is missing '{}'", key)))
}

fn number(data: &Map<String, Value>, key: &str) -> Result<u64, StrategyFailure> {
    data.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| StrategyFailure(format!("rollback data is missing '{}'", key)))
}

/// Simulated per-service infrastructure the strategies act on
#[derive(Debug, Default)]
struct SimulatedState {
    credential_versions: HashMap<String, u64>,
    pool_generations: HashMap<String, u64>,
    cache_entries: HashMap<String, u64>,
    instance_ids: HashMap<String, String>,
    open_tickets: HashMap<String, String>,
}

/// Runs strategies. Every action sleeps for its nominal latency times `latency_scale`.
#[derive(Debug)]
pub struct StrategyRunner {
    latency_scale: f64,
    fault_injection: bool,
    retry_policy: RetryPolicy,
    breakers: CircuitBreaker,
    state: SimulatedState,
}

impl StrategyRunner {
    pub fn new(config: &ResolutionConfig) -> Self {
        let retry_config = RetryConfig {
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            delay_scale: config.latency_scale,
            ..Default::default()
        };
        Self {
            latency_scale: config.latency_scale,
            fault_injection: config.fault_injection,
            retry_policy: RetryPolicy::new("retry_with_backoff", Some(retry_config)),
            breakers: CircuitBreaker::new("resolution", None),
            state: SimulatedState::default(),
        }
    }

    pub fn breakers(&mut self) -> &mut CircuitBreaker {
        &mut self.breakers
    }

    fn injected(&self, context: &Map<String, Value>, key: &str) -> bool {
        self.fault_injection && flag(context, key)
    }

    async fn simulate_latency(&self, nominal_ms: u64) {
        let scaled = nominal_ms as f64 * self.latency_scale.max(0.0);
        if scaled >= 1.0 {
            sleep(Duration::from_millis(scaled as u64)).await;
        }
    }

    pub async fn execute(
        &mut self,
        strategy: ResolutionStrategy,
        error: &ClassifiedError,
        context: &Map<String, Value>,
    ) -> Result<StrategyOutcome, StrategyFailure> {
        let always_succeeds = matches!(
            strategy,
            ResolutionStrategy::NoAction | ResolutionStrategy::ManualIntervention
        );
        if !always_succeeds && self.injected(context, FORCE_FAILURE) && strategy != ResolutionStrategy::RetryWithBackoff {
            self.simulate_latency(100).await;
            return Err(StrategyFailure(format!("{} failed for {}", strategy, error.service)));
        }

        let mut outcome = match strategy {
            ResolutionStrategy::RetryWithBackoff => self.retry_with_backoff(error, context).await?,
            ResolutionStrategy::CircuitBreakerReset => self.circuit_breaker_reset(error).await,
            ResolutionStrategy::RefreshCredentials => self.refresh_credentials(error).await,
            ResolutionStrategy::DatabaseReconnect => self.database_reconnect(error).await,
            ResolutionStrategy::CacheClear => self.cache_clear(error).await,
            ResolutionStrategy::ServiceRestart => self.service_restart(error).await,
            ResolutionStrategy::ManualIntervention => self.manual_intervention(error),
            ResolutionStrategy::NoAction => StrategyOutcome::new("No action required"),
        };

        if self.injected(context, FORCE_ROLLBACK_FAILURE) {
            outcome
                .rollback_data
                .get_or_insert_with(Map::new)
                .insert(ROLLBACK_FAILS.to_string(), Value::Bool(true));
        }

        debug!(strategy = %strategy, error_id = %error.id, "Strategy completed");
        Ok(outcome)
    }

    pub async fn rollback(
        &mut self,
        strategy: ResolutionStrategy,
        rollback_data: Option<&Map<String, Value>>,
    ) -> Result<StrategyOutcome, StrategyFailure> {
        let empty = Map::new();
        let data = rollback_data.unwrap_or(&empty);
        if flag(data, ROLLBACK_FAILS) {
            self.simulate_latency(100).await;
            return Err(StrategyFailure(format!("rollback of {} failed", strategy)));
        }

        match strategy {
            ResolutionStrategy::RetryWithBackoff => Ok(StrategyOutcome::new("Retries leave nothing to roll back")),
            ResolutionStrategy::CircuitBreakerReset => self.rollback_circuit_breaker_reset(data).await,
            ResolutionStrategy::RefreshCredentials => self.rollback_refresh_credentials(data).await,
            ResolutionStrategy::DatabaseReconnect => self.rollback_database_reconnect(data).await,
            ResolutionStrategy::CacheClear => self.rollback_cache_clear(data).await,
            ResolutionStrategy::ServiceRestart => self.rollback_service_restart(data).await,
            ResolutionStrategy::ManualIntervention => self.rollback_manual_intervention(data),
            ResolutionStrategy::NoAction => Ok(StrategyOutcome::new("No action to roll back")),
        }
    }

    async fn retry_with_backoff(
        &mut self,
        error: &ClassifiedError,
        context: &Map<String, Value>,
    ) -> Result<StrategyOutcome, StrategyFailure> {
        let always_fail = self.injected(context, FORCE_FAILURE);
        let succeed_after = context
            .get(SUCCEED_AFTER_ATTEMPTS)
            .filter(|_| self.fault_injection)
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let endpoint = error.endpoint.clone();

        let outcome = self
            .retry_policy
            .run(|attempt| {
                let endpoint = endpoint.clone();
                async move {
                    if always_fail || attempt < succeed_after {
                        Err(format!("request to {} failed on attempt {}", endpoint, attempt + 1))
                    } else {
                        Ok(attempt + 1)
                    }
                }
            })
            .await;

        match outcome.result {
            Ok(attempts) => Ok(StrategyOutcome::new(format!("Request succeeded after {} attempt(s)", attempts))
                .rollback_data(json!({ "attempts": attempts }))
                .detail("attempts", json!(attempts))
                .detail("total_backoff_ms", json!(outcome.total_backoff.as_millis() as u64))),
            Err(e) => Err(StrategyFailure(format!(
                "Retries exhausted after {} attempt(s): {}",
                outcome.attempts, e
            ))),
        }
    }

    async fn circuit_breaker_reset(&mut self, error: &ClassifiedError) -> StrategyOutcome {
        self.simulate_latency(500).await;
        let previous = self.breakers.reset(&error.service);
        info!(service = %error.service, previous = %previous, "Circuit breaker reset");
        StrategyOutcome::new(format!("Circuit breaker for {} reset", error.service))
            .rollback_data(json!({ "service": error.service, "previous_state": previous }))
            .detail("previous_state", json!(previous))
    }

    async fn rollback_circuit_breaker_reset(
        &mut self,
        data: &Map<String, Value>,
    ) -> Result<StrategyOutcome, StrategyFailure> {
        let service = text(data, "service")?.to_string();
        let previous: CircuitState = text(data, "previous_state")?
            .parse()
            .map_err(StrategyFailure)?;
        self.simulate_latency(200).await;
        self.breakers.restore(&service, previous);
        Ok(StrategyOutcome::new(format!("Circuit breaker for {} restored to {}", service, previous)))
    }

    async fn refresh_credentials(&mut self, error: &ClassifiedError) -> StrategyOutcome {
        self.simulate_latency(1_000).await;
        let version = self.state.credential_versions.entry(error.service.clone()).or_insert(1);
        let previous = *version;
        *version += 1;
        StrategyOutcome::new(format!("Credentials for {} refreshed", error.service))
            .rollback_data(json!({ "service": error.service, "previous_version": previous }))
            .detail("credential_version", json!(previous + 1))
    }

    async fn rollback_refresh_credentials(
        &mut self,
        data: &Map<String, Value>,
    ) -> Result<StrategyOutcome, StrategyFailure> {
        let service = text(data, "service")?.to_string();
        let previous = number(data, "previous_version")?;
        self.simulate_latency(500).await;
        self.state.credential_versions.insert(service.clone(), previous);
        Ok(StrategyOutcome::new(format!("Credentials for {} reverted to version {}", service, previous)))
    }

    async fn database_reconnect(&mut self, error: &ClassifiedError) -> StrategyOutcome {
        self.simulate_latency(2_000).await;
        let generation = self.state.pool_generations.entry(error.service.clone()).or_insert(0);
        let previous = *generation;
        *generation += 1;
        StrategyOutcome::new(format!("Connection pool for {} re-established", error.service))
            .rollback_data(json!({ "service": error.service, "previous_generation": previous }))
            .detail("pool_generation", json!(previous + 1))
    }

    async fn rollback_database_reconnect(
        &mut self,
        data: &Map<String, Value>,
    ) -> Result<StrategyOutcome, StrategyFailure> {
        let service = text(data, "service")?.to_string();
        let previous = number(data, "previous_generation")?;
        self.simulate_latency(1_000).await;
        self.state.pool_generations.insert(service.clone(), previous);
        Ok(StrategyOutcome::new(format!("Connection pool for {} returned to generation {}", service, previous)))
    }

    async fn cache_clear(&mut self, error: &ClassifiedError) -> StrategyOutcome {
        self.simulate_latency(300).await;
        let cleared = self.state.cache_entries.insert(error.service.clone(), 0).unwrap_or(0);
        StrategyOutcome::new(format!("Cache for {} cleared ({} entries)", error.service, cleared))
            .rollback_data(json!({ "service": error.service, "cleared_entries": cleared }))
            .detail("cleared_entries", json!(cleared))
    }

    async fn rollback_cache_clear(&mut self, data: &Map<String, Value>) -> Result<StrategyOutcome, StrategyFailure> {
        let service = text(data, "service")?.to_string();
        let cleared = number(data, "cleared_entries")?;
        self.simulate_latency(300).await;
        self.state.cache_entries.insert(service.clone(), cleared);
        Ok(StrategyOutcome::new(format!("Cache for {} re-warmed with {} entries", service, cleared)))
    }

    async fn service_restart(&mut self, error: &ClassifiedError) -> StrategyOutcome {
        self.simulate_latency(5_000).await;
        let new_instance = format!("i-{}", &Uuid::new_v4().simple().to_string()[..12]);
        let previous = self
            .state
            .instance_ids
            .insert(error.service.clone(), new_instance.clone())
            .unwrap_or_else(|| "initial".to_string());
        StrategyOutcome::new(format!("Service {} restarted as {}", error.service, new_instance))
            .rollback_data(json!({ "service": error.service, "previous_instance": previous }))
            .detail("instance_id", json!(new_instance))
    }

    async fn rollback_service_restart(
        &mut self,
        data: &Map<String, Value>,
    ) -> Result<StrategyOutcome, StrategyFailure> {
        let service = text(data, "service")?.to_string();
        let previous = text(data, "previous_instance")?.to_string();
        self.simulate_latency(5_000).await;
        self.state.instance_ids.insert(service.clone(), previous.clone());
        Ok(StrategyOutcome::new(format!("Service {} returned to {}", service, previous)))
    }

    fn manual_intervention(&mut self, error: &ClassifiedError) -> StrategyOutcome {
        let ticket_id = format!("TICKET-{}", &Uuid::new_v4().simple().to_string()[..8].to_uppercase());
        self.state.open_tickets.insert(ticket_id.clone(), error.id.clone());
        info!(ticket_id = %ticket_id, error_id = %error.id, "Manual intervention requested");
        StrategyOutcome::new(format!("Manual intervention ticket {} created", ticket_id))
            .rollback_data(json!({ "ticket_id": ticket_id }))
            .detail("ticket_id", json!(ticket_id))
    }

    fn rollback_manual_intervention(&mut self, data: &Map<String, Value>) -> Result<StrategyOutcome, StrategyFailure> {
        let ticket_id = text(data, "ticket_id")?;
        self.state.open_tickets.remove(ticket_id);
        Ok(StrategyOutcome::new(format!("Ticket {} closed", ticket_id)))
    }

    pub fn credential_version(&self, service: &str) -> Option<u64> {
        self.state.credential_versions.get(service).copied()
    }

    pub fn open_ticket_count(&self) -> usize {
        self.state.open_tickets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_types::{ErrorCategory, RawError, Severity};

    fn runner() -> StrategyRunner {
        StrategyRunner::new(&ResolutionConfig {
            latency_scale: 0.0,
            fault_injection: true,
            ..Default::default()
        })
    }

    fn error() -> ClassifiedError {
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

    fn context(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_every_strategy_succeeds_by_default() {
        let mut runner = runner();
        for strategy in ResolutionStrategy::ALL {
            let outcome = runner.execute(strategy, &error(), &Map::new()).await;
            assert!(outcome.is_ok(), "{} failed", strategy);
        }
    }

    #[tokio::test]
    async fn test_forced_failure_spares_no_ops() {
        let mut runner = runner();
        let ctx = context(&[(FORCE_FAILURE, json!(true))]);

        assert!(runner.execute(ResolutionStrategy::DatabaseReconnect, &error(), &ctx).await.is_err());
        assert!(runner.execute(ResolutionStrategy::RetryWithBackoff, &error(), &ctx).await.is_err());
        assert!(runner.execute(ResolutionStrategy::NoAction, &error(), &ctx).await.is_ok());
        assert!(runner.execute(ResolutionStrategy::ManualIntervention, &error(), &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_context_flags_ignored_without_fault_injection() {
        let mut runner = StrategyRunner::new(&ResolutionConfig {
            latency_scale: 0.0,
            ..Default::default()
        });
        let ctx = context(&[
            (FORCE_FAILURE, json!(true)),
            (FORCE_ROLLBACK_FAILURE, json!(true)),
            (SUCCEED_AFTER_ATTEMPTS, json!(2)),
        ]);

        let outcome = runner
            .execute(ResolutionStrategy::CacheClear, &error(), &ctx)
            .await
            .unwrap();
        assert!(runner
            .rollback(ResolutionStrategy::CacheClear, outcome.rollback_data.as_ref())
            .await
            .is_ok());

        let retried = runner
            .execute(ResolutionStrategy::RetryWithBackoff, &error(), &ctx)
            .await
            .unwrap();
        assert_eq!(retried.details["attempts"], json!(1));
    }

    #[tokio::test]
    async fn test_retry_reports_attempts() {
        let mut runner = runner();
        let ctx = context(&[(SUCCEED_AFTER_ATTEMPTS, json!(2))]);
        let outcome = runner
            .execute(ResolutionStrategy::RetryWithBackoff, &error(), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.details["attempts"], json!(3));
    }

    #[tokio::test]
    async fn test_refresh_credentials_rollback_restores_version() {
        let mut runner = runner();
        let outcome = runner
            .execute(ResolutionStrategy::RefreshCredentials, &error(), &Map::new())
            .await
            .unwrap();
        assert_eq!(runner.credential_version("rds-operations"), Some(2));

        runner
            .rollback(ResolutionStrategy::RefreshCredentials, outcome.rollback_data.as_ref())
            .await
            .unwrap();
        assert_eq!(runner.credential_version("rds-operations"), Some(1));
    }

    #[tokio::test]
    async fn test_circuit_breaker_reset_and_rollback() {
        let mut runner = runner();
        for _ in 0..10 {
            runner.breakers().record_failure("rds-operations");
        }
        assert_eq!(runner.breakers().get_state("rds-operations"), CircuitState::Open);

        let outcome = runner
            .execute(ResolutionStrategy::CircuitBreakerReset, &error(), &Map::new())
            .await
            .unwrap();
        assert_eq!(runner.breakers().get_state("rds-operations"), CircuitState::Closed);

        runner
            .rollback(ResolutionStrategy::CircuitBreakerReset, outcome.rollback_data.as_ref())
            .await
            .unwrap();
        assert_eq!(runner.breakers().get_state("rds-operations"), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_manual_intervention_ticket_lifecycle() {
        let mut runner = runner();
        let outcome = runner
            .execute(ResolutionStrategy::ManualIntervention, &error(), &Map::new())
            .await
            .unwrap();
        assert_eq!(runner.open_ticket_count(), 1);

        runner
            .rollback(ResolutionStrategy::ManualIntervention, outcome.rollback_data.as_ref())
            .await
            .unwrap();
        assert_eq!(runner.open_ticket_count(), 0);
    }

    #[tokio::test]
    async fn test_rollback_failure_flag_and_missing_data() {
        let mut runner = runner();
        let ctx = context(&[(FORCE_ROLLBACK_FAILURE, json!(true))]);
        let outcome = runner
            .execute(ResolutionStrategy::CacheClear, &error(), &ctx)
            .await
            .unwrap();

        assert!(runner
            .rollback(ResolutionStrategy::CacheClear, outcome.rollback_data.as_ref())
            .await
            .is_err());
        assert!(runner.rollback(ResolutionStrategy::ServiceRestart, None).await.is_err());
    }
}
