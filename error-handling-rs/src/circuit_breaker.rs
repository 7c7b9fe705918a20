//! # Circuit Breaker
//!
//! Per-service circuit breaker state fed by classified errors. The
//! `circuit_breaker_reset` remediation strategy forces a circuit closed and
//! its rollback restores the state it replaced.
//!
//! Features include:
//! - Standard circuit states (Closed, Open, Half-Open)
//! - Error percentage threshold over a sliding window
//! - Forced reset and restore for remediation
//!
//! Only failures are observed, so an Open or Half-Open circuit closes through
//! `reset` alone. A failure while Half-Open reopens it.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests allowed
    Closed,
    /// Failing, requests blocked
    Open,
    /// Reset timeout elapsed, next failure reopens
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF-OPEN"),
        }
    }
}

impl std::str::FromStr for CircuitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closed" | "CLOSED" => Ok(CircuitState::Closed),
            "open" | "OPEN" => Ok(CircuitState::Open),
            "half_open" | "HALF-OPEN" => Ok(CircuitState::HalfOpen),
            other => Err(format!("Unknown circuit state: {}", other)),
        }
    }
}

/// Result tracking for a sliding window
#[derive(Debug, Clone)]
struct ResultWindow {
    size: usize,
    /// true = success, false = failure
    results: VecDeque<bool>,
    failure_count: usize,
}

impl ResultWindow {
    fn new(size: usize) -> Self {
        Self {
            size,
            results: VecDeque::with_capacity(size),
            failure_count: 0,
        }
    }

    fn add_result(&mut self, success: bool) {
        if self.results.len() >= self.size {
            if let Some(false) = self.results.pop_front() {
                self.failure_count = self.failure_count.saturating_sub(1);
            }
        }
        self.results.push_back(success);
        if !success {
            self.failure_count += 1;
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.failure_count as f64 / self.results.len() as f64
        }
    }

    fn clear(&mut self) {
        self.results.clear();
        self.failure_count = 0;
    }
}

#[derive(Debug, Clone)]
struct CircuitStats {
    state: CircuitState,
    last_state_change: Instant,
    window: ResultWindow,
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Size of the sliding window for error tracking
    pub window_size: usize,
    /// Error threshold to trip the circuit (0.0 to 1.0)
    pub error_threshold: f64,
    /// Minimum number of requests before error threshold applies
    pub minimum_request_threshold: usize,
    /// Time an open circuit waits before reporting Half-Open
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            error_threshold: 0.5,
            minimum_request_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Health snapshot of one circuit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitHealth {
    pub state: CircuitState,
    pub error_rate: f64,
    pub request_count: usize,
    pub failure_count: usize,
}

/// Circuit breakers keyed by service name
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    circuits: HashMap<String, CircuitStats>,
}

impl CircuitBreaker {
    pub fn new<S: Into<String>>(name: S, config: Option<CircuitBreakerConfig>) -> Self {
        Self {
            name: name.into(),
            config: config.unwrap_or_default(),
            circuits: HashMap::new(),
        }
    }

    fn stats_mut(&mut self, service: &str) -> &mut CircuitStats {
        let window_size = self.config.window_size;
        self.circuits.entry(service.to_string()).or_insert_with(|| CircuitStats {
            state: CircuitState::Closed,
            last_state_change: Instant::now(),
            window: ResultWindow::new(window_size),
        })
    }

    /// Current state; an Open circuit past its reset timeout reports Half-Open
    pub fn get_state(&mut self, service: &str) -> CircuitState {
        let reset_timeout = self.config.reset_timeout;
        let stats = self.stats_mut(service);
        if stats.state == CircuitState::Open && stats.last_state_change.elapsed() >= reset_timeout {
            stats.state = CircuitState::HalfOpen;
            stats.last_state_change = Instant::now();
        }
        stats.state
    }

    /// Records one failure of `service` and returns the resulting state
    pub fn record_failure(&mut self, service: &str) -> CircuitState {
        self.get_state(service);
        let config = self.config.clone();
        let name = self.name.clone();
        let stats = self.stats_mut(service);
        stats.window.add_result(false);

        let should_open = match stats.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => {
                stats.window.results.len() >= config.minimum_request_threshold
                    && stats.window.failure_rate() >= config.error_threshold
            }
            CircuitState::Open => false,
        };

        if should_open {
            stats.state = CircuitState::Open;
            stats.last_state_change = Instant::now();
            counter!("circuit_breaker.opened", 1, "service" => service.to_string());
            warn!(breaker = %name, service = %service, "Circuit opened");
        }
        stats.state
    }

    /// Forces the circuit closed and clears its window, returning the state it replaced
    pub fn reset(&mut self, service: &str) -> CircuitState {
        let previous = self.get_state(service);
        let stats = self.stats_mut(service);
        stats.state = CircuitState::Closed;
        stats.last_state_change = Instant::now();
        stats.window.clear();
        gauge!("circuit_breaker.reset", 1.0, "service" => service.to_string());
        info!(breaker = %self.name, service = %service, previous = %previous, "Circuit reset");
        previous
    }

    /// Puts the circuit back into a given state
    pub fn restore(&mut self, service: &str, state: CircuitState) {
        let stats = self.stats_mut(service);
        stats.state = state;
        stats.last_state_change = Instant::now();
        info!(breaker = %self.name, service = %service, state = %state, "Circuit state restored");
    }

    /// Services with a tracked circuit, sorted
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.circuits.keys().cloned().collect();
        services.sort();
        services
    }

    pub fn get_health(&mut self, service: &str) -> CircuitHealth {
        let state = self.get_state(service);
        let stats = self.stats_mut(service);
        CircuitHealth {
            state,
            error_rate: stats.window.failure_rate(),
            request_count: stats.window.results.len(),
            failure_count: stats.window.failure_count,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new("default", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window_size: 10,
            error_threshold: 0.5,
            minimum_request_threshold: 3,
            reset_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_failures_open_circuit() {
        let mut cb = CircuitBreaker::new("test", Some(test_config()));
        let service = "rds-discovery";

        assert_eq!(cb.get_state(service), CircuitState::Closed);
        for _ in 0..3 {
            cb.record_failure(service);
        }
        assert_eq!(cb.get_state(service), CircuitState::Open);
        assert_eq!(cb.get_state("rds-query"), CircuitState::Closed);
        assert_eq!(cb.services(), vec!["rds-discovery".to_string(), "rds-query".to_string()]);
    }

    #[test]
    fn test_below_minimum_requests_stays_closed() {
        let mut cb = CircuitBreaker::new("test", Some(test_config()));
        assert_eq!(cb.record_failure("rds-discovery"), CircuitState::Closed);
        assert_eq!(cb.record_failure("rds-discovery"), CircuitState::Closed);
        assert_eq!(cb.get_health("rds-discovery").failure_count, 2);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let mut cb = CircuitBreaker::new("test", Some(test_config()));
        let service = "rds-discovery";
        for _ in 0..3 {
            cb.record_failure(service);
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cb.get_state(service), CircuitState::HalfOpen);

        assert_eq!(cb.record_failure(service), CircuitState::Open);
    }

    #[test]
    fn test_reset_and_restore() {
        let mut cb = CircuitBreaker::new("test", Some(test_config()));
        let service = "rds-discovery";
        for _ in 0..3 {
            cb.record_failure(service);
        }

        let previous = cb.reset(service);
        assert_eq!(previous, CircuitState::Open);
        assert_eq!(cb.get_state(service), CircuitState::Closed);
        assert_eq!(cb.get_health(service).request_count, 0);

        cb.restore(service, previous);
        assert_eq!(cb.get_state(service), CircuitState::Open);
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!("half_open".parse::<CircuitState>().unwrap(), CircuitState::HalfOpen);
        assert!("sideways".parse::<CircuitState>().is_err());
    }
}
