// shared-types-rs/src/config.rs
// Configuration for the error resolution and monitoring core

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub environment: String,
    pub service_name: String,
    pub classifier: ClassifierConfig,
    pub resolution: ResolutionConfig,
    pub alerts: AlertConfig,
    pub metrics: MetricsConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Emit a metric for every classification
    pub emit_metrics: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub strategy_cache_enabled: bool,
    /// Maximum number of attempts kept in memory
    pub attempt_history_capacity: usize,
    /// Multiplier applied to every simulated strategy latency. 0.0 disables sleeping.
    pub latency_scale: f64,
    pub max_retries: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Honour `force_failure`, `force_rollback_failure` and `succeed_after_attempts`
    /// in the resolution context. Off outside tests.
    pub fault_injection: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    pub sns_topic_arn: Option<String>,
    pub email_recipients: Vec<String>,
    pub slack_webhook_url: Option<String>,
    pub pagerduty_integration_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// In-memory window of the real-time cache
    pub ttl_minutes: i64,
    pub batch_size: usize,
    pub error_rate_cache_secs: i64,
    pub table_name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub default_widgets: Vec<String>,
    pub trend_window_minutes: i64,
    pub trend_bucket_minutes: i64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            service_name: "rds-operations-dashboard".to_string(),
            classifier: ClassifierConfig::default(),
            resolution: ResolutionConfig::default(),
            alerts: AlertConfig::default(),
            metrics: MetricsConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { emit_metrics: true }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            strategy_cache_enabled: true,
            attempt_history_capacity: 1000,
            latency_scale: 1.0,
            max_retries: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
            fault_injection: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 5,
            batch_size: 25,
            error_rate_cache_secs: 60,
            table_name: "metrics_cache".to_string(),
            namespace: "RDSDashboard/Errors".to_string(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_widgets: vec![
                "error_metrics".to_string(),
                "system_health".to_string(),
                "error_trends".to_string(),
                "alert_summary".to_string(),
                "resolution_summary".to_string(),
            ],
            trend_window_minutes: 60,
            trend_bucket_minutes: 5,
        }
    }
}

impl MonitoringConfig {
    /// Loads configuration: defaults, then an optional TOML file, then environment overrides.
    ///
    /// The file is looked up at `RDS_DASHBOARD_CONFIG_PATH`; a missing variable means
    /// defaults only, a variable pointing at a missing file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match env::var("RDS_DASHBOARD_CONFIG_PATH") {
            Ok(path) => Self::from_file(PathBuf::from(path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let contents = fs::read_to_string(&path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Configuration suited to tests: no simulated latency and every notification channel configured
    pub fn for_tests() -> Self {
        let mut config = Self::default();
        config.environment = "test".to_string();
        config.resolution.latency_scale = 0.0;
        config.resolution.fault_injection = true;
        config.alerts.sns_topic_arn = Some("arn:aws:sns:us-east-1:000000000000:rds-alerts".to_string());
        config.alerts.email_recipients = vec!["oncall@example.com".to_string()];
        config.alerts.slack_webhook_url = Some("https://hooks.slack.com/services/T000/B000/XXXX".to_string());
        config.alerts.pagerduty_integration_key = Some("pd-test-key".to_string());
        config
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(environment) = env::var("ENVIRONMENT") {
            self.environment = environment;
        }
        if let Ok(service_name) = env::var("SERVICE_NAME") {
            self.service_name = service_name;
        }
        if let Some(scale) = parse_env::<f64>("RESOLUTION_LATENCY_SCALE")? {
            self.resolution.latency_scale = scale;
        }
        if let Some(capacity) = parse_env::<usize>("RESOLUTION_HISTORY_CAPACITY")? {
            self.resolution.attempt_history_capacity = capacity;
        }
        if let Some(enabled) = parse_env::<bool>("RESOLUTION_FAULT_INJECTION")? {
            self.resolution.fault_injection = enabled;
        }
        if let Some(enabled) = parse_env::<bool>("STRATEGY_CACHE_ENABLED")? {
            self.resolution.strategy_cache_enabled = enabled;
        }
        if let Ok(arn) = env::var("SNS_TOPIC_ARN") {
            self.alerts.sns_topic_arn = Some(arn);
        }
        if let Ok(recipients) = env::var("ALERT_EMAIL_RECIPIENTS") {
            self.alerts.email_recipients = recipients
                .split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }
        if let Ok(url) = env::var("SLACK_WEBHOOK_URL") {
            self.alerts.slack_webhook_url = Some(url);
        }
        if let Ok(key) = env::var("PAGERDUTY_INTEGRATION_KEY") {
            self.alerts.pagerduty_integration_key = Some(key);
        }
        if let Some(ttl) = parse_env::<i64>("METRICS_TTL_MINUTES")? {
            self.metrics.ttl_minutes = ttl;
        }
        if let Some(batch_size) = parse_env::<usize>("METRICS_BATCH_SIZE")? {
            self.metrics.batch_size = batch_size;
        }
        if let Ok(table) = env::var("METRICS_TABLE") {
            self.metrics.table_name = table;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.batch_size == 0 {
            return Err(ConfigError::InvalidValue("metrics.batch_size must be positive".to_string()));
        }
        if self.metrics.ttl_minutes <= 0 {
            return Err(ConfigError::InvalidValue("metrics.ttl_minutes must be positive".to_string()));
        }
        if self.resolution.attempt_history_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "resolution.attempt_history_capacity must be positive".to_string(),
            ));
        }
        if self.resolution.latency_scale < 0.0 {
            return Err(ConfigError::InvalidValue("resolution.latency_scale cannot be negative".to_string()));
        }
        if self.dashboard.trend_bucket_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "dashboard.trend_bucket_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", name, raw))),
        Err(_) => Ok(None),
    }
}

impl TryFrom<config::Config> for MonitoringConfig {
    type Error = config::ConfigError;

    fn try_from(cfg: config::Config) -> Result<Self, Self::Error> {
        // Start from defaults and selectively override from the provided config.
        let mut base = MonitoringConfig::default();

        if let Ok(environment) = cfg.get::<String>("environment") {
            base.environment = environment;
        }
        if let Ok(service_name) = cfg.get::<String>("service_name") {
            base.service_name = service_name;
        }
        if let Ok(emit) = cfg.get::<bool>("classifier.emit_metrics") {
            base.classifier.emit_metrics = emit;
        }
        if let Ok(enabled) = cfg.get::<bool>("resolution.strategy_cache_enabled") {
            base.resolution.strategy_cache_enabled = enabled;
        }
        if let Ok(capacity) = cfg.get::<usize>("resolution.attempt_history_capacity") {
            base.resolution.attempt_history_capacity = capacity;
        }
        if let Ok(scale) = cfg.get::<f64>("resolution.latency_scale") {
            base.resolution.latency_scale = scale;
        }
        if let Ok(arn) = cfg.get::<String>("alerts.sns_topic_arn") {
            base.alerts.sns_topic_arn = Some(arn);
        }
        if let Ok(recipients) = cfg.get::<Vec<String>>("alerts.email_recipients") {
            base.alerts.email_recipients = recipients;
        }
        if let Ok(url) = cfg.get::<String>("alerts.slack_webhook_url") {
            base.alerts.slack_webhook_url = Some(url);
        }
        if let Ok(key) = cfg.get::<String>("alerts.pagerduty_integration_key") {
            base.alerts.pagerduty_integration_key = Some(key);
        }
        if let Ok(ttl) = cfg.get::<i64>("metrics.ttl_minutes") {
            base.metrics.ttl_minutes = ttl;
        }
        if let Ok(batch_size) = cfg.get::<usize>("metrics.batch_size") {
            base.metrics.batch_size = batch_size;
        }
        if let Ok(table) = cfg.get::<String>("metrics.table_name") {
            base.metrics.table_name = table;
        }
        if let Ok(widgets) = cfg.get::<Vec<String>>("dashboard.default_widgets") {
            base.dashboard.default_widgets = widgets;
        }

        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_collector_contract() {
        let config = MonitoringConfig::default();
        assert_eq!(config.metrics.ttl_minutes, 5);
        assert_eq!(config.metrics.batch_size, 25);
        assert_eq!(config.metrics.error_rate_cache_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MonitoringConfig::from_toml_str(
            r#"
            environment = "prod"

            [metrics]
            batch_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.environment, "prod");
        assert_eq!(config.metrics.batch_size, 10);
        assert_eq!(config.metrics.ttl_minutes, 5);
        assert_eq!(config.resolution.attempt_history_capacity, 1000);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = MonitoringConfig::from_file(PathBuf::from("/nonexistent/monitoring.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitoring.toml");
        fs::write(&path, "[resolution]\nlatency_scale = 0.0\n").unwrap();
        let config = MonitoringConfig::from_file(path).unwrap();
        assert_eq!(config.resolution.latency_scale, 0.0);
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let mut config = MonitoringConfig::default();
        config.metrics.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_try_from_config_source() {
        let source = config::Config::builder()
            .set_override("environment", "staging")
            .unwrap()
            .set_override("metrics.batch_size", 5)
            .unwrap()
            .build()
            .unwrap();
        let config = MonitoringConfig::try_from(source).unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.metrics.batch_size, 5);
    }
}
