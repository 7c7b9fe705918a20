// monitoring-handler-rs/src/context.rs
// Process-scoped state shared by every invocation of a warm instance

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::info;

use alert_engine::{AlertEngine, NotificationDispatcher};
use dashboard::DashboardAggregator;
use error_detector::{ErrorDetector, FacadeMetricSink, MetricSink, NoopMetricSink};
use metrics_collector::MetricsCollector;
use resolution_engine::ResolutionExecutor;
use shared_types::{
    ConfigError, InMemoryKeyValueStore, InMemoryNotificationTopic, InMemoryObjectStore, KeyValueStore,
    MonitoringConfig, NotificationTopic, ObjectStore,
};

use crate::audit::AuditLogger;

/// Collaborators the engines talk to
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn KeyValueStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub topic: Arc<dyn NotificationTopic>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryKeyValueStore::new()),
            objects: Arc::new(InMemoryObjectStore::new()),
            topic: Arc::new(InMemoryNotificationTopic::new()),
        }
    }
}

/// Owns every engine of the process.
///
/// A warm instance keeps one context across invocations, so alert
/// deduplication, attempt history and metric windows carry forward.
/// `reset()` is the explicit fresh-state boundary.
pub struct ProcessContext {
    pub config: MonitoringConfig,
    pub backends: Backends,
    pub detector: Mutex<ErrorDetector>,
    pub resolutions: Mutex<ResolutionExecutor>,
    pub alerts: Mutex<AlertEngine>,
    pub metrics: Mutex<MetricsCollector>,
    pub audit: AuditLogger,
    pub dashboard: DashboardAggregator,
    started_at: Instant,
    invocations: AtomicU64,
}

impl ProcessContext {
    pub fn new(config: MonitoringConfig, backends: Backends) -> Self {
        Self {
            detector: Mutex::new(build_detector(&config)),
            resolutions: Mutex::new(ResolutionExecutor::new(&config.resolution)),
            alerts: Mutex::new(build_alert_engine(&config, &backends)),
            metrics: Mutex::new(MetricsCollector::new(config.metrics.clone(), backends.store.clone())),
            audit: AuditLogger::new(backends.store.clone()),
            dashboard: DashboardAggregator::new(config.dashboard.clone()),
            config,
            backends,
            started_at: Instant::now(),
            invocations: AtomicU64::new(0),
        }
    }

    /// Context with in-memory collaborators
    pub fn in_memory(config: MonitoringConfig) -> Self {
        Self::new(config, Backends::in_memory())
    }

    /// Loads configuration from the environment and builds an in-memory context
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = MonitoringConfig::load()?;
        info!(environment = %config.environment, service = %config.service_name, "Process context created");
        Ok(Self::in_memory(config))
    }

    /// Drops all engine state. Backends and the audit trail are kept.
    pub async fn reset(&self) {
        *self.detector.lock().await = build_detector(&self.config);
        *self.resolutions.lock().await = ResolutionExecutor::new(&self.config.resolution);
        *self.alerts.lock().await = build_alert_engine(&self.config, &self.backends);
        *self.metrics.lock().await = MetricsCollector::new(self.config.metrics.clone(), self.backends.store.clone());
        info!("Process context reset");
    }

    /// Counts an invocation and returns its sequence number
    pub fn begin_invocation(&self) -> u64 {
        self.invocations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

fn build_detector(config: &MonitoringConfig) -> ErrorDetector {
    let sink: Arc<dyn MetricSink> = if config.classifier.emit_metrics {
        Arc::new(FacadeMetricSink)
    } else {
        Arc::new(NoopMetricSink)
    };
    ErrorDetector::with_sink(config.classifier.clone(), sink)
}

fn build_alert_engine(config: &MonitoringConfig, backends: &Backends) -> AlertEngine {
    AlertEngine::new(NotificationDispatcher::from_config(&config.alerts, backends.topic.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::RawError;

    #[tokio::test]
    async fn test_reset_clears_engine_state() {
        let ctx = ProcessContext::in_memory(MonitoringConfig::for_tests());
        {
            let mut detector = ctx.detector.lock().await;
            detector.detect(RawError {
                status_code: 500,
                message: "Database connection failed".to_string(),
                service: "api".to_string(),
                endpoint: "/x".to_string(),
                ..Default::default()
            });
            assert_eq!(detector.statistics().total, 1);
        }

        ctx.reset().await;
        assert_eq!(ctx.detector.lock().await.statistics().total, 0);
        assert!(ctx.resolutions.lock().await.is_empty());
    }

    #[test]
    fn test_invocations_are_counted() {
        let ctx = ProcessContext::in_memory(MonitoringConfig::for_tests());
        assert_eq!(ctx.begin_invocation(), 1);
        assert_eq!(ctx.begin_invocation(), 2);
        assert_eq!(ctx.invocations(), 2);
    }
}
