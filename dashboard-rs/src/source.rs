// dashboard-rs/src/source.rs
// Read access to the engines the widgets are built from

use async_trait::async_trait;
use thiserror::Error;

use alert_engine::{AlertEngine, AlertStatistics};
use metrics_collector::{MetricsCollector, MetricsError, RealTimeMetrics, TrendPoint};
use resolution_engine::{ResolutionExecutor, ResolutionStatistics};
use shared_types::Alert;

#[derive(Debug, Clone, Error)]
pub enum WidgetError {
    #[error("Unknown widget: {0}")]
    UnknownWidget(String),

    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),
}

impl From<MetricsError> for WidgetError {
    fn from(err: MetricsError) -> Self {
        WidgetError::SourceUnavailable(err.to_string())
    }
}

/// Everything the widgets read
#[async_trait]
pub trait DashboardSource: Send {
    async fn real_time_metrics(&mut self) -> Result<RealTimeMetrics, WidgetError>;

    async fn error_trends(&mut self, window_minutes: i64, bucket_minutes: i64) -> Result<Vec<TrendPoint>, WidgetError>;

    async fn alert_statistics(&mut self) -> Result<AlertStatistics, WidgetError>;

    /// Most severe, most recent first
    async fn active_alerts(&mut self, limit: usize) -> Result<Vec<Alert>, WidgetError>;

    async fn resolution_statistics(&mut self) -> Result<ResolutionStatistics, WidgetError>;
}

/// Live engines borrowed for one dashboard build
pub struct EngineSource<'a> {
    pub metrics: &'a mut MetricsCollector,
    pub alerts: &'a AlertEngine,
    pub resolutions: &'a ResolutionExecutor,
}

#[async_trait]
impl<'a> DashboardSource for EngineSource<'a> {
    async fn real_time_metrics(&mut self) -> Result<RealTimeMetrics, WidgetError> {
        Ok(self.metrics.real_time_metrics())
    }

    async fn error_trends(&mut self, window_minutes: i64, bucket_minutes: i64) -> Result<Vec<TrendPoint>, WidgetError> {
        Ok(self.metrics.error_trends(window_minutes, bucket_minutes).await?)
    }

    async fn alert_statistics(&mut self) -> Result<AlertStatistics, WidgetError> {
        Ok(self.alerts.statistics())
    }

    async fn active_alerts(&mut self, limit: usize) -> Result<Vec<Alert>, WidgetError> {
        Ok(self.alerts.active_alerts().into_iter().take(limit).cloned().collect())
    }

    async fn resolution_statistics(&mut self) -> Result<ResolutionStatistics, WidgetError> {
        Ok(self.resolutions.statistics())
    }
}
