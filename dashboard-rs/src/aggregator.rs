// dashboard-rs/src/aggregator.rs
// Builds the requested widgets, isolating failures per widget

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use shared_types::config::DashboardConfig;
use shared_types::{ObjectStore, StoreError};

use crate::source::{DashboardSource, WidgetError};
use crate::widgets::{self, WidgetKind};

const RECENT_ALERT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    pub generated_at: DateTime<Utc>,
    pub widgets: BTreeMap<String, Value>,
    /// Number of widgets that failed to compute
    pub failed_widgets: usize,
}

#[derive(Debug, Clone)]
pub struct DashboardAggregator {
    config: DashboardConfig,
}

impl Default for DashboardAggregator {
    fn default() -> Self {
        Self::new(DashboardConfig::default())
    }
}

impl DashboardAggregator {
    pub fn new(config: DashboardConfig) -> Self {
        Self { config }
    }

    pub fn default_widgets(&self) -> &[String] {
        &self.config.default_widgets
    }

    /// Builds each requested widget; an empty request builds the default set
    pub async fn build<S: DashboardSource>(&self, source: &mut S, widget_ids: &[String]) -> DashboardData {
        let requested = if widget_ids.is_empty() {
            self.config.default_widgets.as_slice()
        } else {
            widget_ids
        };
        let now = Utc::now();

        let mut data = DashboardData {
            generated_at: now,
            widgets: BTreeMap::new(),
            failed_widgets: 0,
        };

        for widget_id in requested {
            let payload = match self.build_widget(source, widget_id, now).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(widget_id = %widget_id, error = %e, "Widget failed to compute");
                    data.failed_widgets += 1;
                    widgets::error_widget(widget_id, &e)
                }
            };
            data.widgets.insert(widget_id.clone(), payload);
        }

        debug!(widgets = data.widgets.len(), failed = data.failed_widgets, "Dashboard built");
        data
    }

    async fn build_widget<S: DashboardSource>(
        &self,
        source: &mut S,
        widget_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Value, WidgetError> {
        let kind: WidgetKind = widget_id.parse()?;
        let payload = match kind {
            WidgetKind::ErrorMetrics => widgets::format_error_metrics(&source.real_time_metrics().await?, now),
            WidgetKind::SystemHealth => widgets::format_system_health(&source.real_time_metrics().await?, now),
            WidgetKind::ErrorTrends => {
                let points = source
                    .error_trends(self.config.trend_window_minutes, self.config.trend_bucket_minutes)
                    .await?;
                widgets::format_error_trends(&points, self.config.trend_bucket_minutes, now)
            }
            WidgetKind::AlertSummary => {
                let stats = source.alert_statistics().await?;
                let recent = source.active_alerts(RECENT_ALERT_LIMIT).await?;
                widgets::format_alert_summary(&stats, &recent, now)
            }
            WidgetKind::ResolutionSummary => {
                widgets::format_resolution_summary(&source.resolution_statistics().await?, now)
            }
        };
        Ok(payload)
    }
}

/// Writes a dashboard snapshot to the object store as JSON and returns its key
pub async fn export_dashboard(
    data: &DashboardData,
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<String, StoreError> {
    let key = format!(
        "{}/{}/dashboard-{}.json",
        prefix.trim_end_matches('/'),
        data.generated_at.format("%Y/%m/%d"),
        data.generated_at.format("%H%M%S")
    );
    let body = serde_json::to_vec_pretty(data)?;
    store.put_object(&key, body, "application/json").await?;
    debug!(key = %key, "Dashboard snapshot exported");
    Ok(key)
}
