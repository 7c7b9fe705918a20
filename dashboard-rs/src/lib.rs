//! # Dashboard
//!
//! Composes display-ready widgets from metrics, alert and resolution state.
//! Each widget is computed independently; a failing widget yields an error
//! payload instead of aborting the whole dashboard.

pub mod aggregator;
pub mod source;
pub mod widgets;

pub use aggregator::{export_dashboard, DashboardAggregator, DashboardData};
pub use source::{DashboardSource, EngineSource, WidgetError};
pub use widgets::{
    error_widget, format_alert_summary, format_error_metrics, format_error_trends, format_resolution_summary,
    format_system_health, health_score, HealthStatus, WidgetKind,
};
