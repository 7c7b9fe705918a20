//! # Alert Engine
//!
//! Evaluates classified errors against declarative alert rules, keeps one
//! live alert per (rule, service, endpoint), escalates on a timer and fans
//! notifications out to SNS, email, Slack and PagerDuty.

pub mod engine;
pub mod error;
pub mod notifications;
pub mod rules;

pub use engine::{incident_ticket_id, AlertEngine, AlertStatistics};
pub use error::{AlertError, NotificationError};
pub use notifications::{
    EmailChannel, NotificationChannel, NotificationDispatcher, PagerDutyChannel, SlackChannel, SnsChannel,
};
pub use rules::{default_rules, matches};
