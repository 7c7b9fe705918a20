pub mod config;
pub mod models;
pub mod store;

pub use config::{ConfigError, MonitoringConfig};
pub use models::{
    alert_key, Alert, AlertConditions, AlertRule, AlertStatus, ClassifiedError, ErrorCategory, ErrorMetric,
    ParseEnumError, RawError, ResolutionAttempt, ResolutionStatus, ResolutionStrategy, Severity,
};
pub use store::{
    InMemoryKeyValueStore, InMemoryNotificationTopic, InMemoryObjectStore, KeyValueStore, NotificationTopic,
    ObjectStore, PublishedMessage, StoreError, StoredObject,
};
