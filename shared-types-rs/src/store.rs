// shared-types-rs/src/store.rs
// Key-value store, object store and notification topic interfaces with in-memory backends

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Record-level access to a table-oriented key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError>;

    async fn put(&self, table: &str, key: &str, item: Value) -> Result<(), StoreError>;

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError>;

    async fn scan(&self, table: &str) -> Result<Vec<Value>, StoreError>;

    /// Writes several records; the default writes them one by one
    async fn batch_put(&self, table: &str, items: Vec<(String, Value)>) -> Result<(), StoreError> {
        for (key, item) in items {
            self.put(table, &key, item).await?;
        }
        Ok(())
    }
}

/// Blob storage with a content-type tag
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError>;
}

/// Publish/subscribe notification topic
#[async_trait]
pub trait NotificationTopic: Send + Sync {
    /// Publishes a message and returns its message id
    async fn publish(&self, subject: &str, message: &str) -> Result<String, StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

/// Process-local key-value store. Tables are created on first write.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    tables: DashMap<String, BTreeMap<String, Value>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.tables.get(table).and_then(|t| t.get(key).cloned()))
    }

    async fn put(&self, table: &str, key: &str, item: Value) -> Result<(), StoreError> {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), item);
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .get_mut(table)
            .map(|mut t| t.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn scan(&self, table: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn batch_put(&self, table: &str, items: Vec<(String, Value)>) -> Result<(), StoreError> {
        let count = items.len();
        let mut entry = self.tables.entry(table.to_string()).or_default();
        for (key, item) in items {
            entry.insert(key, item);
        }
        debug!(table = %table, count, "Batch write completed");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let object = StoredObject {
            key: key.to_string(),
            body,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        self.objects.write().await.insert(key.to_string(), object);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))
    }
}

/// A message captured by [`InMemoryNotificationTopic`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub message_id: String,
    pub subject: String,
    pub message: String,
    pub published_at: DateTime<Utc>,
}

/// Topic that records every published message
#[derive(Debug, Default)]
pub struct InMemoryNotificationTopic {
    messages: RwLock<Vec<PublishedMessage>>,
}

impl InMemoryNotificationTopic {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl NotificationTopic for InMemoryNotificationTopic {
    async fn publish(&self, subject: &str, message: &str) -> Result<String, StoreError> {
        let message_id = Uuid::new_v4().to_string();
        self.messages.write().await.push(PublishedMessage {
            message_id: message_id.clone(),
            subject: subject.to_string(),
            message: message.to_string(),
            published_at: Utc::now(),
        });
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_kv_put_get_delete() {
        let store = InMemoryKeyValueStore::new();
        store.put("audit_log", "a1", json!({"action": "x"})).await.unwrap();

        assert_eq!(store.get("audit_log", "a1").await.unwrap(), Some(json!({"action": "x"})));
        assert_eq!(store.get("audit_log", "missing").await.unwrap(), None);
        assert!(store.delete("audit_log", "a1").await.unwrap());
        assert!(!store.delete("audit_log", "a1").await.unwrap());
    }

    #[tokio::test]
    async fn test_kv_batch_put_and_scan() {
        let store = InMemoryKeyValueStore::new();
        let items = (0..3).map(|i| (format!("k{}", i), json!({ "n": i }))).collect();
        store.batch_put("metrics_cache", items).await.unwrap();

        assert_eq!(store.scan("metrics_cache").await.unwrap().len(), 3);
        assert_eq!(store.len("metrics_cache"), 3);
        assert!(store.scan("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_object_store_round_trip() {
        let store = InMemoryObjectStore::new();
        store
            .put_object("reports/x.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        let object = store.get_object("reports/x.json").await.unwrap();
        assert_eq!(object.content_type, "application/json");
        assert!(matches!(
            store.get_object("reports/y.json").await,
            Err(StoreError::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_topic_records_messages() {
        let topic = InMemoryNotificationTopic::new();
        let id = topic.publish("subject", "body").await.unwrap();

        let published = topic.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].message_id, id);
    }
}
