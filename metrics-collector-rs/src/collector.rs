// metrics-collector-rs/src/collector.rs
// Windowed error metric cache, batched persistence and derived reads

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use metrics::{counter, gauge, histogram};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_types::config::MetricsConfig;
use shared_types::{ClassifiedError, ErrorMetric, KeyValueStore, Severity};

use crate::types::{
    CollectorStatistics, DataPoint, MetricType, MetricsError, RealTimeMetrics, TrendPoint,
};

/// Longest query window accepted, one week
pub const MAX_WINDOW_MINUTES: i64 = 10_080;

/// Start of a `window_minutes` window ending at `now`
pub fn window_start(now: DateTime<Utc>, window_minutes: i64) -> Result<DateTime<Utc>, MetricsError> {
    if !(1..=MAX_WINDOW_MINUTES).contains(&window_minutes) {
        return Err(MetricsError::InvalidWindow(window_minutes));
    }
    Duration::try_minutes(window_minutes)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or(MetricsError::InvalidWindow(window_minutes))
}

/// Builds the metric recorded for a classified error
pub fn metric_from_error(
    error: &ClassifiedError,
    response_time_ms: Option<f64>,
    resolution_attempt_id: Option<String>,
) -> ErrorMetric {
    ErrorMetric {
        timestamp: error.timestamp,
        service: error.service.clone(),
        endpoint: error.endpoint.clone(),
        error_type: error.category.as_str().to_string(),
        severity: error.severity,
        count: 1,
        response_time_ms,
        user_id: error.user_id.clone(),
        resolution_attempt_id,
    }
}

fn count_severity(point: &mut TrendPoint, severity: Severity, count: u64) {
    match severity {
        Severity::Critical => point.critical += count,
        Severity::High => point.high += count,
        Severity::Medium => point.medium += count,
        Severity::Low => point.low += count,
    }
}

/// Collects error metrics.
///
/// Every metric lands in a TTL-trimmed cache keyed by `service:endpoint:error_type`
/// and in a pending batch that is written to the key-value store once it
/// reaches `batch_size`.
pub struct MetricsCollector {
    config: MetricsConfig,
    store: Arc<dyn KeyValueStore>,
    cache: HashMap<String, Vec<ErrorMetric>>,
    pending: Vec<ErrorMetric>,
    rate_cache: HashMap<(String, i64), (DateTime<Utc>, f64)>,
    flushed_total: u64,
    flush_failures: u64,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("cache_keys", &self.cache.len())
            .finish()
    }
}

impl MetricsCollector {
    pub fn new(config: MetricsConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            store,
            cache: HashMap::new(),
            pending: Vec::new(),
            rate_cache: HashMap::new(),
            flushed_total: 0,
            flush_failures: 0,
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub async fn collect(&mut self, metric: ErrorMetric) {
        self.collect_at(metric, Utc::now()).await
    }

    /// Records a metric. Flush failures are logged and the batch is kept for the next try.
    pub async fn collect_at(&mut self, metric: ErrorMetric, now: DateTime<Utc>) {
        counter!(
            "errors.recorded",
            metric.count,
            "service" => metric.service.clone(),
            "severity" => metric.severity.as_str(),
            "error_type" => metric.error_type.clone()
        );
        if let Some(ms) = metric.response_time_ms {
            histogram!("errors.response_time_ms", ms, "service" => metric.service.clone());
        }

        self.cache.entry(metric.cache_key()).or_default().push(metric.clone());
        self.pending.push(metric);
        self.trim_expired(now);

        if self.pending.len() >= self.config.batch_size {
            if let Err(e) = self.flush().await {
                warn!(error = %e, pending = self.pending.len(), "Metric flush failed; batch kept");
            }
        }
        gauge!("metrics.pending_writes", self.pending.len() as f64);
    }

    /// Writes pending metrics to the store in batches of `batch_size`
    pub async fn flush(&mut self) -> Result<usize, MetricsError> {
        let mut written = 0;
        while !self.pending.is_empty() {
            let take = self.pending.len().min(self.config.batch_size.max(1));
            let batch: Vec<ErrorMetric> = self.pending.drain(..take).collect();

            let mut items = Vec::with_capacity(batch.len());
            for metric in &batch {
                let mut item = serde_json::to_value(metric)?;
                if let Value::Object(map) = &mut item {
                    let expires_at = metric.timestamp + Duration::days(7);
                    map.insert("expires_at".to_string(), json!(expires_at.timestamp()));
                }
                let key = format!("{}#{}#{}", metric.cache_key(), metric.timestamp.timestamp_millis(), Uuid::new_v4());
                items.push((key, item));
            }

            if let Err(e) = self.store.batch_put(&self.config.table_name, items).await {
                self.flush_failures += 1;
                counter!("metrics.flush_failures", 1);
                // Put the batch back in front so ordering is preserved
                let mut restored = batch;
                restored.append(&mut self.pending);
                self.pending = restored;
                return Err(e.into());
            }

            written += take;
            self.flushed_total += take as u64;
        }

        if written > 0 {
            debug!(written, table = %self.config.table_name, "Metric batch flushed");
        }
        Ok(written)
    }

    /// Drops cached entries older than the TTL window
    pub fn trim_expired(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::minutes(self.config.ttl_minutes);
        let mut removed = 0;
        self.cache.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|m| m.timestamp >= cutoff);
            removed += before - entries.len();
            !entries.is_empty()
        });
        let rate_ttl = Duration::seconds(self.config.error_rate_cache_secs);
        self.rate_cache.retain(|_, (computed_at, _)| now - *computed_at < rate_ttl);
        removed
    }

    /// Persisted plus pending metrics newer than `since`
    async fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<ErrorMetric>, MetricsError> {
        let mut entries = Vec::new();
        for item in self.store.scan(&self.config.table_name).await? {
            match serde_json::from_value::<ErrorMetric>(item) {
                Ok(metric) if metric.timestamp >= since => entries.push(metric),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping malformed metric record"),
            }
        }
        entries.extend(self.pending.iter().filter(|m| m.timestamp >= since).cloned());
        Ok(entries)
    }

    pub async fn error_rate(&mut self, service: &str, window_minutes: i64) -> Result<f64, MetricsError> {
        self.error_rate_at(service, window_minutes, Utc::now()).await
    }

    /// Share of recorded errors within the window that belong to `service`, in percent.
    ///
    /// No success path is instrumented, so this is the service's share of all
    /// recorded failures rather than a failure ratio of its requests.
    pub async fn error_rate_at(
        &mut self,
        service: &str,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<f64, MetricsError> {
        let since = window_start(now, window_minutes)?;
        let key = (service.to_string(), window_minutes);
        if let Some((computed_at, rate)) = self.rate_cache.get(&key) {
            if now - *computed_at < Duration::seconds(self.config.error_rate_cache_secs) {
                return Ok(*rate);
            }
        }

        let entries = self.entries_since(since).await?;
        let total: u64 = entries.iter().map(|m| m.count).sum();
        let for_service: u64 = entries.iter().filter(|m| m.service == service).map(|m| m.count).sum();

        let rate = if total == 0 {
            0.0
        } else {
            (for_service as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        };

        self.rate_cache.insert(key, (now, rate));
        Ok(rate)
    }

    pub fn real_time_metrics(&mut self) -> RealTimeMetrics {
        self.real_time_metrics_at(Utc::now())
    }

    /// Totals over the TTL window, after trimming expired entries
    pub fn real_time_metrics_at(&mut self, now: DateTime<Utc>) -> RealTimeMetrics {
        self.trim_expired(now);

        let mut snapshot = RealTimeMetrics {
            timestamp: Some(now),
            window_minutes: self.config.ttl_minutes,
            ..Default::default()
        };
        let mut response_total = 0.0;
        let mut response_samples = 0u64;

        for metric in self.cache.values().flatten() {
            snapshot.total_errors += metric.count;
            match metric.severity {
                Severity::Critical => snapshot.critical_errors += metric.count,
                Severity::High => snapshot.high_errors += metric.count,
                _ => {}
            }
            *snapshot.by_service.entry(metric.service.clone()).or_insert(0) += metric.count;
            *snapshot
                .by_severity
                .entry(metric.severity.as_str().to_string())
                .or_insert(0) += metric.count;
            *snapshot.by_error_type.entry(metric.error_type.clone()).or_insert(0) += metric.count;
            *snapshot.by_endpoint.entry(metric.endpoint.clone()).or_insert(0) += metric.count;
            if let Some(ms) = metric.response_time_ms {
                response_total += ms;
                response_samples += 1;
            }
        }

        if response_samples > 0 {
            snapshot.average_response_time_ms = Some(response_total / response_samples as f64);
        }
        snapshot
    }

    pub async fn aggregated_metrics(
        &mut self,
        types: &[MetricType],
        window_minutes: i64,
        group_by_service: bool,
    ) -> Result<BTreeMap<MetricType, Vec<DataPoint>>, MetricsError> {
        self.aggregated_metrics_at(types, window_minutes, group_by_service, Utc::now())
            .await
    }

    /// One data point per service (or one overall) for each requested metric type.
    ///
    /// Reads the in-memory cache, so windows longer than the TTL see only the TTL window.
    pub async fn aggregated_metrics_at(
        &mut self,
        types: &[MetricType],
        window_minutes: i64,
        group_by_service: bool,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<MetricType, Vec<DataPoint>>, MetricsError> {
        let since = window_start(now, window_minutes)?;
        self.trim_expired(now);

        let mut groups: BTreeMap<Option<String>, Vec<ErrorMetric>> = BTreeMap::new();
        for metric in self.cache.values().flatten().filter(|m| m.timestamp >= since) {
            let group = group_by_service.then(|| metric.service.clone());
            groups.entry(group).or_default().push(metric.clone());
        }

        let mut result = BTreeMap::new();
        for metric_type in types {
            let mut points = Vec::with_capacity(groups.len());
            for (service, metrics) in &groups {
                let sample_count: u64 = metrics.iter().map(|m| m.count).sum();
                let value = match metric_type {
                    MetricType::ErrorCount => sample_count as f64,
                    MetricType::ErrorRate => match service {
                        Some(service) => self.error_rate_at(service, window_minutes, now).await?,
                        // Every recorded error belongs to the whole fleet
                        None if sample_count > 0 => 100.0,
                        None => 0.0,
                    },
                    MetricType::ResponseTime => {
                        let samples: Vec<f64> = metrics.iter().filter_map(|m| m.response_time_ms).collect();
                        if samples.is_empty() {
                            0.0
                        } else {
                            samples.iter().sum::<f64>() / samples.len() as f64
                        }
                    }
                };
                points.push(DataPoint {
                    metric_type: *metric_type,
                    value,
                    timestamp: now,
                    service: service.clone(),
                    sample_count,
                });
            }
            result.insert(*metric_type, points);
        }
        Ok(result)
    }

    pub async fn error_trends(&self, window_minutes: i64, bucket_minutes: i64) -> Result<Vec<TrendPoint>, MetricsError> {
        self.error_trends_at(window_minutes, bucket_minutes, Utc::now()).await
    }

    /// Per-bucket severity counts over the window, oldest bucket first. Empty buckets are included.
    pub async fn error_trends_at(
        &self,
        window_minutes: i64,
        bucket_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrendPoint>, MetricsError> {
        window_start(now, window_minutes)?;
        let bucket_minutes = bucket_minutes.clamp(1, window_minutes);
        let bucket = Duration::try_minutes(bucket_minutes).ok_or(MetricsError::InvalidWindow(bucket_minutes))?;
        let end = now.duration_trunc(bucket).unwrap_or(now);
        let bucket_count = i32::try_from((window_minutes + bucket_minutes - 1) / bucket_minutes)
            .map_err(|_| MetricsError::InvalidWindow(window_minutes))?;
        let start = end - bucket * (bucket_count - 1);

        let mut points: Vec<TrendPoint> = (0..bucket_count)
            .map(|i| TrendPoint {
                bucket_start: start + bucket * i,
                ..Default::default()
            })
            .collect();

        for metric in self.entries_since(start).await? {
            let offset = (metric.timestamp - start).num_seconds() / bucket.num_seconds();
            if let Some(point) = usize::try_from(offset).ok().and_then(|i| points.get_mut(i)) {
                point.total += metric.count;
                count_severity(point, metric.severity, metric.count);
            }
        }
        Ok(points)
    }

    pub fn statistics(&self) -> CollectorStatistics {
        CollectorStatistics {
            cache_keys: self.cache.len(),
            cached_entries: self.cache.values().map(Vec::len).sum(),
            pending_writes: self.pending.len(),
            flushed_total: self.flushed_total,
            flush_failures: self.flush_failures,
            rate_cache_entries: self.rate_cache.len(),
        }
    }

    /// Empties the in-memory cache and rate cache; pending writes are kept
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.rate_cache.clear();
        info!("Metrics cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared_types::{InMemoryKeyValueStore, StoreError};

    struct UnavailableStore;

    #[async_trait]
    impl KeyValueStore for UnavailableStore {
        async fn get(&self, _table: &str, _key: &str) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn put(&self, _table: &str, _key: &str, _item: Value) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn delete(&self, _table: &str, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn scan(&self, _table: &str) -> Result<Vec<Value>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    fn metric(service: &str, severity: Severity, at: DateTime<Utc>) -> ErrorMetric {
        ErrorMetric {
            timestamp: at,
            service: service.to_string(),
            endpoint: "/api/instances".to_string(),
            error_type: "database".to_string(),
            severity,
            count: 1,
            response_time_ms: Some(120.0),
            user_id: None,
            resolution_attempt_id: None,
        }
    }

    fn collector() -> (MetricsCollector, Arc<InMemoryKeyValueStore>) {
        let store = InMemoryKeyValueStore::shared();
        (MetricsCollector::new(MetricsConfig::default(), store.clone()), store)
    }

    #[tokio::test]
    async fn test_flushes_at_batch_size() {
        let (mut collector, store) = collector();
        let now = Utc::now();
        for _ in 0..24 {
            collector.collect_at(metric("rds-query", Severity::High, now), now).await;
        }
        assert_eq!(collector.statistics().pending_writes, 24);
        assert!(store.is_empty("metrics_cache"));

        collector.collect_at(metric("rds-query", Severity::High, now), now).await;
        assert_eq!(collector.statistics().pending_writes, 0);
        assert_eq!(store.len("metrics_cache"), 25);
        assert_eq!(collector.statistics().flushed_total, 25);
    }

    #[tokio::test]
    async fn test_flush_failure_keeps_batch() {
        let mut collector = MetricsCollector::new(MetricsConfig::default(), Arc::new(UnavailableStore));
        let now = Utc::now();
        for _ in 0..25 {
            collector.collect_at(metric("rds-query", Severity::High, now), now).await;
        }

        let stats = collector.statistics();
        assert_eq!(stats.pending_writes, 25);
        assert_eq!(stats.flush_failures, 1);
        assert_eq!(collector.real_time_metrics_at(now).total_errors, 25);
    }

    #[tokio::test]
    async fn test_ttl_trims_cache() {
        let (mut collector, _) = collector();
        let now = Utc::now();
        collector
            .collect_at(metric("rds-query", Severity::High, now - Duration::minutes(10)), now)
            .await;
        collector.collect_at(metric("rds-query", Severity::Critical, now), now).await;

        let snapshot = collector.real_time_metrics_at(now);
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.critical_errors, 1);
        assert_eq!(snapshot.by_severity["critical"], 1);
        assert_eq!(snapshot.average_response_time_ms, Some(120.0));
    }

    #[tokio::test]
    async fn test_error_rate_is_service_share_and_cached() {
        let (mut collector, _) = collector();
        let now = Utc::now();
        for _ in 0..3 {
            collector.collect_at(metric("rds-query", Severity::High, now), now).await;
        }
        collector.collect_at(metric("rds-operations", Severity::High, now), now).await;

        assert_eq!(collector.error_rate_at("rds-query", 60, now).await.unwrap(), 75.0);
        assert_eq!(collector.error_rate_at("unknown", 60, now).await.unwrap(), 0.0);

        collector.collect_at(metric("rds-operations", Severity::High, now), now).await;
        let cached = collector
            .error_rate_at("rds-query", 60, now + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(cached, 75.0);

        let fresh = collector
            .error_rate_at("rds-query", 60, now + Duration::seconds(61))
            .await
            .unwrap();
        assert_eq!(fresh, 60.0);
    }

    #[tokio::test]
    async fn test_error_rate_counts_persisted_entries() {
        let (mut collector, _) = collector();
        let now = Utc::now();
        collector.collect_at(metric("rds-query", Severity::High, now), now).await;
        collector.flush().await.unwrap();
        collector.collect_at(metric("rds-operations", Severity::High, now), now).await;

        assert_eq!(collector.error_rate_at("rds-query", 60, now).await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn test_aggregated_metrics_per_service() {
        let (mut collector, _) = collector();
        let now = Utc::now();
        for _ in 0..3 {
            collector.collect_at(metric("rds-query", Severity::High, now), now).await;
        }
        collector.collect_at(metric("rds-operations", Severity::Low, now), now).await;

        let result = collector
            .aggregated_metrics_at(&[MetricType::ErrorCount, MetricType::ErrorRate], 5, true, now)
            .await
            .unwrap();

        let counts = &result[&MetricType::ErrorCount];
        assert_eq!(counts.len(), 2);
        let query = counts.iter().find(|p| p.service.as_deref() == Some("rds-query")).unwrap();
        assert_eq!(query.value, 3.0);

        let rates = &result[&MetricType::ErrorRate];
        let operations = rates.iter().find(|p| p.service.as_deref() == Some("rds-operations")).unwrap();
        assert_eq!(operations.value, 25.0);

        let overall = collector
            .aggregated_metrics_at(&[MetricType::ErrorCount], 5, false, now)
            .await
            .unwrap();
        assert_eq!(overall[&MetricType::ErrorCount].len(), 1);
        assert_eq!(overall[&MetricType::ErrorCount][0].value, 4.0);
    }

    #[tokio::test]
    async fn test_error_trends_buckets() {
        let (mut collector, _) = collector();
        let now = Utc::now();
        collector.collect_at(metric("rds-query", Severity::Critical, now), now).await;
        collector
            .collect_at(metric("rds-query", Severity::Low, now - Duration::minutes(30)), now)
            .await;

        let trends = collector.error_trends_at(60, 5, now).await.unwrap();
        assert_eq!(trends.len(), 12);
        assert_eq!(trends.iter().map(|p| p.total).sum::<u64>(), 2);
        assert_eq!(trends.last().unwrap().critical, 1);
        assert!(trends.windows(2).all(|w| w[0].bucket_start < w[1].bucket_start));
    }

    #[tokio::test]
    async fn test_windows_outside_bounds_are_errors() {
        let (mut collector, _) = collector();
        let now = Utc::now();

        for window in [-5, 0, MAX_WINDOW_MINUTES + 1, i64::MAX] {
            assert!(matches!(
                collector.error_rate_at("rds-query", window, now).await,
                Err(MetricsError::InvalidWindow(w)) if w == window
            ));
            assert!(collector
                .aggregated_metrics_at(&[MetricType::ErrorCount], window, false, now)
                .await
                .is_err());
            assert!(collector.error_trends_at(window, 5, now).await.is_err());
        }

        let trends = collector.error_trends_at(MAX_WINDOW_MINUTES, 60, now).await.unwrap();
        assert_eq!(trends.len(), 168);
    }
}
