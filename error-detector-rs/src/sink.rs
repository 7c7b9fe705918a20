// error-detector-rs/src/sink.rs
// Best-effort metric emission for classified errors

use std::sync::Mutex;

use metrics::{counter, histogram};
use shared_types::ClassifiedError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("Metric backend unavailable: {0}")]
    Unavailable(String),
}

/// Receives one record per classified error.
///
/// Implementations report failures instead of panicking; the detector logs
/// and drops them so classification never depends on the backend.
pub trait MetricSink: Send + Sync {
    fn record(&self, error: &ClassifiedError, response_time_ms: Option<f64>) -> Result<(), SinkError>;
}

/// Forwards classifications to the `metrics` facade
#[derive(Debug, Default, Clone)]
pub struct FacadeMetricSink;

impl MetricSink for FacadeMetricSink {
    fn record(&self, error: &ClassifiedError, response_time_ms: Option<f64>) -> Result<(), SinkError> {
        counter!(
            "errors.classified",
            1,
            "category" => error.category.as_str(),
            "severity" => error.severity.as_str(),
            "service" => error.service.clone()
        );
        if let Some(ms) = response_time_ms {
            histogram!("errors.response_time_ms", ms, "service" => error.service.clone());
        }
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default, Clone)]
pub struct NoopMetricSink;

impl MetricSink for NoopMetricSink {
    fn record(&self, _error: &ClassifiedError, _response_time_ms: Option<f64>) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps the ids of recorded errors in memory
#[derive(Debug, Default)]
pub struct RecordingMetricSink {
    recorded: Mutex<Vec<String>>,
}

impl RecordingMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<String> {
        match self.recorded.lock() {
            Ok(recorded) => recorded.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl MetricSink for RecordingMetricSink {
    fn record(&self, error: &ClassifiedError, _response_time_ms: Option<f64>) -> Result<(), SinkError> {
        let mut recorded = self
            .recorded
            .lock()
            .map_err(|_| SinkError::Unavailable("recording sink poisoned".to_string()))?;
        recorded.push(error.id.clone());
        Ok(())
    }
}
