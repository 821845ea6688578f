//! Metrics reporting.
//!
//! # Responsibilities
//! - Define the `Reporter` interface the middleware emits through
//! - Forward samples to the `metrics` facade (`MetricsReporter`)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Design Decisions
//! - Reporter calls are non-blocking enqueues; nothing waits on a flush
//! - Names are hierarchical (`response.style.path:id.make.GET.200...`); the
//!   Prometheus exporter sanitizes them on export
//! - Tags become labels, plus `source` when configured

use std::net::SocketAddr;

use metrics::Label;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{SinkError, TelemetryError};
use crate::telemetry::tags::{TagSet, SOURCE_TAG_KEY};

/// Destination for counters, gauges and histogram samples.
///
/// Implementations may buffer or batch. Errors are reported back so the
/// caller can log them, but are never propagated to request handling.
pub trait Reporter: Send + Sync + 'static {
    fn increment_counter(&self, name: &str, tags: &TagSet, delta: u64) -> Result<(), SinkError>;

    fn set_gauge(&self, name: &str, tags: &TagSet, value: f64) -> Result<(), SinkError>;

    fn record_histogram_sample(&self, name: &str, tags: &TagSet, value: f64)
        -> Result<(), SinkError>;
}

/// Reporter backed by the global `metrics` recorder.
#[derive(Debug, Clone, Default)]
pub struct MetricsReporter {
    prefix: String,
    source: Option<String>,
}

impl MetricsReporter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            source: None,
        }
    }

    /// Add a `source` label to every sample.
    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn labels(&self, tags: &TagSet) -> Vec<Label> {
        let mut labels: Vec<Label> = tags
            .iter()
            .map(|(k, v)| Label::new(k.to_string(), v.to_string()))
            .collect();
        if let Some(source) = &self.source {
            if !tags.contains_key(SOURCE_TAG_KEY) {
                labels.push(Label::new(SOURCE_TAG_KEY, source.clone()));
            }
        }
        labels
    }
}

impl Reporter for MetricsReporter {
    fn increment_counter(&self, name: &str, tags: &TagSet, delta: u64) -> Result<(), SinkError> {
        metrics::counter!(self.metric_name(name), self.labels(tags)).increment(delta);
        Ok(())
    }

    fn set_gauge(&self, name: &str, tags: &TagSet, value: f64) -> Result<(), SinkError> {
        metrics::gauge!(self.metric_name(name), self.labels(tags)).set(value);
        Ok(())
    }

    fn record_histogram_sample(
        &self,
        name: &str,
        tags: &TagSet,
        value: f64,
    ) -> Result<(), SinkError> {
        metrics::histogram!(self.metric_name(name), self.labels(tags)).record(value);
        Ok(())
    }
}

/// Install the Prometheus recorder and start its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), TelemetryError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}
