//! Per-request response metrics.
//!
//! # Metrics
//! - `response.<route>.<METHOD>.<status>.cumulative.count` (counter)
//! - `response.<route>.summary.<METHOD>.<status>.latency` (histogram, ms)
//! - `response.<route>.summary.<METHOD>.<status>.cpu_ns` (histogram, ns)
//! - `response.<route>.summary.<METHOD>.<status>.total_time.count` (counter, µs)
//! - `response.completed.aggregated_per_source.count` (counter)
//! - on error: `response.<route>.<METHOD>.errors.count`,
//!   `response.errors.count`, `response.errors.aggregated_per_source.count`
//!
//! Rollups across shard, service, cluster and application happen in the
//! backend and are not emitted here.

use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics::Reporter;
use crate::telemetry::identity::ResolvedRoute;
use crate::telemetry::sink_result;
use crate::telemetry::tags::{TagSet, TagTemplates};

pub const COMPLETED_PER_SOURCE: &str = "response.completed.aggregated_per_source.count";
pub const ERRORS: &str = "response.errors.count";
pub const ERRORS_PER_SOURCE: &str = "response.errors.aggregated_per_source.count";

/// A request that has left dispatch.
#[derive(Debug, Clone, Copy)]
pub struct CompletedRequest<'a> {
    pub route: &'a ResolvedRoute,
    pub status: u16,
    /// Wall-clock time from before-dispatch to after-dispatch.
    pub latency: Duration,
    /// Time spent actually executing the handler.
    pub busy: Duration,
    pub error: bool,
}

/// Emits response metrics through a reporter.
pub struct MetricAggregator {
    reporter: Arc<dyn Reporter>,
    tags: Arc<TagTemplates>,
}

impl MetricAggregator {
    pub fn new(reporter: Arc<dyn Reporter>, tags: Arc<TagTemplates>) -> Self {
        Self { reporter, tags }
    }

    /// Record one completed request. Call exactly once per request.
    pub fn record(&self, request: &CompletedRequest<'_>) {
        let route = request.route;
        let complete = self.tags.complete(route.identity.handler_name());
        let overall = self.tags.overall();

        let cumulative = route
            .response_key(request.status)
            .child("cumulative")
            .child("count")
            .to_string();
        self.counter(&cumulative, &complete, 1);

        let summary = route.summary_key(request.status);
        let latency_ms = request.latency.as_nanos() as f64 / 1_000_000.0;
        self.histogram(&summary.child("latency").to_string(), &complete, latency_ms);
        self.histogram(
            &summary.child("cpu_ns").to_string(),
            &complete,
            request.busy.as_nanos() as f64,
        );
        self.counter(
            &summary.child("total_time").child("count").to_string(),
            &complete,
            u64::try_from(request.latency.as_micros()).unwrap_or(u64::MAX),
        );

        self.counter(COMPLETED_PER_SOURCE, &overall, 1);

        if request.error {
            let route_errors = route
                .response_method_key()
                .child("errors")
                .child("count")
                .to_string();
            self.counter(&route_errors, &complete, 1);
            self.counter(ERRORS, &complete, 1);
            self.counter(ERRORS_PER_SOURCE, &overall, 1);
        }

        tracing::trace!(
            metric = %cumulative,
            status = request.status,
            latency_ms,
            error = request.error,
            "Response metrics recorded"
        );
    }

    fn counter(&self, name: &str, tags: &TagSet, delta: u64) {
        sink_result("counter", name, self.reporter.increment_counter(name, tags, delta));
    }

    fn histogram(&self, name: &str, tags: &TagSet, value: f64) {
        sink_result(
            "histogram",
            name,
            self.reporter.record_histogram_sample(name, tags, value),
        );
    }
}
