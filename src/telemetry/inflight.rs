//! In-flight request gauges.
//!
//! # Responsibilities
//! - Count requests that entered dispatch and have not yet left it
//! - Publish the per-route and global counts as gauges on every transition
//!
//! # Design Decisions
//! - `enter` returns a guard; dropping it is the only way to exit, so every
//!   path (return, panic unwinding, cancellation) exits exactly once
//! - Per-route counts update under the map entry lock and the total under a
//!   mutex, so gauge values reach the reporter in the order they changed

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::observability::metrics::Reporter;
use crate::telemetry::identity::ResolvedRoute;
use crate::telemetry::sink_result;
use crate::telemetry::tags::TagSet;

/// Gauge name of the global in-flight total.
pub const TOTAL_INFLIGHT: &str = "total_requests.inflight";

/// Tracks in-flight requests per route and in total.
pub struct InFlightTracker {
    reporter: Arc<dyn Reporter>,
    routes: DashMap<String, i64>,
    total: Mutex<i64>,
    total_tags: TagSet,
}

impl InFlightTracker {
    pub fn new(reporter: Arc<dyn Reporter>, total_tags: TagSet) -> Self {
        Self {
            reporter,
            routes: DashMap::new(),
            total: Mutex::new(0),
            total_tags,
        }
    }

    /// Gauge name for a route: `request.<route>.<METHOD>.inflight`.
    pub fn gauge_name(route: &ResolvedRoute) -> String {
        route.request_key().child("inflight").to_string()
    }

    /// Record a request entering dispatch.
    pub fn enter(self: &Arc<Self>, route: &ResolvedRoute, tags: TagSet) -> InFlightGuard {
        let gauge = Self::gauge_name(route);
        {
            let mut count = self.routes.entry(gauge.clone()).or_insert(0);
            *count += 1;
            sink_result("gauge", &gauge, self.reporter.set_gauge(&gauge, &tags, *count as f64));
        }
        self.update_total(1);

        InFlightGuard {
            tracker: self.clone(),
            gauge,
            tags,
        }
    }

    fn exit(&self, gauge: &str, tags: &TagSet) {
        if let Some(mut count) = self.routes.get_mut(gauge) {
            if *count > 0 {
                *count -= 1;
            } else {
                tracing::error!(gauge = %gauge, "In-flight gauge would go negative");
            }
            sink_result("gauge", gauge, self.reporter.set_gauge(gauge, tags, *count as f64));
        }
        self.update_total(-1);
    }

    fn update_total(&self, delta: i64) {
        let mut total = self.total.lock().unwrap_or_else(PoisonError::into_inner);
        *total = (*total + delta).max(0);
        sink_result(
            "gauge",
            TOTAL_INFLIGHT,
            self.reporter
                .set_gauge(TOTAL_INFLIGHT, &self.total_tags, *total as f64),
        );
    }

    /// Current in-flight count for one route.
    pub fn in_flight(&self, route: &ResolvedRoute) -> i64 {
        self.routes
            .get(&Self::gauge_name(route))
            .map(|c| *c)
            .unwrap_or(0)
    }

    /// Current in-flight count across all routes.
    pub fn total(&self) -> i64 {
        *self.total.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when no request is in flight on any route.
    pub fn is_quiescent(&self) -> bool {
        self.total() == 0 && self.routes.iter().all(|c| *c.value() == 0)
    }
}

/// Scoped in-flight registration; dropping it exits.
pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
    gauge: String,
    tags: TagSet,
}

impl std::fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("gauge", &self.gauge)
            .finish()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.exit(&self.gauge, &self.tags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::memory::MemoryReporter;
    use crate::telemetry::identity::RouteResolver;

    fn setup() -> (Arc<MemoryReporter>, Arc<InFlightTracker>) {
        let reporter = Arc::new(MemoryReporter::new());
        let tracker = Arc::new(InFlightTracker::new(reporter.clone(), TagSet::new()));
        (reporter, tracker)
    }

    #[test]
    fn test_enter_exit() {
        let (reporter, tracker) = setup();
        let route = RouteResolver::default().resolve("GET", Some("/style/{id}/make"));

        let a = tracker.enter(&route, TagSet::new());
        let b = tracker.enter(&route, TagSet::new());
        assert_eq!(tracker.in_flight(&route), 2);
        assert_eq!(reporter.gauge("request.style.path:id.make.GET.inflight"), Some(2.0));
        assert_eq!(reporter.gauge(TOTAL_INFLIGHT), Some(2.0));

        drop(a);
        drop(b);
        assert_eq!(tracker.in_flight(&route), 0);
        assert_eq!(reporter.gauge(TOTAL_INFLIGHT), Some(0.0));
        assert!(tracker.is_quiescent());
    }

    #[test]
    fn test_total_spans_routes() {
        let (_, tracker) = setup();
        let resolver = RouteResolver::default();
        let get = resolver.resolve("GET", Some("/a"));
        let post = resolver.resolve("POST", Some("/a"));

        let _g = tracker.enter(&get, TagSet::new());
        let _p = tracker.enter(&post, TagSet::new());
        assert_eq!(tracker.in_flight(&get), 1);
        assert_eq!(tracker.in_flight(&post), 1);
        assert_eq!(tracker.total(), 2);
    }

    #[test]
    fn test_concurrent_threads_return_to_zero() {
        let (reporter, tracker) = setup();
        let route = RouteResolver::default().resolve("GET", Some("/busy"));

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let _guard = tracker.enter(&route, TagSet::new());
                        assert!(tracker.in_flight(&route) >= 1);
                    }
                });
            }
        });

        assert_eq!(tracker.in_flight(&route), 0);
        assert!(tracker.is_quiescent());
        assert!(reporter
            .gauge_history("request.busy.GET.inflight")
            .iter()
            .all(|v| *v >= 0.0));
        assert_eq!(reporter.gauge(TOTAL_INFLIGHT), Some(0.0));
    }

    #[test]
    fn test_guard_released_on_panic() {
        let (_, tracker) = setup();
        let route = RouteResolver::default().resolve("GET", Some("/boom"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = tracker.enter(&route, TagSet::new());
            panic!("handler failed");
        }));

        assert!(result.is_err());
        assert_eq!(tracker.in_flight(&route), 0);
    }
}
