//! Request interception hooks.
//!
//! # Responsibilities
//! - Tie route resolution, in-flight gauges, response metrics and the
//!   server span together around one request
//! - Run cleanup exactly once, whichever way the request ends
//!
//! # Design Decisions
//! - `before_request` returns a `RequestScope` that owns the span and the
//!   in-flight guard; `after_request` and `on_exception` consume it
//! - A scope dropped without either hook is a failure: panicked if the
//!   handler panicked, cancelled otherwise
//! - Busy time is the sum of the handler future's poll durations

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::config::TelemetryConfig;
use crate::observability::metrics::Reporter;
use crate::observability::tracing::{SpanContext, Tracer};
use crate::telemetry::aggregator::{CompletedRequest, MetricAggregator};
use crate::telemetry::classify::classify;
use crate::telemetry::identity::{ResolvedRoute, RouteResolver};
use crate::telemetry::inflight::{InFlightGuard, InFlightTracker};
use crate::telemetry::span::{ActiveSpan, SpanError, SpanRecorder};
use crate::telemetry::tags::{
    TagSet, TagTemplates, COMPONENT_TAG_KEY, HTTP_METHOD_TAG, HTTP_URL_TAG, SPAN_KIND_TAG,
};

/// Status recorded for a request whose handler panicked.
pub const PANIC_STATUS: u16 = 500;
/// Status recorded for a request abandoned before it completed.
pub const CANCELLED_STATUS: u16 = 499;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Called with every server span right after it starts.
pub type StartSpanHook =
    Arc<dyn Fn(&mut ActiveSpan, &RequestInfo) -> Result<(), BoxError> + Send + Sync>;

/// What the interceptor needs to know about an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    /// Matched route template; `None` when no route matched.
    pub route_template: Option<String>,
    pub url: String,
    /// Parent span propagated by the caller.
    pub parent: Option<SpanContext>,
    /// Traced request attributes, already filtered to non-empty values.
    pub attributes: TagSet,
}

/// How a request failed to produce a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Panicked(String),
    Cancelled,
    Service(String),
}

impl Failure {
    /// Status recorded in metrics and on the span.
    pub fn status(&self) -> u16 {
        match self {
            Failure::Panicked(_) | Failure::Service(_) => PANIC_STATUS,
            Failure::Cancelled => CANCELLED_STATUS,
        }
    }

    fn span_error(&self) -> SpanError {
        match self {
            Failure::Panicked(message) => SpanError {
                kind: "panic",
                message: message.clone(),
            },
            Failure::Cancelled => SpanError {
                kind: "cancelled",
                message: "request dropped before completion".to_string(),
            },
            Failure::Service(message) => SpanError {
                kind: "service",
                message: message.clone(),
            },
        }
    }
}

/// Framework-neutral request hooks.
pub trait RequestHooks {
    type Scope;

    /// Called before the handler is dispatched.
    fn before_request(&self, request: &RequestInfo) -> Self::Scope;

    /// Called once the handler produced a response.
    fn after_request(&self, scope: Self::Scope, status: u16);

    /// Called when the handler failed without producing a response.
    fn on_exception(&self, scope: Self::Scope, failure: Failure);
}

struct Shared {
    resolver: RouteResolver,
    tracker: Arc<InFlightTracker>,
    aggregator: MetricAggregator,
    recorder: SpanRecorder,
    tags: Arc<TagTemplates>,
}

/// Shared request instrumentation. Cheap to clone.
#[derive(Clone)]
pub struct Interceptor {
    shared: Arc<Shared>,
    start_span_hook: Option<StartSpanHook>,
}

impl Interceptor {
    pub fn new(
        config: &TelemetryConfig,
        reporter: Arc<dyn Reporter>,
        tracer: Arc<dyn Tracer>,
    ) -> Self {
        let tags = Arc::new(TagTemplates::new(
            &config.application,
            &config.telemetry.component,
        ));
        let tracker = Arc::new(InFlightTracker::new(reporter.clone(), tags.overall()));

        Self {
            shared: Arc::new(Shared {
                resolver: RouteResolver::new(&config.telemetry.handlers),
                tracker,
                aggregator: MetricAggregator::new(reporter, tags.clone()),
                recorder: SpanRecorder::new(tracer),
                tags,
            }),
            start_span_hook: None,
        }
    }

    /// Install a callback run on every server span after it starts.
    pub fn with_start_span_hook(mut self, hook: StartSpanHook) -> Self {
        self.start_span_hook = Some(hook);
        self
    }

    pub fn tracker(&self) -> &Arc<InFlightTracker> {
        &self.shared.tracker
    }

    pub fn resolver(&self) -> &RouteResolver {
        &self.shared.resolver
    }

    pub fn tags(&self) -> &TagTemplates {
        &self.shared.tags
    }
}

impl RequestHooks for Interceptor {
    type Scope = RequestScope;

    fn before_request(&self, request: &RequestInfo) -> RequestScope {
        let started = Instant::now();
        let shared = &self.shared;

        let route = shared
            .resolver
            .resolve(&request.method, request.route_template.as_deref());
        let handler = route.identity.handler_name();
        let guard = shared.tracker.enter(&route, shared.tags.per_route(handler));

        // Standard tags go last so application and attribute tags cannot
        // replace them.
        let mut span = shared.recorder.create(handler, request.parent, None).activate();
        span.set_tags(shared.tags.span());
        span.set_tags(&request.attributes);
        span.set_tag(COMPONENT_TAG_KEY, shared.tags.component());
        span.set_tag(SPAN_KIND_TAG, "server");
        span.set_tag(HTTP_METHOD_TAG, route.identity.method());
        span.set_tag(HTTP_URL_TAG, &request.url);
        span.set_tag(shared.tags.func_key(), handler);

        if let Some(hook) = &self.start_span_hook {
            if let Err(e) = hook(&mut span, request) {
                tracing::warn!(handler = %handler, error = %e, "Start-span hook failed");
            }
        }

        RequestScope {
            shared: self.shared.clone(),
            clock: BusyClock::default(),
            state: Some(ScopeState {
                route,
                span,
                guard,
                started,
            }),
        }
    }

    fn after_request(&self, mut scope: RequestScope, status: u16) {
        scope.complete(status, None);
    }

    fn on_exception(&self, mut scope: RequestScope, failure: Failure) {
        scope.complete(failure.status(), Some(failure));
    }
}

struct ScopeState {
    route: Arc<ResolvedRoute>,
    span: ActiveSpan,
    guard: InFlightGuard,
    started: Instant,
}

/// One request in flight.
///
/// Dropping it without `after_request` or `on_exception` records a failure.
pub struct RequestScope {
    shared: Arc<Shared>,
    clock: BusyClock,
    state: Option<ScopeState>,
}

impl RequestScope {
    pub fn route(&self) -> Option<&ResolvedRoute> {
        self.state.as_ref().map(|s| s.route.as_ref())
    }

    /// Context of the server span, for handlers and outgoing calls.
    pub fn span_context(&self) -> Option<SpanContext> {
        self.state.as_ref().map(|s| s.span.context())
    }

    /// Clock accumulating the handler's busy time.
    pub fn clock(&self) -> BusyClock {
        self.clock.clone()
    }

    fn complete(&mut self, status: u16, failure: Option<Failure>) {
        let Some(state) = self.state.take() else {
            return;
        };

        let classification = classify(status);
        let error = classification.error || failure.is_some();

        self.shared.aggregator.record(&CompletedRequest {
            route: &state.route,
            status,
            latency: state.started.elapsed(),
            busy: self.clock.busy(),
            error,
        });

        let finished = state
            .span
            .finish(Some(status), failure.as_ref().map(Failure::span_error));
        drop(state.guard);

        tracing::debug!(
            handler = %state.route.identity.handler_name(),
            status,
            class = ?classification.class,
            duration_ms = finished.record().duration_ms,
            "Request completed"
        );
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.state.is_none() {
            return;
        }
        let failure = match self.clock.panic_message() {
            Some(message) => Failure::Panicked(message),
            None if std::thread::panicking() => Failure::Panicked("handler panicked".to_string()),
            None => Failure::Cancelled,
        };
        self.complete(failure.status(), Some(failure));
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("route", &self.route().map(|r| r.key.to_string()))
            .field("open", &self.state.is_some())
            .finish()
    }
}

#[derive(Default)]
struct ClockState {
    busy_nanos: AtomicU64,
    panic: Mutex<Option<String>>,
}

/// Busy time and panic status of one request's handler.
#[derive(Clone, Default)]
pub struct BusyClock {
    state: Arc<ClockState>,
}

impl BusyClock {
    pub fn busy(&self) -> Duration {
        Duration::from_nanos(self.state.busy_nanos.load(Ordering::Relaxed))
    }

    fn add(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.state.busy_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    fn mark_panicked(&self, message: String) {
        *self.state.panic.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    fn panic_message(&self) -> Option<String> {
        self.state
            .panic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wrap a handler future so its poll time and panics are recorded.
    pub fn measure<F: Future>(&self, future: F) -> Measured<F> {
        Measured {
            inner: Box::pin(future),
            clock: self.clone(),
        }
    }
}

/// Future returned by [`BusyClock::measure`].
pub struct Measured<F> {
    inner: Pin<Box<F>>,
    clock: BusyClock,
}

impl<F: Future> Future for Measured<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let started = Instant::now();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            this.inner.as_mut().poll(cx)
        }));
        this.clock.add(started.elapsed());

        match result {
            Ok(poll) => poll,
            Err(payload) => {
                this.clock.mark_panicked(panic_message(payload.as_ref()));
                std::panic::resume_unwind(payload)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
