//! Request telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (http::middleware)
//!     → Interceptor::before_request
//!         → RouteResolver::resolve     (identity.rs, cached per template)
//!         → InFlightTracker::enter     (inflight.rs, gauges up)
//!         → SpanRecorder::create/activate (span.rs)
//!     → handler runs (busy time measured)
//!     → Interceptor::after_request / on_exception / Drop
//!         → classify                   (classify.rs)
//!         → MetricAggregator::record   (aggregator.rs)
//!         → ActiveSpan::finish         (span.rs)
//!         → InFlightGuard drop         (gauges down)
//! ```
//!
//! # Design Decisions
//! - Everything is owned by a `Telemetry` value built at attachment; no
//!   process globals
//! - Sink failures never reach the request path
//! - Cleanup lives in one place (`RequestScope`) and runs on every exit

pub mod aggregator;
pub mod classify;
pub mod context;
pub mod heartbeat;
pub mod identity;
pub mod inflight;
pub mod interceptor;
pub mod span;
pub mod tags;

pub use context::{attach, Telemetry};
pub use identity::{MetricKey, ResolvedRoute, RouteIdentity, RouteResolver};
pub use inflight::InFlightTracker;
pub use interceptor::{Failure, Interceptor, RequestHooks, RequestInfo, RequestScope};
pub use span::{ActiveSpan, FinishedSpan, PendingSpan, SpanRecord, SpanRecorder};
pub use tags::{TagSet, TagTemplates};

use crate::error::SinkError;

/// Log and drop a reporter or tracer failure.
pub(crate) fn sink_result(kind: &str, name: &str, result: Result<(), SinkError>) {
    if let Err(e) = result {
        tracing::debug!(kind, name, error = %e, "Telemetry sink rejected submission");
    }
}
