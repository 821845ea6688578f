//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! telemetry (interceptor)
//!     → metrics.rs (Reporter: counters, gauges, histograms)
//!     → tracing.rs (Tracer: span start / tag / finish)
//!     → propagation.rs (traceparent in, traceparent out)
//!
//! Sinks:
//!     → MetricsReporter → `metrics` facade → Prometheus scrape
//!     → LogTracer → structured log events (logging.rs)
//!     → MemoryReporter / MemoryTracer → in-process inspection
//! ```
//!
//! # Design Decisions
//! - Sinks sit behind narrow traits; the interceptor never knows which one
//! - Submission errors are values, never panics

pub mod logging;
pub mod memory;
pub mod metrics;
pub mod propagation;
pub mod tracing;

pub use self::memory::{MemoryReporter, MemoryTracer};
pub use self::metrics::{MetricsReporter, Reporter};
pub use self::tracing::{LogTracer, SpanContext, SpanHandle, SpanStart, Tracer};
