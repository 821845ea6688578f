//! Distributed tracing support.
//!
//! # Responsibilities
//! - Define span identifiers and the `Tracer` submission interface
//! - Buffer open spans until they finish (`SpanBuffer`)
//! - Emit finished spans as structured log events (`LogTracer`)
//!
//! # Design Decisions
//! - Trace ids are 128-bit, span ids 64-bit and never zero (W3C compatible)
//! - Tracers own span handles; the recorder never assumes handle == span id
//! - Submission failures are returned, logged by the caller, and dropped

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::SinkError;
use crate::telemetry::span::SpanRecord;
use crate::telemetry::tags::{TagSet, ERROR_TAG};

/// Identifies a span within a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: u128,
    pub span_id: u64,
    pub sampled: bool,
}

impl SpanContext {
    /// A fresh root context.
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4().as_u128(),
            span_id: new_span_id(),
            sampled: true,
        }
    }

    /// A fresh context in the same trace as `parent`.
    pub fn child_of(parent: &SpanContext) -> Self {
        Self {
            trace_id: parent.trace_id,
            span_id: new_span_id(),
            sampled: parent.sampled,
        }
    }

    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }
}

fn new_span_id() -> u64 {
    loop {
        let id = fastrand::u64(..);
        if id != 0 {
            return id;
        }
    }
}

/// Opaque handle a tracer hands out for an open span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanHandle(pub u64);

/// Everything a tracer needs to open a span.
#[derive(Debug, Clone)]
pub struct SpanStart<'a> {
    pub context: SpanContext,
    pub operation_name: &'a str,
    pub parent: Option<SpanContext>,
    pub follows_from: Option<SpanContext>,
    pub start_time: SystemTime,
}

/// Destination for spans.
pub trait Tracer: Send + Sync + 'static {
    fn start_span(&self, span: &SpanStart<'_>) -> Result<SpanHandle, SinkError>;

    fn set_tag(&self, span: &SpanHandle, key: &str, value: &str) -> Result<(), SinkError>;

    fn finish_span(&self, span: SpanHandle, end_time: SystemTime) -> Result<(), SinkError>;
}

pub(crate) fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct OpenSpan {
    context: SpanContext,
    parent: Option<SpanContext>,
    follows_from: Option<SpanContext>,
    operation_name: String,
    start_time: SystemTime,
    tags: TagSet,
}

/// Open spans keyed by handle, assembled into `SpanRecord`s on finish.
#[derive(Default)]
pub struct SpanBuffer {
    next_handle: AtomicU64,
    open: DashMap<u64, OpenSpan>,
}

impl SpanBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, span: &SpanStart<'_>) -> SpanHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        self.open.insert(
            handle,
            OpenSpan {
                context: span.context,
                parent: span.parent,
                follows_from: span.follows_from,
                operation_name: span.operation_name.to_string(),
                start_time: span.start_time,
                tags: TagSet::new(),
            },
        );
        SpanHandle(handle)
    }

    pub fn set_tag(&self, span: &SpanHandle, key: &str, value: &str) -> Result<(), SinkError> {
        let mut open = self
            .open
            .get_mut(&span.0)
            .ok_or(SinkError::UnknownSpan(span.0))?;
        open.tags.insert(key, value);
        Ok(())
    }

    pub fn finish(&self, span: SpanHandle, end_time: SystemTime) -> Result<SpanRecord, SinkError> {
        let (_, open) = self
            .open
            .remove(&span.0)
            .ok_or(SinkError::UnknownSpan(span.0))?;
        let duration = end_time
            .duration_since(open.start_time)
            .unwrap_or(Duration::ZERO);
        let error = open.tags.get(ERROR_TAG) == Some("true");
        Ok(SpanRecord {
            trace_id: open.context.trace_id,
            span_id: open.context.span_id,
            parent_id: open.parent.map(|p| p.span_id),
            follows_from: open.follows_from.map(|f| f.span_id),
            operation_name: open.operation_name,
            start_time_ms: epoch_millis(open.start_time),
            duration_ms: duration.as_millis() as u64,
            tags: open.tags,
            error,
        })
    }

    /// Spans started but not yet finished.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

/// Tracer that writes each finished span as one structured log event.
#[derive(Default)]
pub struct LogTracer {
    buffer: SpanBuffer,
}

impl LogTracer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tracer for LogTracer {
    fn start_span(&self, span: &SpanStart<'_>) -> Result<SpanHandle, SinkError> {
        Ok(self.buffer.start(span))
    }

    fn set_tag(&self, span: &SpanHandle, key: &str, value: &str) -> Result<(), SinkError> {
        self.buffer.set_tag(span, key, value)
    }

    fn finish_span(&self, span: SpanHandle, end_time: SystemTime) -> Result<(), SinkError> {
        let record = self.buffer.finish(span, end_time)?;
        let tags = serde_json::to_string(&record.tags)
            .map_err(|e| SinkError::Rejected(e.to_string()))?;

        tracing::info!(
            target: "request_telemetry::span",
            trace_id = %format!("{:032x}", record.trace_id),
            span_id = %format!("{:016x}", record.span_id),
            parent_id = ?record.parent_id.map(|id| format!("{id:016x}")),
            operation = %record.operation_name,
            start_time_ms = record.start_time_ms,
            duration_ms = record.duration_ms,
            error = record.error,
            tags = %tags,
            "Span finished"
        );
        Ok(())
    }
}
