//! Server span lifecycle.
//!
//! ```text
//! SpanRecorder::create → PendingSpan   (CREATED: ids and links assigned)
//!            .activate() → ActiveSpan  (ACTIVE: submitted, tags attached)
//!            .finish()   → FinishedSpan (FINALIZED: duration, error, frozen)
//! ```
//!
//! Each transition consumes the previous state, so a span cannot be tagged
//! after it finished or finished twice. An `ActiveSpan` dropped without
//! `finish` is finalized from `Drop` as an error.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::observability::tracing::{epoch_millis, SpanContext, SpanHandle, SpanStart, Tracer};
use crate::telemetry::sink_result;
use crate::telemetry::tags::{
    TagSet, ERROR_KIND_TAG, ERROR_MESSAGE_TAG, ERROR_TAG, STATUS_CODE_TAG,
};

/// A finished span as handed to a tracer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanRecord {
    pub trace_id: u128,
    pub span_id: u64,
    pub parent_id: Option<u64>,
    pub follows_from: Option<u64>,
    pub operation_name: String,
    pub start_time_ms: u64,
    pub duration_ms: u64,
    pub tags: TagSet,
    pub error: bool,
}

/// Why a request ended without a normal response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanError {
    pub kind: &'static str,
    pub message: String,
}

/// Opens server spans against a tracer.
#[derive(Clone)]
pub struct SpanRecorder {
    tracer: Arc<dyn Tracer>,
}

impl SpanRecorder {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self { tracer }
    }

    /// Allocate a span. With no parent it becomes the root of a new trace.
    pub fn create(
        &self,
        operation_name: impl Into<String>,
        parent: Option<SpanContext>,
        follows_from: Option<SpanContext>,
    ) -> PendingSpan {
        let context = match parent.as_ref().or(follows_from.as_ref()) {
            Some(linked) => SpanContext::child_of(linked),
            None => SpanContext::new_root(),
        };
        PendingSpan {
            tracer: self.tracer.clone(),
            context,
            parent,
            follows_from,
            operation_name: operation_name.into(),
        }
    }
}

/// CREATED: identifiers assigned, nothing submitted yet.
pub struct PendingSpan {
    tracer: Arc<dyn Tracer>,
    context: SpanContext,
    parent: Option<SpanContext>,
    follows_from: Option<SpanContext>,
    operation_name: String,
}

impl PendingSpan {
    pub fn context(&self) -> SpanContext {
        self.context
    }

    /// Start the clock and submit the span to the tracer.
    pub fn activate(self) -> ActiveSpan {
        let start_time = SystemTime::now();
        let handle = self
            .tracer
            .start_span(&SpanStart {
                context: self.context,
                operation_name: &self.operation_name,
                parent: self.parent,
                follows_from: self.follows_from,
                start_time,
            })
            .map_err(|e| {
                tracing::debug!(operation = %self.operation_name, error = %e, "Tracer rejected span");
            })
            .ok();

        ActiveSpan {
            tracer: self.tracer,
            handle,
            context: self.context,
            parent: self.parent,
            follows_from: self.follows_from,
            operation_name: self.operation_name,
            start_time,
            started: Instant::now(),
            tags: TagSet::new(),
            finalized: false,
        }
    }
}

/// ACTIVE: submitted, accepting tags.
pub struct ActiveSpan {
    tracer: Arc<dyn Tracer>,
    handle: Option<SpanHandle>,
    context: SpanContext,
    parent: Option<SpanContext>,
    follows_from: Option<SpanContext>,
    operation_name: String,
    start_time: SystemTime,
    started: Instant,
    tags: TagSet,
    finalized: bool,
}

impl ActiveSpan {
    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Attach a tag, replacing any previous value for `key`.
    pub fn set_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key, value);
        if let Some(handle) = &self.handle {
            sink_result("span tag", key, self.tracer.set_tag(handle, key, value));
        }
    }

    /// Attach every tag of `tags`.
    pub fn set_tags(&mut self, tags: &TagSet) {
        for (k, v) in tags.iter() {
            self.set_tag(k, v);
        }
    }

    /// Finalize the span. `status` is the response status when one was
    /// produced; `failure` describes a panic, cancellation or service error.
    pub fn finish(mut self, status: Option<u16>, failure: Option<SpanError>) -> FinishedSpan {
        self.finalize(status, failure)
    }

    fn finalize(&mut self, status: Option<u16>, failure: Option<SpanError>) -> FinishedSpan {
        self.finalized = true;

        if let Some(status) = status {
            self.set_tag(STATUS_CODE_TAG, &status.to_string());
        }
        let error = failure.is_some() || status.is_some_and(|s| s >= 400);
        if error {
            self.set_tag(ERROR_TAG, "true");
        }
        if let Some(failure) = &failure {
            self.set_tag(ERROR_KIND_TAG, failure.kind);
            self.set_tag(ERROR_MESSAGE_TAG, &failure.message);
        }

        let elapsed = self.started.elapsed();
        if let Some(handle) = self.handle.take() {
            sink_result(
                "span",
                &self.operation_name,
                self.tracer.finish_span(handle, self.start_time + elapsed),
            );
        }

        FinishedSpan(SpanRecord {
            trace_id: self.context.trace_id,
            span_id: self.context.span_id,
            parent_id: self.parent.map(|p| p.span_id),
            follows_from: self.follows_from.map(|f| f.span_id),
            operation_name: std::mem::take(&mut self.operation_name),
            start_time_ms: epoch_millis(self.start_time),
            duration_ms: duration_millis(elapsed),
            tags: std::mem::take(&mut self.tags),
            error,
        })
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if !self.finalized {
            self.finalize(
                None,
                Some(SpanError {
                    kind: "abandoned",
                    message: "span dropped before it was finished".to_string(),
                }),
            );
        }
    }
}

fn duration_millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// FINALIZED: read-only view of the submitted span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSpan(SpanRecord);

impl FinishedSpan {
    pub fn record(&self) -> &SpanRecord {
        &self.0
    }

    pub fn into_record(self) -> SpanRecord {
        self.0
    }
}
