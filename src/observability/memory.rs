//! In-memory reporter and tracer.
//!
//! Keep every sample and finished span in process. Useful for tests and for
//! embedding applications that want to inspect their own telemetry.

use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use dashmap::DashMap;

use crate::error::SinkError;
use crate::observability::metrics::Reporter;
use crate::observability::tracing::{SpanBuffer, SpanHandle, SpanStart, Tracer};
use crate::telemetry::span::SpanRecord;
use crate::telemetry::tags::TagSet;

type SeriesKey = (String, TagSet);

/// Reporter that accumulates samples in memory.
#[derive(Default)]
pub struct MemoryReporter {
    counters: DashMap<SeriesKey, u64>,
    gauges: DashMap<SeriesKey, Vec<f64>>,
    histograms: DashMap<SeriesKey, Vec<f64>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter total summed across tag sets.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|e| e.key().0 == name)
            .map(|e| *e.value())
            .sum()
    }

    /// Counter value for one exact tag set.
    pub fn counter_with_tags(&self, name: &str, tags: &TagSet) -> Option<u64> {
        self.counters
            .get(&(name.to_string(), tags.clone()))
            .map(|v| *v)
    }

    /// Tag sets a counter has been reported with.
    pub fn counter_tags(&self, name: &str) -> Vec<TagSet> {
        let mut tags: Vec<TagSet> = self
            .counters
            .iter()
            .filter(|e| e.key().0 == name)
            .map(|e| e.key().1.clone())
            .collect();
        tags.sort();
        tags
    }

    /// Names of every counter reported so far, sorted.
    pub fn counter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.counters.iter().map(|e| e.key().0.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Latest gauge value, summed across tag sets.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        let mut found = false;
        let mut total = 0.0;
        for entry in self.gauges.iter().filter(|e| e.key().0 == name) {
            if let Some(last) = entry.value().last() {
                found = true;
                total += last;
            }
        }
        found.then_some(total)
    }

    /// Every value a gauge has been set to, in order, across tag sets.
    pub fn gauge_history(&self, name: &str) -> Vec<f64> {
        self.gauges
            .iter()
            .filter(|e| e.key().0 == name)
            .flat_map(|e| e.value().clone())
            .collect()
    }

    /// Histogram samples across tag sets.
    pub fn histogram(&self, name: &str) -> Vec<f64> {
        self.histograms
            .iter()
            .filter(|e| e.key().0 == name)
            .flat_map(|e| e.value().clone())
            .collect()
    }

    /// Names of every histogram reported so far, sorted.
    pub fn histogram_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .histograms
            .iter()
            .map(|e| e.key().0.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl Reporter for MemoryReporter {
    fn increment_counter(&self, name: &str, tags: &TagSet, delta: u64) -> Result<(), SinkError> {
        *self
            .counters
            .entry((name.to_string(), tags.clone()))
            .or_default() += delta;
        Ok(())
    }

    fn set_gauge(&self, name: &str, tags: &TagSet, value: f64) -> Result<(), SinkError> {
        self.gauges
            .entry((name.to_string(), tags.clone()))
            .or_default()
            .push(value);
        Ok(())
    }

    fn record_histogram_sample(
        &self,
        name: &str,
        tags: &TagSet,
        value: f64,
    ) -> Result<(), SinkError> {
        self.histograms
            .entry((name.to_string(), tags.clone()))
            .or_default()
            .push(value);
        Ok(())
    }
}

/// Tracer that keeps finished spans in memory.
#[derive(Default)]
pub struct MemoryTracer {
    buffer: SpanBuffer,
    finished: Mutex<Vec<SpanRecord>>,
}

impl MemoryTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished spans in completion order.
    pub fn finished(&self) -> Vec<SpanRecord> {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Spans started but not yet finished.
    pub fn open_count(&self) -> usize {
        self.buffer.open_count()
    }
}

impl Tracer for MemoryTracer {
    fn start_span(&self, span: &SpanStart<'_>) -> Result<SpanHandle, SinkError> {
        Ok(self.buffer.start(span))
    }

    fn set_tag(&self, span: &SpanHandle, key: &str, value: &str) -> Result<(), SinkError> {
        self.buffer.set_tag(span, key, value)
    }

    fn finish_span(&self, span: SpanHandle, end_time: SystemTime) -> Result<(), SinkError> {
        let record = self.buffer.finish(span, end_time)?;
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}
