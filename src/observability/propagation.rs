//! Trace context propagation over HTTP headers (W3C `traceparent`).
//!
//! `extract` reads the inbound parent of a server span; `inject_headers`
//! writes the current span into an outgoing request so the downstream
//! service continues the trace.

use axum::http::{HeaderMap, HeaderValue};

use crate::observability::tracing::SpanContext;

pub const TRACEPARENT: &str = "traceparent";

const VERSION: &str = "00";
const SAMPLED_FLAG: u8 = 0x01;

/// Parse the inbound `traceparent` header. Missing or malformed headers
/// yield `None`, which makes the server span a root.
pub fn extract(headers: &HeaderMap) -> Option<SpanContext> {
    let value = headers.get(TRACEPARENT)?.to_str().ok()?;
    parse_traceparent(value.trim())
}

/// Write `context` into `headers` as a `traceparent` header.
pub fn inject_headers(context: &SpanContext, headers: &mut HeaderMap) {
    let value = format_traceparent(context);
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(TRACEPARENT, value);
    }
}

pub fn format_traceparent(context: &SpanContext) -> String {
    let flags = if context.sampled { SAMPLED_FLAG } else { 0 };
    format!(
        "{VERSION}-{}-{}-{flags:02x}",
        context.trace_id_hex(),
        context.span_id_hex()
    )
}

fn parse_traceparent(value: &str) -> Option<SpanContext> {
    let mut parts = value.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;

    if version.len() != 2 || version.eq_ignore_ascii_case("ff") || !is_hex(version) {
        return None;
    }
    // Version 00 has exactly four fields; later versions may append more.
    if version == VERSION && parts.next().is_some() {
        return None;
    }
    if trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
        return None;
    }
    if !is_hex(trace_id) || !is_hex(span_id) || !is_hex(flags) {
        return None;
    }

    let trace_id = u128::from_str_radix(trace_id, 16).ok()?;
    let span_id = u64::from_str_radix(span_id, 16).ok()?;
    let flags = u8::from_str_radix(flags, 16).ok()?;
    if trace_id == 0 || span_id == 0 {
        return None;
    }

    Some(SpanContext {
        trace_id,
        span_id,
        sampled: flags & SAMPLED_FLAG != 0,
    })
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}
