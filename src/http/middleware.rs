//! Request telemetry middleware.
//! Binds the framework-neutral `Interceptor` to axum.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::config::TracedAttribute;
use crate::http::request::request_info;
use crate::telemetry::interceptor::{Interceptor, RequestHooks};

/// Marker extension for requests already seen by a telemetry middleware.
#[derive(Clone, Copy, Debug)]
pub struct Instrumented;

/// State of the telemetry middleware.
#[derive(Clone)]
pub struct TelemetryState {
    interceptor: Interceptor,
    traced_attributes: Arc<[TracedAttribute]>,
}

impl TelemetryState {
    pub fn new(interceptor: Interceptor, traced_attributes: Vec<TracedAttribute>) -> Self {
        Self {
            interceptor,
            traced_attributes: traced_attributes.into(),
        }
    }
}

pub async fn telemetry_middleware(
    State(state): State<TelemetryState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // Nested routers share one request; only the outermost layer records it.
    if req.extensions().get::<Instrumented>().is_some() {
        return next.run(req).await;
    }

    let info = request_info(&req, &state.traced_attributes);
    let scope = state.interceptor.before_request(&info);

    if let Some(context) = scope.span_context() {
        req.extensions_mut().insert(context);
    }
    req.extensions_mut().insert(Instrumented);

    let response = scope.clock().measure(next.run(req)).await;
    state
        .interceptor
        .after_request(scope, response.status().as_u16());
    response
}
