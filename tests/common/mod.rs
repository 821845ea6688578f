//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use tower::ServiceExt;

use request_telemetry::config::{ApplicationTags, TelemetryConfig};
use request_telemetry::{attach, MemoryReporter, MemoryTracer, Telemetry};

/// An instrumented router with in-memory sinks.
pub struct TestApp {
    pub router: Router,
    pub telemetry: Telemetry,
    pub reporter: Arc<MemoryReporter>,
    pub tracer: Arc<MemoryTracer>,
}

impl TestApp {
    /// Send one request through the router.
    pub async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }
}

/// Configuration used by most tests: no heartbeat, named handlers.
pub fn test_config() -> TelemetryConfig {
    let mut config = TelemetryConfig::new(
        ApplicationTags::new("beachshirts", "styling")
            .with_cluster("us-west")
            .with_shard("primary"),
    );
    config.telemetry.heartbeat_interval_secs = 0;
    config.telemetry = config
        .telemetry
        .with_handler("GET", "/style/{id}/make", "make_shirts");
    config
}

pub fn instrument(router: Router) -> TestApp {
    instrument_with(router, test_config())
}

pub fn instrument_with(router: Router, config: TelemetryConfig) -> TestApp {
    let reporter = Arc::new(MemoryReporter::new());
    let tracer = Arc::new(MemoryTracer::new());
    let (router, telemetry) = attach(router, tracer.clone(), reporter.clone(), config).unwrap();
    TestApp {
        router,
        telemetry,
        reporter,
        tracer,
    }
}

pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "localhost:8080")
        .body(Body::empty())
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    request(Method::GET, uri)
}
