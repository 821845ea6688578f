//! Tests of the sample application served by the demo binary.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::to_bytes,
    http::{Method, StatusCode},
    routing::get,
    Router,
};
use tower::ServiceExt;

use request_telemetry::config::{ApplicationTags, TelemetryConfig};
use request_telemetry::error::ConfigError;
use request_telemetry::http::server::{instrumented_router, sample_routes, ShirtOrder};
use request_telemetry::http::HttpServer;
use request_telemetry::{MemoryReporter, MemoryTracer, TelemetryError};

mod common;

fn sample_config() -> TelemetryConfig {
    let mut config = common::test_config();
    config.telemetry = config
        .telemetry
        .with_handler("POST", "/style/{id}/ship", "ship_shirts");
    config
}

#[tokio::test]
async fn test_make_shirts_reports_its_trace() {
    let app = common::instrument_with(sample_routes(), sample_config());

    let response = app.send(common::get("/style/beach/make")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let order: ShirtOrder = serde_json::from_slice(&body).unwrap();

    let span = &app.tracer.finished()[0];
    assert_eq!(order.style, "beach");
    assert_eq!(order.trace_id, Some(format!("{:032x}", span.trace_id)));
    assert_eq!(span.operation_name, "make_shirts");
}

#[tokio::test]
async fn test_ship_shirts_is_an_error() {
    let app = common::instrument_with(sample_routes(), sample_config());

    let response = app
        .send(common::request(Method::POST, "/style/beach/ship"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    assert_eq!(
        app.reporter
            .counter("response.style.path:id.ship.POST.502.cumulative.count"),
        1
    );
    let span = &app.tracer.finished()[0];
    assert_eq!(span.operation_name, "ship_shirts");
    assert!(span.error);
}

#[tokio::test]
async fn test_index_and_wrong_method() {
    let app = common::instrument_with(sample_routes(), sample_config());

    assert_eq!(app.send(common::get("/")).await.status(), StatusCode::OK);
    assert_eq!(app.reporter.counter("response.root.GET.200.cumulative.count"), 1);

    let response = app.send(common::get("/style/beach/ship")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(app.reporter.counter("response.errors.count"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_request_is_recorded() {
    let mut config = common::test_config();
    config.server.request_timeout_secs = 1;
    let reporter = Arc::new(MemoryReporter::new());
    let tracer = Arc::new(MemoryTracer::new());
    let routes = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "too late"
        }),
    );

    let (router, telemetry) =
        instrumented_router(routes, &config, tracer.clone(), reporter.clone()).unwrap();
    let response = router.oneshot(common::get("/slow")).await.unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(reporter.counter("response.slow.GET.408.cumulative.count"), 1);
    assert_eq!(reporter.counter("response.errors.count"), 1);
    let spans = tracer.finished();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].tags.get("http.status_code"), Some("408"));
    assert!(telemetry.in_flight().is_quiescent());
}

#[tokio::test]
async fn test_server_rejects_invalid_config() {
    let config = TelemetryConfig::new(ApplicationTags::new("beachshirts", ""));

    let result = HttpServer::new(
        config,
        Arc::new(MemoryTracer::new()),
        Arc::new(MemoryReporter::new()),
    );
    assert!(matches!(
        result,
        Err(TelemetryError::Config(ConfigError::Validation(_)))
    ));
}

#[tokio::test]
async fn test_server_builds_from_sample_config() {
    let server = HttpServer::new(
        sample_config(),
        Arc::new(MemoryTracer::new()),
        Arc::new(MemoryReporter::new()),
    )
    .unwrap();

    assert_eq!(server.config().application.application, "beachshirts");
    assert!(server.telemetry().in_flight().is_quiescent());
}
