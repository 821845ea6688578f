//! End-to-end tests of the telemetry middleware on an axum router.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Extension, Path, State},
    http::{Method, Request, StatusCode},
    routing::get,
    Router,
};
use futures_util::future::join_all;
use tokio::sync::Notify;

use request_telemetry::observability::propagation::{inject_headers, TRACEPARENT};
use request_telemetry::observability::SpanContext;
use request_telemetry::telemetry::TagSet;

mod common;

const MAKE_CUMULATIVE: &str = "response.style.path:id.make.GET.200.cumulative.count";
const MAKE_INFLIGHT: &str = "request.style.path:id.make.GET.inflight";

async fn make_shirts(Path(id): Path<String>) -> String {
    format!("made {id}")
}

async fn ship_shirts() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "delivery service unavailable")
}

async fn explode(Path(id): Path<String>) -> String {
    panic!("no shirts left for style {id}");
}

async fn trace_id(Extension(span): Extension<SpanContext>) -> String {
    span.trace_id_hex()
}

async fn wait(State(gate): State<Arc<Notify>>) -> &'static str {
    gate.notified().await;
    "done"
}

fn shirts() -> Router {
    Router::new()
        .route("/style/{id}/make", get(make_shirts))
        .route("/style/{id}/ship", get(ship_shirts))
        .route("/style/{id}/explode", get(explode))
        .route("/trace", get(trace_id))
}

fn gated(gate: Arc<Notify>) -> Router {
    Router::new().route("/slow", get(wait)).with_state(gate)
}

async fn wait_for_in_flight(app: &common::TestApp, expected: i64) {
    for _ in 0..1000 {
        if app.telemetry.in_flight().total() == expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("in-flight count never reached {expected}");
}

#[tokio::test]
async fn test_successful_request() {
    let app = common::instrument(shirts());

    let response = app.send(common::get("/style/42/make")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let reporter = &app.reporter;
    assert_eq!(reporter.counter(MAKE_CUMULATIVE), 1);
    assert_eq!(
        reporter
            .histogram("response.style.path:id.make.summary.GET.200.latency")
            .len(),
        1
    );
    assert_eq!(
        reporter
            .histogram("response.style.path:id.make.summary.GET.200.cpu_ns")
            .len(),
        1
    );
    assert_eq!(reporter.counter("response.completed.aggregated_per_source.count"), 1);
    assert_eq!(reporter.counter("response.errors.count"), 0);
    assert_eq!(reporter.gauge_history(MAKE_INFLIGHT), vec![1.0, 0.0]);
    assert_eq!(reporter.gauge("total_requests.inflight"), Some(0.0));

    assert_eq!(
        reporter.counter_tags(MAKE_CUMULATIVE),
        vec![TagSet::new()
            .with("application", "beachshirts")
            .with("service", "styling")
            .with("cluster", "us-west")
            .with("shard", "primary")
            .with("axum.func", "make_shirts")]
    );

    let spans = app.tracer.finished();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.operation_name, "make_shirts");
    assert!(!span.error);
    assert_eq!(span.parent_id, None);
    assert_eq!(span.tags.get("component"), Some("axum"));
    assert_eq!(span.tags.get("span.kind"), Some("server"));
    assert_eq!(span.tags.get("http.method"), Some("GET"));
    assert_eq!(
        span.tags.get("http.url"),
        Some("http://localhost:8080/style/42/make")
    );
    assert_eq!(span.tags.get("http.status_code"), Some("200"));
    assert_eq!(span.tags.get("axum.func"), Some("make_shirts"));
    assert_eq!(span.tags.get("shard"), Some("primary"));
}

#[tokio::test]
async fn test_error_response() {
    let app = common::instrument(shirts());

    let response = app.send(common::get("/style/42/ship")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let reporter = &app.reporter;
    assert_eq!(
        reporter.counter("response.style.path:id.ship.GET.502.cumulative.count"),
        1
    );
    assert_eq!(reporter.counter("response.style.path:id.ship.GET.errors.count"), 1);
    assert_eq!(reporter.counter("response.errors.count"), 1);
    assert_eq!(
        reporter.counter("response.errors.aggregated_per_source.count"),
        1
    );

    let span = &app.tracer.finished()[0];
    assert!(span.error);
    assert_eq!(span.tags.get("error"), Some("true"));
    assert_eq!(span.tags.get("http.status_code"), Some("502"));
    // Handler names default to the route template.
    assert_eq!(span.operation_name, "/style/{id}/ship");
}

#[tokio::test]
async fn test_handler_panic() {
    let app = common::instrument(shirts());

    let router = app.router.clone();
    let result = tokio::spawn(async move {
        use tower::ServiceExt;
        router.oneshot(common::get("/style/42/explode")).await
    })
    .await;
    assert!(result.unwrap_err().is_panic());

    let reporter = &app.reporter;
    assert_eq!(
        reporter.counter("response.style.path:id.explode.GET.500.cumulative.count"),
        1
    );
    assert_eq!(reporter.counter("response.errors.count"), 1);
    assert_eq!(
        reporter.gauge("request.style.path:id.explode.GET.inflight"),
        Some(0.0)
    );
    assert!(app.telemetry.in_flight().is_quiescent());

    let spans = app.tracer.finished();
    assert_eq!(spans.len(), 1);
    assert!(spans[0].error);
    assert_eq!(spans[0].tags.get("error.kind"), Some("panic"));
    assert_eq!(
        spans[0].tags.get("error.message"),
        Some("no shirts left for style 42")
    );
}

#[tokio::test]
async fn test_concurrent_requests_return_to_zero() {
    let app = common::instrument(
        Router::new().route(
            "/style/{id}/make",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                "made"
            }),
        ),
    );

    let responses = join_all((0..50).map(|i| app.send(common::get(&format!("/style/{i}/make"))))).await;
    assert!(responses.iter().all(|r| r.status() == StatusCode::OK));

    let reporter = &app.reporter;
    assert_eq!(reporter.counter(MAKE_CUMULATIVE), 50);
    assert_eq!(app.tracer.finished().len(), 50);

    let history = reporter.gauge_history(MAKE_INFLIGHT);
    assert_eq!(history.len(), 100);
    assert!(history.iter().all(|v| *v >= 0.0));
    assert!(history.iter().cloned().fold(0.0, f64::max) >= 2.0);
    assert_eq!(reporter.gauge(MAKE_INFLIGHT), Some(0.0));
    assert!(app.telemetry.in_flight().is_quiescent());
}

#[tokio::test]
async fn test_in_flight_while_handler_runs() {
    let gate = Arc::new(Notify::new());
    let app = Arc::new(common::instrument(gated(gate.clone())));

    let task = {
        let app = app.clone();
        tokio::spawn(async move { app.send(common::get("/slow")).await.status() })
    };

    wait_for_in_flight(&app, 1).await;
    assert_eq!(app.reporter.gauge("request.slow.GET.inflight"), Some(1.0));
    assert_eq!(app.reporter.counter_names().len(), 0);

    gate.notify_one();
    assert_eq!(task.await.unwrap(), StatusCode::OK);
    assert_eq!(app.reporter.gauge("request.slow.GET.inflight"), Some(0.0));
    assert_eq!(app.reporter.counter("response.slow.GET.200.cumulative.count"), 1);
}

#[tokio::test]
async fn test_cancelled_request() {
    let gate = Arc::new(Notify::new());
    let app = Arc::new(common::instrument(gated(gate)));

    let task = {
        let app = app.clone();
        tokio::spawn(async move { app.send(common::get("/slow")).await })
    };

    wait_for_in_flight(&app, 1).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(app.telemetry.in_flight().is_quiescent());
    assert_eq!(app.reporter.counter("response.slow.GET.499.cumulative.count"), 1);
    let spans = app.tracer.finished();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].tags.get("error.kind"), Some("cancelled"));
}

#[tokio::test]
async fn test_traceparent_links_parent() {
    let app = common::instrument(shirts());
    let parent = SpanContext::new_root();

    let mut req = common::get("/trace");
    inject_headers(&parent, req.headers_mut());
    assert!(req.headers().contains_key(TRACEPARENT));

    let response = app.send(req).await;
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let span = &app.tracer.finished()[0];
    assert_eq!(span.trace_id, parent.trace_id);
    assert_eq!(span.parent_id, Some(parent.span_id));
    assert_ne!(span.span_id, parent.span_id);
    assert_eq!(body, parent.trace_id_hex().as_bytes());
}

#[tokio::test]
async fn test_handler_sees_its_span() {
    let app = common::instrument(shirts());

    let response = app.send(common::get("/trace")).await;
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let span = &app.tracer.finished()[0];
    assert_eq!(span.parent_id, None);
    assert_eq!(body, format!("{:032x}", span.trace_id).as_bytes());
}

#[tokio::test]
async fn test_unmatched_route_is_unknown() {
    let app = common::instrument(
        shirts().fallback(|| async { (StatusCode::NOT_FOUND, "no such style") }),
    );

    let response = app.send(common::get("/nowhere/at/all")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(app.reporter.counter("response.unknown.GET.404.cumulative.count"), 1);
    assert_eq!(app.reporter.counter("response.unknown.GET.errors.count"), 1);
    assert_eq!(app.tracer.finished()[0].operation_name, "unknown");
}

#[tokio::test]
async fn test_nested_router_is_counted_once() {
    let inner = common::instrument(shirts());
    let outer = common::instrument(Router::new().nest("/api", inner.router.clone()));

    let response = outer.send(common::get("/api/style/42/make")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cumulative: u64 = outer
        .reporter
        .counter_names()
        .iter()
        .filter(|name| name.ends_with(".cumulative.count"))
        .map(|name| outer.reporter.counter(name))
        .sum();
    assert_eq!(cumulative, 1);
    assert_eq!(outer.tracer.finished().len(), 1);

    assert!(inner.reporter.counter_names().is_empty());
    assert!(inner.tracer.finished().is_empty());
}

#[tokio::test]
async fn test_traced_attributes() {
    use request_telemetry::config::TracedAttribute;

    let mut config = common::test_config();
    config.telemetry.traced_attributes = vec![
        TracedAttribute::Path,
        TracedAttribute::Query,
        TracedAttribute::UserAgent,
    ];
    let app = common::instrument_with(shirts(), config);

    let req = Request::builder()
        .uri("/style/7/make?size=xl")
        .header("host", "localhost")
        .header("user-agent", "shirt-bot/1.0")
        .body(Body::empty())
        .unwrap();
    app.send(req).await;

    let tags = &app.tracer.finished()[0].tags;
    assert_eq!(tags.get("path"), Some("/style/7/make"));
    assert_eq!(tags.get("query_string"), Some("size=xl"));
    assert_eq!(tags.get("user_agent"), Some("shirt-bot/1.0"));
    assert!(!tags.contains_key("content_type"));
}

#[tokio::test]
async fn test_extension_methods_do_not_grow_metric_names() {
    let app = common::instrument(shirts());

    for i in 0..50 {
        let method = Method::from_bytes(format!("X{i}").as_bytes()).unwrap();
        app.send(common::request(method, "/style/42/make")).await;
    }

    let names = app.reporter.counter_names();
    let cumulative: Vec<_> = names
        .iter()
        .filter(|name| name.ends_with(".cumulative.count"))
        .collect();
    assert_eq!(cumulative.len(), 1);
    assert!(cumulative[0].contains(".OTHER."));
    assert_eq!(app.reporter.counter(cumulative[0]), 50);
    assert!(names.iter().all(|name| !name.contains(".X")));
    assert_eq!(app.telemetry.interceptor().resolver().len(), 1);
}
