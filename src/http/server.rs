//! Demo HTTP server.
//!
//! # Responsibilities
//! - Create the sample "beachshirts" router
//! - Wrap the routes in the tower-http timeout layer, attach request
//!   telemetry around it, then add the trace layer outermost
//! - Serve until Ctrl+C / SIGTERM, then stop the telemetry background tasks

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::lifecycle::shutdown_signal;
use crate::observability::metrics::Reporter;
use crate::observability::tracing::{SpanContext, Tracer};
use crate::telemetry::{attach, Telemetry};

/// HTTP server for the instrumented sample application.
pub struct HttpServer {
    router: Router,
    telemetry: Telemetry,
    config: TelemetryConfig,
}

impl HttpServer {
    /// Build the sample router and attach telemetry to it.
    pub fn new(
        config: TelemetryConfig,
        tracer: Arc<dyn Tracer>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, TelemetryError> {
        let (router, telemetry) =
            instrumented_router(sample_routes(), &config, tracer, reporter)?;
        Ok(Self {
            router,
            telemetry,
            config,
        })
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.telemetry.shutdown();
        tracing::info!(
            in_flight = self.telemetry.in_flight().total(),
            "HTTP server stopped"
        );
        Ok(())
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

/// Apply the server layers to `routes`. The timeout sits inside the
/// telemetry middleware so timed-out requests are recorded with their 408.
#[allow(deprecated)]
pub fn instrumented_router(
    routes: Router,
    config: &TelemetryConfig,
    tracer: Arc<dyn Tracer>,
    reporter: Arc<dyn Reporter>,
) -> Result<(Router, Telemetry), TelemetryError> {
    let routes = routes.layer(TimeoutLayer::new(Duration::from_secs(
        config.server.request_timeout_secs,
    )));
    let (router, telemetry) = attach(routes, tracer, reporter, config.clone())?;
    Ok((router.layer(TraceLayer::new_for_http()), telemetry))
}

/// Routes of the sample application, without telemetry.
pub fn sample_routes() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/style/{id}/make", get(make_shirts))
        .route("/style/{id}/ship", post(ship_shirts))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShirtOrder {
    pub style: String,
    pub quantity: u32,
    pub trace_id: Option<String>,
}

async fn index() -> &'static str {
    "beachshirts"
}

async fn make_shirts(
    Path(id): Path<String>,
    span: Option<Extension<SpanContext>>,
) -> Json<ShirtOrder> {
    tracing::debug!(style = %id, "Making shirts");
    Json(ShirtOrder {
        style: id,
        quantity: 1,
        trace_id: span.map(|Extension(ctx)| ctx.trace_id_hex()),
    })
}

async fn ship_shirts(Path(id): Path<String>) -> impl IntoResponse {
    tracing::warn!(style = %id, "Delivery service unavailable");
    (StatusCode::BAD_GATEWAY, "delivery service unavailable")
}
