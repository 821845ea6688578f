//! Request telemetry for axum services.
//!
//! Derives metric and span identifiers from route metadata, keeps in-flight
//! gauges, records per-route counters and histograms, and records one server
//! span per request. Metrics go to a [`Reporter`], spans to a [`Tracer`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{routing::get, Router};
//! use request_telemetry::{attach, ApplicationTags, LogTracer, MetricsReporter, TelemetryConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let app = Router::new().route("/style/{id}/make", get(|| async { "ok" }));
//! let config = TelemetryConfig::new(ApplicationTags::new("beachshirts", "styling"));
//! let (app, telemetry) = attach(
//!     app,
//!     Arc::new(LogTracer::new()),
//!     Arc::new(MetricsReporter::new("axum.")),
//!     config,
//! )?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! telemetry.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod telemetry;

pub use config::{ApplicationTags, TelemetryConfig};
pub use error::TelemetryError;
pub use observability::{LogTracer, MemoryReporter, MemoryTracer, MetricsReporter, Reporter, Tracer};
pub use telemetry::{attach, Telemetry};
