//! HTTP binding of the request telemetry.
//!
//! # Data Flow
//! ```text
//! axum Router
//!     → middleware.rs (telemetry_middleware: skip if already instrumented)
//!     → request.rs (method, MatchedPath, URL, traceparent, traced attributes)
//!     → telemetry::Interceptor hooks around the handler
//!
//! server.rs: sample application served by the demo binary
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use middleware::{telemetry_middleware, Instrumented, TelemetryState};
pub use request::request_info;
pub use server::HttpServer;
