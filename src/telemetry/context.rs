//! Attachment of telemetry to an axum router.
//!
//! # Responsibilities
//! - Validate the configuration once, before any request is served
//! - Own the interceptor, its caches and gauges, and the heartbeat task
//! - Install the request middleware on the router
//!
//! # Design Decisions
//! - Nothing is global: two routers attached with two configurations keep
//!   fully separate state
//! - `shutdown` is explicit and idempotent; dropping `Telemetry` also stops
//!   the heartbeat

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use tokio::task::JoinHandle;

use crate::config::validation::validate_instrumentation;
use crate::config::TelemetryConfig;
use crate::error::{ConfigError, TelemetryError};
use crate::http::middleware::{telemetry_middleware, TelemetryState};
use crate::lifecycle::Shutdown;
use crate::observability::metrics::Reporter;
use crate::observability::tracing::Tracer;
use crate::telemetry::heartbeat::Heartbeat;
use crate::telemetry::inflight::InFlightTracker;
use crate::telemetry::interceptor::{Interceptor, StartSpanHook};

/// Running telemetry for one application.
pub struct Telemetry {
    config: Arc<TelemetryConfig>,
    interceptor: Interceptor,
    reporter: Arc<dyn Reporter>,
    shutdown: Shutdown,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl Telemetry {
    /// Validate `config` and build the telemetry state. The heartbeat is
    /// started when called inside a tokio runtime.
    pub fn new(
        config: TelemetryConfig,
        tracer: Arc<dyn Tracer>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, TelemetryError> {
        let errors = validate_instrumentation(&config);
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors).into());
        }

        let interceptor = Interceptor::new(&config, reporter.clone(), tracer);
        let telemetry = Self {
            config: Arc::new(config),
            interceptor,
            reporter,
            shutdown: Shutdown::new(),
            heartbeat: Mutex::new(None),
        };
        telemetry.start_heartbeat();

        tracing::info!(
            application = %telemetry.config.application.application,
            service = %telemetry.config.application.service,
            component = %telemetry.config.telemetry.component,
            "Request telemetry attached"
        );
        Ok(telemetry)
    }

    fn start_heartbeat(&self) {
        let secs = self.config.telemetry.heartbeat_interval_secs;
        if secs == 0 {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("No tokio runtime, heartbeat disabled");
            return;
        }

        let heartbeat = Heartbeat::new(
            self.reporter.clone(),
            self.interceptor.tags().heartbeat(),
            Duration::from_secs(secs),
        );
        let handle = heartbeat.spawn(self.shutdown.listener());
        *self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Install a callback run on every server span after it starts. Only
    /// routers layered after this call see the hook.
    pub fn with_start_span_hook(mut self, hook: StartSpanHook) -> Self {
        self.interceptor = self.interceptor.clone().with_start_span_hook(hook);
        self
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn in_flight(&self) -> &Arc<InFlightTracker> {
        self.interceptor.tracker()
    }

    /// Add the telemetry middleware to `router`.
    pub fn layer<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let state = TelemetryState::new(
            self.interceptor.clone(),
            self.config.telemetry.traced_attributes.clone(),
        );
        router.layer(axum::middleware::from_fn_with_state(
            state,
            telemetry_middleware,
        ))
    }

    /// Stop background tasks. Requests already being served still complete
    /// their metrics and spans.
    pub fn shutdown(&self) {
        if self.shutdown.trigger() {
            tracing::info!("Request telemetry shutting down");
        }
        self.heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Validate `config`, then instrument every route of `router`.
pub fn attach<S>(
    router: Router<S>,
    tracer: Arc<dyn Tracer>,
    reporter: Arc<dyn Reporter>,
    config: TelemetryConfig,
) -> Result<(Router<S>, Telemetry), TelemetryError>
where
    S: Clone + Send + Sync + 'static,
{
    let telemetry = Telemetry::new(config, tracer, reporter)?;
    let router = telemetry.layer(router);
    Ok((router, telemetry))
}
