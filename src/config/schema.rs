//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! telemetry middleware and the demo server. All types derive Serde traits
//! for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Tags identifying the application emitting telemetry.
    pub application: ApplicationTags,

    /// Middleware behaviour.
    pub telemetry: InstrumentationConfig,

    /// Demo server settings.
    pub server: ServerConfig,

    /// Logging and metrics export.
    pub observability: ObservabilityConfig,
}

/// Application-identifying tags.
///
/// `application` and `service` are required; `cluster` and `shard` are
/// emitted only when set.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ApplicationTags {
    pub application: String,
    pub service: String,
    pub cluster: Option<String>,
    pub shard: Option<String>,

    /// Extra key/value pairs attached to every span.
    pub custom: BTreeMap<String, String>,
}

impl ApplicationTags {
    pub fn new(application: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_shard(mut self, shard: impl Into<String>) -> Self {
        self.shard = Some(shard.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

/// Request attributes that can be copied onto server spans.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TracedAttribute {
    Path,
    Query,
    Host,
    Scheme,
    UserAgent,
    ContentType,
    RemoteAddr,
}

impl TracedAttribute {
    /// Span tag key used for this attribute.
    pub fn tag_key(&self) -> &'static str {
        match self {
            TracedAttribute::Path => "path",
            TracedAttribute::Query => "query_string",
            TracedAttribute::Host => "host",
            TracedAttribute::Scheme => "scheme",
            TracedAttribute::UserAgent => "user_agent",
            TracedAttribute::ContentType => "content_type",
            TracedAttribute::RemoteAddr => "remote_addr",
        }
    }
}

/// Explicit handler name for a route, since axum does not expose the
/// handler function name at runtime.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HandlerConfig {
    /// HTTP method, case-insensitive.
    pub method: String,

    /// Route template exactly as registered with the router.
    pub route: String,

    /// Name reported as the span operation and the `<component>.func` tag.
    pub name: String,
}

/// Middleware behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Component name, used for the `component` span tag and the
    /// `<component>.func` tag key.
    pub component: String,

    /// Reporting source (host name). Added as the `source` label by
    /// reporters that support it.
    pub source: Option<String>,

    /// Request attributes copied onto server spans.
    pub traced_attributes: Vec<TracedAttribute>,

    /// Heartbeat interval in seconds. Zero disables the heartbeat.
    pub heartbeat_interval_secs: u64,

    /// Handler names per route.
    pub handlers: Vec<HandlerConfig>,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            component: "axum".to_string(),
            source: None,
            traced_attributes: Vec::new(),
            heartbeat_interval_secs: 10,
            handlers: Vec::new(),
        }
    }
}

impl InstrumentationConfig {
    /// Register a handler name for `method route`.
    pub fn with_handler(
        mut self,
        method: impl Into<String>,
        route: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.handlers.push(HandlerConfig {
            method: method.into(),
            route: route.into(),
            name: name.into(),
        });
        self
    }
}

/// Demo server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Prefix prepended to every reported metric name.
    pub metrics_prefix: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            metrics_prefix: "axum.".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Configuration with the given application tags and defaults elsewhere.
    pub fn new(application: ApplicationTags) -> Self {
        Self {
            application,
            ..Self::default()
        }
    }
}
