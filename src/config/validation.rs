//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics and returns every
//! problem found rather than stopping at the first one.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::TelemetryConfig;
use crate::telemetry::tags::RESERVED_TAG_KEYS;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("custom tag key must not be empty")]
    EmptyTagKey,

    #[error("custom tag `{0}` shadows a reserved tag key")]
    ReservedTagKey(String),

    #[error("component name `{0}` must be non-empty and must not contain `.`")]
    InvalidComponent(String),

    #[error("invalid HTTP method `{0}` for handler `{1}`")]
    InvalidMethod(String, String),

    #[error("duplicate handler name for `{0} {1}`")]
    DuplicateHandler(String, String),

    #[error("invalid address `{0}` for `{1}`")]
    InvalidAddress(String, &'static str),
}

/// Validate a configuration.
pub fn validate_config(config: &TelemetryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = validate_instrumentation(config);

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress(
            config.server.bind_address.clone(),
            "server.bind_address",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress(
            config.observability.metrics_address.clone(),
            "observability.metrics_address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The subset of checks that apply when attaching to an application,
/// independent of the demo server settings.
pub fn validate_instrumentation(config: &TelemetryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let tags = &config.application;

    if tags.application.trim().is_empty() {
        errors.push(ValidationError::MissingField("application.application"));
    }
    if tags.service.trim().is_empty() {
        errors.push(ValidationError::MissingField("application.service"));
    }

    let component = &config.telemetry.component;
    if component.is_empty() || component.contains('.') {
        errors.push(ValidationError::InvalidComponent(component.clone()));
    }

    let func_key = format!("{component}.func");
    for key in tags.custom.keys() {
        if key.trim().is_empty() {
            errors.push(ValidationError::EmptyTagKey);
        } else if RESERVED_TAG_KEYS.contains(&key.as_str()) || *key == func_key {
            errors.push(ValidationError::ReservedTagKey(key.clone()));
        }
    }

    let mut seen = HashSet::new();
    for handler in &config.telemetry.handlers {
        let method = handler.method.to_ascii_uppercase();
        if axum::http::Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod(
                handler.method.clone(),
                handler.name.clone(),
            ));
        }
        if handler.name.trim().is_empty() {
            errors.push(ValidationError::MissingField("telemetry.handlers.name"));
        }
        if !seen.insert((method.clone(), handler.route.clone())) {
            errors.push(ValidationError::DuplicateHandler(method, handler.route.clone()));
        }
    }

    errors
}
