//! Error types shared across the crate.
//!
//! Nothing here is fatal to the host application: template errors fall back
//! to the catch-all identifier, sink errors are logged and dropped, and
//! configuration errors surface once, at attachment time.

use thiserror::Error;

use crate::config::validation::ValidationError;

/// A route template that cannot be turned into a metric key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `<` or `{` was opened but never closed.
    #[error("unterminated placeholder starting at byte {position} in route template `{template}`")]
    Unterminated { template: String, position: usize },

    /// A `>` or `}` appeared without a matching opening bracket.
    #[error("unexpected `{found}` at byte {position} in route template `{template}`")]
    UnexpectedClose {
        template: String,
        position: usize,
        found: char,
    },

    /// `<>`, `{}` or `<int:>` style placeholder with no parameter name.
    #[error("empty placeholder at byte {position} in route template `{template}`")]
    EmptyPlaceholder { template: String, position: usize },
}

/// Failure to hand a sample or span to a reporter or tracer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink refused the submission (full buffer, invalid name, ...).
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// The sink has been shut down.
    #[error("sink closed")]
    Closed,

    /// The tracer does not know the span handle.
    #[error("unknown span handle {0}")]
    UnknownSpan(u64),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while attaching telemetry to an application.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to install metrics exporter: {0}")]
    Exporter(String),
}
