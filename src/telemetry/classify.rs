//! Response classification.
//!
//! Pure functions, no state. A status code is an error iff it is `>= 400`;
//! codes outside the registered 100..=599 range land in `StatusClass::Unknown`
//! and are success-class unless they are `>= 400`.

use axum::http::Method;

/// Coarse status code bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
    Unknown,
}

/// Outcome of classifying a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: u16,
    pub class: StatusClass,
    pub error: bool,
}

/// Classify a response status code.
pub fn classify(status: u16) -> Classification {
    let class = match status {
        100..=199 => StatusClass::Informational,
        200..=299 => StatusClass::Success,
        300..=399 => StatusClass::Redirection,
        400..=499 => StatusClass::ClientError,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Unknown,
    };
    Classification {
        status,
        class,
        error: status >= 400,
    }
}

/// Metric-key method for anything outside the standard HTTP methods.
pub const OTHER_METHOD: &str = "OTHER";

const STANDARD_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
    Method::PATCH,
];

/// Upper-case an HTTP method for use in metric keys. Extension methods all
/// collapse to [`OTHER_METHOD`] so clients cannot mint new metric names.
pub fn normalize_method(method: &str) -> String {
    let method = method.trim().to_ascii_uppercase();
    if STANDARD_METHODS.iter().any(|m| m.as_str() == method) {
        method
    } else {
        OTHER_METHOD.to_string()
    }
}
