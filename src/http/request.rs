//! Request inspection.
//!
//! # Responsibilities
//! - Read method, matched route template and full URL from an axum request
//! - Extract the inbound trace parent
//! - Collect the configured traced attributes
//!
//! # Design Decisions
//! - Only non-empty attribute values become tags
//! - The URL is rebuilt from scheme, `Host` and path so the `http.url` tag
//!   is absolute even though servers usually see origin-form URIs

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, MatchedPath},
    http::{header, Request},
};
use url::Url;

use crate::config::TracedAttribute;
use crate::observability::propagation;
use crate::telemetry::interceptor::RequestInfo;
use crate::telemetry::tags::TagSet;

/// Build the interceptor's view of `req`.
pub fn request_info<B>(req: &Request<B>, traced: &[TracedAttribute]) -> RequestInfo {
    let mut attributes = TagSet::new();
    for attribute in traced {
        if let Some(value) = attribute_value(req, *attribute) {
            if !value.is_empty() {
                attributes.insert(attribute.tag_key(), value);
            }
        }
    }

    RequestInfo {
        method: req.method().as_str().to_string(),
        route_template: req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string()),
        url: full_url(req),
        parent: propagation::extract(req.headers()),
        attributes,
    }
}

/// Absolute URL of the request.
pub fn full_url<B>(req: &Request<B>) -> String {
    let uri = req.uri();
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let base = format!("{}://{}", scheme(req), host(req).unwrap_or("localhost"));

    match Url::parse(&base).and_then(|base| base.join(path_and_query)) {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::debug!(uri = %uri, error = %e, "Could not build absolute URL");
            uri.to_string()
        }
    }
}

fn scheme<B>(req: &Request<B>) -> &str {
    req.uri().scheme_str().unwrap_or("http")
}

fn host<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
}

fn header_value<B>(req: &Request<B>, name: header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn attribute_value<B>(req: &Request<B>, attribute: TracedAttribute) -> Option<String> {
    match attribute {
        TracedAttribute::Path => Some(req.uri().path().to_string()),
        TracedAttribute::Query => req.uri().query().map(str::to_string),
        TracedAttribute::Host => host(req).map(str::to_string),
        TracedAttribute::Scheme => Some(scheme(req).to_string()),
        TracedAttribute::UserAgent => header_value(req, header::USER_AGENT),
        TracedAttribute::ContentType => header_value(req, header::CONTENT_TYPE),
        TracedAttribute::RemoteAddr => req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
    }
}
