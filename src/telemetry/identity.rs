//! Route identities and metric key construction.
//!
//! # Responsibilities
//! - Turn a route template into hierarchical metric key segments
//! - Resolve (method, template) pairs into cached `RouteIdentity` values
//! - Fall back to the `unknown` identifier for malformed or unmatched routes
//!
//! # Key Grammar
//! ```text
//! /style/{id}/make     → style.path:id.make
//! /style/<int:id>/make → style.path:id.make
//! /files/{*rest}       → files.path:rest
//! /robots.txt          → robots%2Etxt
//! ```
//!
//! Segments never contain the `.` delimiter. Literal `%`, `.` and `:` are
//! percent-encoded, so distinct templates never share a key and a literal
//! segment can never pass for a `path:` placeholder.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::HandlerConfig;
use crate::error::TemplateError;
use crate::telemetry::classify::normalize_method;

/// Catch-all identifier for unmatched or malformed routes.
pub const UNKNOWN_ROUTE: &str = "unknown";

/// Segment used for the root route `/`.
pub const ROOT_SEGMENT: &str = "root";

/// Prefix of rendered path parameters.
pub const PATH_PARAM_PREFIX: &str = "path:";

/// Separator between metric key segments.
pub const DELIMITER: char = '.';


/// The resolved identity of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteIdentity {
    method: String,
    path_template: String,
    handler_name: String,
}

impl RouteIdentity {
    pub fn new(
        method: impl AsRef<str>,
        path_template: impl Into<String>,
        handler_name: impl Into<String>,
    ) -> Self {
        Self {
            method: normalize_method(method.as_ref()),
            path_template: path_template.into(),
            handler_name: handler_name.into(),
        }
    }

    /// Upper-case HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }
}

/// Ordered metric name segments, joined with `.` when rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    segments: Vec<String>,
}

impl MetricKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key segments for a route template.
    pub fn from_template(template: &str) -> Result<Self, TemplateError> {
        let mut segments = parse_template(template)?;
        if segments.is_empty() {
            segments.push(ROOT_SEGMENT.to_string());
        }
        Ok(Self { segments })
    }

    /// The catch-all key.
    pub fn unknown() -> Self {
        Self {
            segments: vec![UNKNOWN_ROUTE.to_string()],
        }
    }

    /// Append one segment, escaping the delimiter.
    pub fn push(&mut self, segment: impl AsRef<str>) {
        self.segments.push(escape_segment(segment.as_ref()));
    }

    /// A copy of this key with `segment` appended.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut key = self.clone();
        key.push(segment);
        key
    }

    /// A copy of `prefix` followed by this key's segments.
    pub fn prefixed(&self, prefix: impl AsRef<str>) -> Self {
        let mut key = Self::new();
        key.push(prefix);
        key.segments.extend(self.segments.iter().cloned());
        key
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{DELIMITER}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl<S: AsRef<str>> FromIterator<S> for MetricKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut key = MetricKey::new();
        for segment in iter {
            key.push(segment);
        }
        key
    }
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '%' => out.push_str("%25"),
        DELIMITER => out.push_str("%2E"),
        ':' => out.push_str("%3A"),
        c => out.push(c),
    }
}

fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        push_escaped(&mut escaped, c);
    }
    escaped
}

/// Tokenize a template on `/`, rendering placeholders as `path:<name>`.
fn parse_template(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = template.char_indices();

    while let Some((position, c)) = chars.next() {
        match c {
            '/' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '<' | '{' => {
                let close = if c == '<' { '>' } else { '}' };
                let mut raw = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == close {
                        closed = true;
                        break;
                    }
                    if matches!(inner, '/' | '<' | '{') {
                        break;
                    }
                    raw.push(inner);
                }
                if !closed {
                    return Err(TemplateError::Unterminated {
                        template: template.to_string(),
                        position,
                    });
                }
                let name = placeholder_name(&raw);
                if name.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder {
                        template: template.to_string(),
                        position,
                    });
                }
                current.push_str(PATH_PARAM_PREFIX);
                current.push_str(&escape_segment(name));
            }
            '>' | '}' => {
                return Err(TemplateError::UnexpectedClose {
                    template: template.to_string(),
                    position,
                    found: c,
                });
            }
            c => push_escaped(&mut current, c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    Ok(segments)
}

/// Strip converters (`int:id`) and wildcard markers (`*rest`).
fn placeholder_name(raw: &str) -> &str {
    let name = raw.rsplit(':').next().unwrap_or(raw).trim();
    name.trim_start_matches('*')
}

/// A route resolved once and shared by every request that hits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub identity: RouteIdentity,
    /// Entity segments, without method or status.
    pub key: MetricKey,
}

impl ResolvedRoute {
    /// `request.<route>.<METHOD>`
    pub fn request_key(&self) -> MetricKey {
        self.key.prefixed("request").child(self.identity.method())
    }

    /// `response.<route>.<METHOD>.<status>`
    pub fn response_key(&self, status: u16) -> MetricKey {
        self.key
            .prefixed("response")
            .child(self.identity.method())
            .child(status.to_string())
    }

    /// `response.<route>.summary.<METHOD>.<status>`
    pub fn summary_key(&self, status: u16) -> MetricKey {
        self.key
            .prefixed("response")
            .child("summary")
            .child(self.identity.method())
            .child(status.to_string())
    }

    /// `response.<route>.<METHOD>`
    pub fn response_method_key(&self) -> MetricKey {
        self.key.prefixed("response").child(self.identity.method())
    }
}

/// Resolves and caches route identities.
///
/// Reads after warm-up hit the cache without allocating: entries are keyed
/// by template, then scanned by method.
#[derive(Debug, Default)]
pub struct RouteResolver {
    handlers: HashMap<(String, String), String>,
    cache: DashMap<String, Vec<Arc<ResolvedRoute>>>,
}

impl RouteResolver {
    pub fn new(handlers: &[HandlerConfig]) -> Self {
        let handlers = handlers
            .iter()
            .map(|h| {
                (
                    (normalize_method(&h.method), h.route.clone()),
                    h.name.clone(),
                )
            })
            .collect();
        Self {
            handlers,
            cache: DashMap::new(),
        }
    }

    /// Resolve a request's route. `template` is `None` when the framework
    /// matched no route.
    pub fn resolve(&self, method: &str, template: Option<&str>) -> Arc<ResolvedRoute> {
        let method = normalize_method(method);
        let cache_key = template.unwrap_or("");
        if let Some(routes) = self.cache.get(cache_key) {
            if let Some(route) = routes.iter().find(|r| r.identity.method() == method) {
                return route.clone();
            }
        }

        let resolved = Arc::new(self.build(&method, template));
        let mut routes = self.cache.entry(cache_key.to_string()).or_default();
        // Another request may have resolved it first.
        if let Some(existing) = routes
            .iter()
            .find(|r| r.identity.method() == resolved.identity.method())
            .cloned()
        {
            return existing;
        }
        routes.push(resolved.clone());
        resolved
    }

    /// `method` is already normalized.
    fn build(&self, method: &str, template: Option<&str>) -> ResolvedRoute {
        let Some(template) = template else {
            return ResolvedRoute {
                identity: RouteIdentity::new(method, UNKNOWN_ROUTE, UNKNOWN_ROUTE),
                key: MetricKey::unknown(),
            };
        };

        let handler_name = self
            .handlers
            .get(&(method.to_string(), template.to_string()))
            .cloned()
            .unwrap_or_else(|| template.to_string());

        let key = match MetricKey::from_template(template) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(
                    template = %template,
                    error = %e,
                    "Malformed route template, using catch-all identifier"
                );
                MetricKey::unknown()
            }
        };

        tracing::debug!(method = %method, template = %template, key = %key, "Route resolved");

        ResolvedRoute {
            identity: RouteIdentity::new(method, template, handler_name),
            key,
        }
    }

    /// Number of cached (method, template) pairs.
    pub fn len(&self) -> usize {
        self.cache.iter().map(|r| r.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::classify::OTHER_METHOD;

    fn key(template: &str) -> String {
        MetricKey::from_template(template).unwrap().to_string()
    }

    #[test]
    fn test_placeholder_syntaxes() {
        assert_eq!(key("/style/<id>/make"), "style.path:id.make");
        assert_eq!(key("/style/{id}/make"), "style.path:id.make");
        assert_eq!(key("/style/<int:id>/make"), "style.path:id.make");
        assert_eq!(key("/files/{*rest}"), "files.path:rest");
    }

    #[test]
    fn test_static_segments() {
        assert_eq!(key("/api/v1/health/"), "api.v1.health");
        assert_eq!(key("//double//slash"), "double.slash");
        assert_eq!(key("/robots.txt"), "robots%2Etxt");
        assert_eq!(key("/"), ROOT_SEGMENT);
    }

    #[test]
    fn test_mixed_segment() {
        assert_eq!(key("/report-{year}-{month}"), "report-path:year-path:month");
    }

    #[test]
    fn test_segments_never_contain_delimiter() {
        let k = MetricKey::from_template("/a.b/{c.d}/e").unwrap();
        assert_eq!(k.segments(), &["a%2Eb", "path:c%2Ed", "e"]);
        assert!(k.segments().iter().all(|s| !s.contains(DELIMITER)));
    }

    #[test]
    fn test_deterministic() {
        let a = MetricKey::from_template("/style/<id>/make").unwrap();
        let b = MetricKey::from_template("/style/<id>/make").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_placeholder_names_distinct_keys() {
        assert_ne!(key("/users/{id}"), key("/users/{name}"));
        assert_ne!(key("/a/{x}/{y}"), key("/a/{y}/{x}"));
    }

    #[test]
    fn test_escaping_keeps_templates_apart() {
        assert_ne!(key("/v1.2"), key("/v1_2"));
        assert_ne!(key("/v1.2"), key("/v1%2E2"));
        assert_eq!(key("/v1%2E2"), "v1%252E2");
        assert_ne!(key("/a/path:x"), key("/a/{x}"));
        assert_eq!(key("/a/path:x"), "a.path%3Ax");
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(
            MetricKey::from_template("/style/<id/make"),
            Err(TemplateError::Unterminated { position: 7, .. })
        ));
        assert!(matches!(
            MetricKey::from_template("/style/{id"),
            Err(TemplateError::Unterminated { .. })
        ));
        assert!(matches!(
            MetricKey::from_template("/style/id}"),
            Err(TemplateError::UnexpectedClose { found: '}', .. })
        ));
        assert!(matches!(
            MetricKey::from_template("/style/<int:>"),
            Err(TemplateError::EmptyPlaceholder { .. })
        ));
    }

    #[test]
    fn test_route_keys() {
        let route = ResolvedRoute {
            identity: RouteIdentity::new("get", "/style/<id>/make", "make_shirts"),
            key: MetricKey::from_template("/style/<id>/make").unwrap(),
        };
        assert_eq!(route.request_key().to_string(), "request.style.path:id.make.GET");
        assert_eq!(
            route.response_key(200).child("cumulative").child("count").to_string(),
            "response.style.path:id.make.GET.200.cumulative.count"
        );
        assert_eq!(
            route.summary_key(502).child("latency").to_string(),
            "response.style.path:id.make.summary.GET.502.latency"
        );
    }

    #[test]
    fn test_resolver_caches_and_names_handlers() {
        let handlers = vec![HandlerConfig {
            method: "get".into(),
            route: "/style/{id}/make".into(),
            name: "make_shirts".into(),
        }];
        let resolver = RouteResolver::new(&handlers);

        let a = resolver.resolve("GET", Some("/style/{id}/make"));
        let b = resolver.resolve("get", Some("/style/{id}/make"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.identity.handler_name(), "make_shirts");

        let post = resolver.resolve("POST", Some("/style/{id}/make"));
        assert_eq!(post.identity.handler_name(), "/style/{id}/make");
        assert_eq!(resolver.len(), 2);
    }

    #[test]
    fn test_extension_methods_share_one_route() {
        let resolver = RouteResolver::default();

        for i in 0..500 {
            let route = resolver.resolve(&format!("X{i}"), Some("/style/{id}/make"));
            assert_eq!(route.identity.method(), OTHER_METHOD);
        }
        assert_eq!(resolver.len(), 1);
        assert_eq!(
            resolver
                .resolve("BREW", Some("/style/{id}/make"))
                .request_key()
                .to_string(),
            "request.style.path:id.make.OTHER"
        );
    }

    #[test]
    fn test_resolver_fallbacks() {
        let resolver = RouteResolver::default();

        let unmatched = resolver.resolve("GET", None);
        assert_eq!(unmatched.key, MetricKey::unknown());
        assert_eq!(unmatched.identity.handler_name(), UNKNOWN_ROUTE);

        let malformed = resolver.resolve("GET", Some("/broken/<id"));
        assert_eq!(malformed.key, MetricKey::unknown());
        assert_eq!(malformed.identity.path_template(), "/broken/<id");
    }
}
