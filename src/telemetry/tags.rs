//! Tag sets attached to metrics and spans.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::ApplicationTags;

pub const APPLICATION_TAG_KEY: &str = "application";
pub const SERVICE_TAG_KEY: &str = "service";
pub const CLUSTER_TAG_KEY: &str = "cluster";
pub const SHARD_TAG_KEY: &str = "shard";
pub const COMPONENT_TAG_KEY: &str = "component";
pub const SOURCE_TAG_KEY: &str = "source";

pub const SPAN_KIND_TAG: &str = "span.kind";
pub const HTTP_METHOD_TAG: &str = "http.method";
pub const HTTP_URL_TAG: &str = "http.url";
pub const STATUS_CODE_TAG: &str = "http.status_code";
pub const ERROR_TAG: &str = "error";
pub const ERROR_KIND_TAG: &str = "error.kind";
pub const ERROR_MESSAGE_TAG: &str = "error.message";

/// Keys that custom application tags may not override: the metric tags and
/// the standard server span tags.
pub const RESERVED_TAG_KEYS: &[&str] = &[
    APPLICATION_TAG_KEY,
    SERVICE_TAG_KEY,
    CLUSTER_TAG_KEY,
    SHARD_TAG_KEY,
    COMPONENT_TAG_KEY,
    SOURCE_TAG_KEY,
    SPAN_KIND_TAG,
    HTTP_METHOD_TAG,
    HTTP_URL_TAG,
    STATUS_CODE_TAG,
    ERROR_TAG,
    ERROR_KIND_TAG,
    ERROR_MESSAGE_TAG,
];

/// Ordered map of tag key to value. Keys are unique; inserting an existing
/// key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert only when `value` is present. Absent tags stay absent.
    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<&str>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every tag of `other` into `self`.
    pub fn extend(&mut self, other: &TagSet) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{k}=\"{v}\"")?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

/// Pre-computed tag sets derived from the application tags.
///
/// Built once at attachment; per-route sets only add the function tag.
#[derive(Debug, Clone)]
pub struct TagTemplates {
    func_key: String,
    component: String,
    /// application only.
    application: TagSet,
    /// application, cluster, service, shard.
    overall: TagSet,
    /// Everything that goes on spans: overall plus custom tags.
    span: TagSet,
}

impl TagTemplates {
    pub fn new(tags: &ApplicationTags, component: &str) -> Self {
        let application = TagSet::new().with(APPLICATION_TAG_KEY, tags.application.as_str());

        let mut overall = application.clone();
        overall.insert(SERVICE_TAG_KEY, tags.service.as_str());
        overall.insert_opt(CLUSTER_TAG_KEY, tags.cluster.as_deref());
        overall.insert_opt(SHARD_TAG_KEY, tags.shard.as_deref());

        let func_key = format!("{component}.func");
        let mut span = overall.clone();
        for (k, v) in &tags.custom {
            if RESERVED_TAG_KEYS.contains(&k.as_str()) || *k == func_key {
                tracing::warn!(key = %k, "Custom tag uses a reserved key, dropped");
                continue;
            }
            span.insert(k.as_str(), v.as_str());
        }

        Self {
            func_key,
            component: component.to_string(),
            application,
            overall,
            span,
        }
    }

    /// Key of the handler-name tag, e.g. `axum.func`.
    pub fn func_key(&self) -> &str {
        &self.func_key
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Tags of the per-route in-flight gauge: application and function.
    pub fn per_route(&self, handler_name: &str) -> TagSet {
        self.application.clone().with(self.func_key.as_str(), handler_name)
    }

    /// Tags for source-level totals: application, cluster, service, shard.
    pub fn overall(&self) -> TagSet {
        self.overall.clone()
    }

    /// Tags for per-route response metrics: overall plus function.
    pub fn complete(&self, handler_name: &str) -> TagSet {
        self.overall.clone().with(self.func_key.as_str(), handler_name)
    }

    /// Heartbeat tags: overall plus component.
    pub fn heartbeat(&self) -> TagSet {
        self.overall
            .clone()
            .with(COMPONENT_TAG_KEY, self.component.as_str())
    }

    /// Application and custom tags placed on every span.
    pub fn span(&self) -> &TagSet {
        &self.span
    }
}
