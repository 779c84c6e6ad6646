// src/core/key.rs

//! Derives a stable identity string for an outbound request.
//!
//! The key joins the HTTP method, the literal request path, the query string,
//! a bounded prefix of the serialized body, and a bounded prefix of the
//! bearer credential. The delimiter is escaped inside each component before
//! joining, so component boundaries are unambiguous and two requests collide
//! iff all components match exactly.
//! Numeric path segments are kept literal in the key (so `/members/42` and
//! `/members/43` never share an entry) and are only collapsed to a
//! placeholder for policy lookup.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;
use url::Url;

/// Longest serialized-body prefix that participates in a key.
pub const BODY_PREFIX_LEN: usize = 64;
/// Longest bearer-credential prefix that participates in a key.
pub const AUTH_PREFIX_LEN: usize = 16;
/// Placeholder substituted for numeric path segments during normalization.
pub const ID_PLACEHOLDER: &str = ":id";

/// A deterministic request identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key from a precomputed string. Intended for tests and for
    /// code that re-derives keys through [`KeyBuilder::build`].
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builds cache keys relative to a base origin so relative URLs resolve.
#[derive(Debug)]
pub struct KeyBuilder {
    base: Url,
    fallback_seq: AtomicU64,
}

impl KeyBuilder {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            fallback_seq: AtomicU64::new(0),
        }
    }

    /// Resolves a possibly-relative URL against the base origin.
    pub fn resolve(&self, url: &str) -> Result<Url, url::ParseError> {
        Url::parse(url).or_else(|_| self.base.join(url))
    }

    /// The literal request path, without normalization.
    pub fn path(&self, url: &str) -> Option<String> {
        self.resolve(url).ok().map(|u| u.path().to_string())
    }

    /// The request path with numeric segments collapsed to [`ID_PLACEHOLDER`].
    /// Used only for policy lookup, never for the key itself.
    pub fn normalized_path(&self, url: &str) -> Option<String> {
        self.path(url).map(|p| normalize_path(&p))
    }

    /// Derives the cache key for a request. Deterministic: identical inputs
    /// always yield the identical key. Never fails: when the URL cannot be
    /// parsed even relative to the base origin, a best-effort key is produced
    /// instead, unique per computation so that two failed computations never
    /// collide (and therefore never share a cache entry by accident).
    pub fn build(
        &self,
        method: &str,
        url: &str,
        body: Option<&str>,
        auth: Option<&str>,
    ) -> CacheKey {
        let Ok(resolved) = self.resolve(url) else {
            return self.fallback_key(method, url);
        };
        let key = format!(
            "{}|{}|{}|{}|{}",
            method.to_ascii_uppercase(),
            escape(resolved.path()),
            escape(resolved.query().unwrap_or("")),
            escape(&prefix(body.unwrap_or(""), BODY_PREFIX_LEN)),
            escape(&prefix(auth.unwrap_or(""), AUTH_PREFIX_LEN)),
        );
        CacheKey(key)
    }

    // Key computation degrades rather than fails: the call still completes,
    // it just loses its collision guarantee for this one computation.
    fn fallback_key(&self, method: &str, raw_url: &str) -> CacheKey {
        warn!(url = raw_url, "unparseable URL, using best-effort cache key");
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = self.fallback_seq.fetch_add(1, Ordering::Relaxed);
        CacheKey(format!(
            "{}|{}|fallback:{}:{}",
            method.to_ascii_uppercase(),
            raw_url,
            nanos,
            seq
        ))
    }
}

/// Replaces every all-digit path segment with [`ID_PLACEHOLDER`].
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ID_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn prefix(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// A literal `|` inside a component (legal in JSON bodies and Authorization
// values) must not read as a component boundary.
fn escape(component: &str) -> String {
    component.replace('\\', "\\\\").replace('|', "\\|")
}
