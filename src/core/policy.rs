// src/core/policy.rs

//! Route-level caching policies and their resolver.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Freshness window applied when no route rule matches.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Caching behavior for one route pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    /// Time an entry is considered fresh.
    #[serde(with = "humantime_serde", default = "default_ttl")]
    pub ttl: Duration,
    /// Serve an expired entry when the network fails.
    #[serde(default)]
    pub allow_stale: bool,
    /// Proactively revalidate near-expiry entries on a hit.
    #[serde(default)]
    pub background_refresh: bool,
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            allow_stale: false,
            background_refresh: false,
        }
    }
}

/// A single route→policy rule as authored in configuration.
///
/// Patterns are written against the normalized path, with numeric segments
/// collapsed, e.g. `/api/members/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    pub pattern: String,
    #[serde(flatten)]
    pub policy: RoutePolicy,
}

/// Resolves a normalized path to its policy.
///
/// Lookup is exact string equality against the authored table; when
/// duplicate patterns exist the first definition wins. Overlapping patterns
/// are an authoring error, not a runtime concern.
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    rules: Vec<RouteRule>,
}

impl PolicyResolver {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    pub fn resolve(&self, normalized_path: &str) -> RoutePolicy {
        self.rules
            .iter()
            .find(|rule| rule.pattern == normalized_path)
            .map(|rule| rule.policy)
            .unwrap_or_default()
    }
}
