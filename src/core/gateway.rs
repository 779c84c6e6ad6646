// src/core/gateway.rs

//! The public entry point: orchestrates key building, policy resolution,
//! cache lookup, request coalescing, stale fallback and background refresh.
//!
//! Decision order per call is significant and preserved:
//! 1. in-flight check (cheapest, strongest dedup guarantee),
//! 2. fresh-cache check,
//! 3. network fetch,
//! 4. on transport failure, stale fallback if the policy allows it.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use regex::Regex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use url::Url;

use crate::config::GatewayConfig;
use crate::core::errors::GatewayError;
use crate::core::fetch::{FetchExecutor, FetchRequest, ResponsePayload};
use crate::core::inflight::{Flight, InFlightRegistry};
use crate::core::key::KeyBuilder;
use crate::core::metrics::{Metrics, MetricsSnapshot};
use crate::core::policy::PolicyResolver;
use crate::core::refresh::{
    REFRESH_AGE_THRESHOLD, REFRESH_QUEUE_DEPTH, RefreshJob, RefreshScheduler, RefreshWorker,
};
use crate::core::store::CacheStore;

/// Path segment that marks a request as an API call eligible for caching.
const API_MARKER: &str = "/api/";

/// Path fragments that are never cached regardless of policy: they carry
/// side effects or security-sensitive state.
const EXCLUDED_FRAGMENTS: &[&str] = &["/login", "/auth", "/verify"];

/// Options accompanying a call through the cache.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Defaults to GET when absent.
    pub method: Option<String>,
    /// Serialized into the request; a bounded prefix participates in the key.
    pub body: Option<serde_json::Value>,
    /// The `Authorization` value's prefix participates in the key so cached
    /// data for one identity is never served to another.
    pub headers: BTreeMap<String, String>,
}

impl RequestOptions {
    fn method(&self) -> String {
        self.method
            .as_deref()
            .unwrap_or("GET")
            .to_ascii_uppercase()
    }

    fn authorization(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
    }
}

/// The request gateway. Constructed once by the hosting application and
/// passed by reference to anything that issues cached requests; all shared
/// state is explicit, nothing is global.
pub struct RequestGateway {
    store: Arc<CacheStore>,
    inflight: Arc<InFlightRegistry>,
    scheduler: RefreshScheduler,
    executor: Arc<dyn FetchExecutor>,
    resolver: PolicyResolver,
    keys: KeyBuilder,
    metrics: Arc<Metrics>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RequestGateway {
    /// Wires the store, registry, scheduler and refresh worker together and
    /// spawns the worker. Must be called from within a Tokio runtime.
    pub fn new(
        config: GatewayConfig,
        executor: Arc<dyn FetchExecutor>,
    ) -> Result<Self, GatewayError> {
        let base = Url::parse(&config.base_origin).map_err(|e| {
            GatewayError::InvalidRequest(format!(
                "invalid base origin '{}': {e}",
                config.base_origin
            ))
        })?;

        let store = Arc::new(CacheStore::new(config.max_entries));
        let metrics = Arc::new(Metrics::new());
        let pending = Arc::new(DashMap::new());
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let worker = RefreshWorker {
            store: store.clone(),
            executor: executor.clone(),
            metrics: metrics.clone(),
            rx: refresh_rx,
            pending: pending.clone(),
        };
        tokio::spawn(worker.run(shutdown_rx));

        Ok(Self {
            store,
            inflight: Arc::new(InFlightRegistry::new()),
            scheduler: RefreshScheduler::new(refresh_tx, pending),
            executor,
            resolver: PolicyResolver::new(config.routes),
            keys: KeyBuilder::new(base),
            metrics,
            shutdown_tx,
        })
    }

    /// The single collaborator-facing operation: issue a request through the
    /// cache, coalescing it with any identical in-flight request.
    pub async fn fetch_through_cache(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ResponsePayload, GatewayError> {
        let method = options.method();
        if !is_cacheable(&method, url) {
            return self.execute_uncached(&method, url, &options).await;
        }

        let body_string = options.body.as_ref().map(|b| b.to_string());
        let key = self
            .keys
            .build(&method, url, body_string.as_deref(), options.authorization());
        let policy = self
            .keys
            .normalized_path(url)
            .map(|path| self.resolver.resolve(&path))
            .unwrap_or_default();

        // 1. In-flight check.
        if let Some(shared) = self.inflight.get(&key) {
            self.metrics.record_deduplicated();
            return shared.await;
        }

        // 2. Fresh-cache check.
        if let Some(entry) = self.store.get(&key)
            && entry.is_fresh()
        {
            self.metrics.record_hit();
            if policy.background_refresh && entry.near_expiry(REFRESH_AGE_THRESHOLD) {
                self.scheduler.try_schedule(RefreshJob {
                    key: key.clone(),
                    request: self.build_request(&method, url, &options),
                    policy,
                });
            }
            return Ok(entry.payload);
        }

        // 3. Network fetch, shared with any identical caller that arrives
        // while it is in transit.
        let request = self.build_request(&method, url, &options);
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let executor = self.executor.clone();
        let flight_key = key.clone();
        let flight = self.inflight.begin(&key, move || {
            async move {
                metrics.record_miss();
                match executor.execute(&request).await {
                    Ok(payload) => {
                        // Only success responses are cached.
                        if payload.is_success()
                            && store.put(flight_key, payload.clone(), policy).is_some()
                        {
                            metrics.record_eviction();
                        }
                        Ok(payload)
                    }
                    // 4. Stale fallback, for transport failures only. Other
                    // failure classes propagate even when the policy allows
                    // stale serving.
                    Err(e)
                        if policy.allow_stale
                            && matches!(
                                e,
                                GatewayError::Timeout(_) | GatewayError::Network(_)
                            ) =>
                    match store.get(&flight_key) {
                        Some(entry) => {
                            warn!(key = %flight_key, "serving stale entry after fetch failure: {e}");
                            metrics.record_stale_hit();
                            Ok(entry.payload)
                        }
                        None => Err(e),
                    },
                    Err(e) => Err(e),
                }
            }
            .boxed()
        });

        match flight {
            Flight::Leader(shared) => shared.await,
            Flight::Follower(shared) => {
                self.metrics.record_deduplicated();
                shared.await
            }
        }
    }

    /// Non-cacheable calls go straight to the executor. A successful
    /// mutating API call invalidates cached reads for the same resource.
    async fn execute_uncached(
        &self,
        method: &str,
        url: &str,
        options: &RequestOptions,
    ) -> Result<ResponsePayload, GatewayError> {
        let request = self.build_request(method, url, options);
        let payload = self.executor.execute(&request).await?;

        if method != "GET" && payload.is_success() {
            self.invalidate_related(url);
        }
        Ok(payload)
    }

    fn invalidate_related(&self, url: &str) {
        let Some(path) = self.keys.path(url) else {
            return;
        };
        let resource = parent_resource(&path);
        if !resource.contains(API_MARKER) {
            return;
        }
        // Anchored at a component or segment boundary so `/api/members` does
        // not sweep up `/api/membership`.
        match Regex::new(&format!(r"\|{}(\||/)", regex::escape(resource))) {
            Ok(pattern) => {
                let removed = self.store.invalidate(&pattern);
                if removed > 0 {
                    debug!(resource, removed, "invalidated cached reads after mutation");
                }
            }
            Err(e) => warn!("could not build invalidation pattern for '{resource}': {e}"),
        }
    }

    fn build_request(&self, method: &str, url: &str, options: &RequestOptions) -> FetchRequest {
        let absolute = self
            .keys
            .resolve(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());
        FetchRequest {
            method: method.to_string(),
            url: absolute,
            headers: options.headers.clone(),
            body: options.body.clone(),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn inflight(&self) -> &Arc<InFlightRegistry> {
        &self.inflight
    }

    /// The scheduler handle, exposing pending-set membership for operators
    /// and tests.
    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Clears every shared structure and stops the refresh worker. Intended
    /// for test isolation; normal operation never tears the gateway down.
    pub fn destroy(&self) {
        self.store.clear();
        self.inflight.clear();
        self.scheduler.clear();
        self.metrics.reset();
        let _ = self.shutdown_tx.send(());
    }
}

/// Only idempotent reads of recognized API routes are eligible for caching;
/// everything else bypasses the cache machinery entirely. The check is
/// string-level on purpose: exclusion must hold even for URLs the parser
/// would reject.
fn is_cacheable(method: &str, url: &str) -> bool {
    method == "GET"
        && url.contains(API_MARKER)
        && !EXCLUDED_FRAGMENTS.iter().any(|frag| url.contains(frag))
}

/// Drops a trailing all-digit segment so a mutation of `/api/members/42`
/// also invalidates the `/api/members` collection.
fn parent_resource(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some((parent, last))
            if !last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()) =>
        {
            parent
        }
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cacheable_requires_get_and_api_marker() {
        assert!(is_cacheable("GET", "/api/members"));
        assert!(!is_cacheable("POST", "/api/members"));
        assert!(!is_cacheable("GET", "/static/logo.png"));
    }

    #[test]
    fn test_excluded_fragments_never_cacheable() {
        assert!(!is_cacheable("GET", "/api/auth/session"));
        assert!(!is_cacheable("GET", "/api/login"));
        assert!(!is_cacheable("GET", "/api/2fa/verify"));
    }

    #[test]
    fn test_parent_resource_strips_numeric_leaf() {
        assert_eq!(parent_resource("/api/members/42"), "/api/members");
        assert_eq!(parent_resource("/api/members"), "/api/members");
        assert_eq!(parent_resource("/api/plans/7/"), "/api/plans");
    }
}
