// src/core/refresh.rs

//! Background refresh: a job queue plus a worker that silently revalidates
//! near-expiry cache entries.
//!
//! Scheduling is fire-and-forget from the caller's point of view: the caller
//! has already been answered from cache when a job is queued, so refresh
//! failures are logged and swallowed, never surfaced. The pending set keeps
//! at most one refresh per key in flight; a key leaves it only after its
//! refresh settles, so a slow endpoint is not re-enqueued on every hit.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::core::fetch::{FetchExecutor, FetchRequest};
use crate::core::key::CacheKey;
use crate::core::metrics::Metrics;
use crate::core::policy::RoutePolicy;
use crate::core::store::CacheStore;

/// Fraction of a policy's TTL after which a served hit enqueues a refresh.
pub const REFRESH_AGE_THRESHOLD: f64 = 0.8;
/// Capacity of the refresh job channel.
pub const REFRESH_QUEUE_DEPTH: usize = 64;

/// A revalidation job for one cache key.
#[derive(Debug)]
pub struct RefreshJob {
    pub key: CacheKey,
    pub request: FetchRequest,
    pub policy: RoutePolicy,
}

/// Fire-and-forget scheduling handle held by the gateway.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    tx: mpsc::Sender<RefreshJob>,
    pending: Arc<DashMap<CacheKey, ()>>,
}

impl RefreshScheduler {
    pub fn new(tx: mpsc::Sender<RefreshJob>, pending: Arc<DashMap<CacheKey, ()>>) -> Self {
        Self { tx, pending }
    }

    /// Queues a refresh unless one is already pending for the key. Returns
    /// whether the job was queued. Dropping a job under a busy queue is
    /// acceptable; the entry simply stays stale a little longer.
    pub fn try_schedule(&self, job: RefreshJob) -> bool {
        if self.pending.insert(job.key.clone(), ()).is_some() {
            return false;
        }
        let key = job.key.clone();
        if let Err(e) = self.tx.try_send(job) {
            self.pending.remove(&key);
            warn!("failed to queue background refresh, worker may be busy: {e}");
            return false;
        }
        true
    }

    pub fn is_pending(&self, key: &CacheKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&self) {
        self.pending.clear();
    }
}

/// Drains the refresh queue, revalidating one entry per job.
pub struct RefreshWorker {
    pub store: Arc<CacheStore>,
    pub executor: Arc<dyn FetchExecutor>,
    pub metrics: Arc<Metrics>,
    pub rx: mpsc::Receiver<RefreshJob>,
    pub pending: Arc<DashMap<CacheKey, ()>>,
}

impl RefreshWorker {
    /// Runs the main loop until the shutdown signal arrives.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("background refresh worker started");
        loop {
            tokio::select! {
                Some(job) = self.rx.recv() => {
                    self.process(job).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("background refresh worker shutting down");
                    return;
                }
            }
        }
    }

    async fn process(&self, job: RefreshJob) {
        debug!(key = %job.key, "revalidating cache entry in background");
        self.metrics.record_background_refresh();

        match self.executor.execute(&job.request).await {
            Ok(payload) if payload.is_success() => {
                if self
                    .store
                    .put(job.key.clone(), payload, job.policy)
                    .is_some()
                {
                    self.metrics.record_eviction();
                }
            }
            Ok(payload) => {
                // A non-success status is not cacheable; keep the entry we have.
                warn!(
                    key = %job.key,
                    status = payload.status,
                    "background refresh returned a non-success status"
                );
            }
            Err(e) => {
                warn!(key = %job.key, "background refresh failed: {e}");
            }
        }

        // Only now may the key be scheduled again.
        self.pending.remove(&job.key);
    }
}
