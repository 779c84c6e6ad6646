// src/core/inflight.rs

//! Tracks requests currently in transit so concurrent identical calls share
//! one network round trip.
//!
//! The registry maps a cache key to a `Shared` future. The first caller for
//! a key installs the future; everyone arriving while it is pending awaits
//! the same one and observes the identical settled value, success or
//! failure. The key is removed exactly once, when the flight settles — the
//! removal is baked into the installed future itself as a finally-equivalent,
//! so a failed request never leaves a permanently stuck key and a cancelled
//! awaiter cannot strand it either.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::core::errors::GatewayError;
use crate::core::fetch::ResponsePayload;
use crate::core::key::CacheKey;

/// The settled-once, awaited-many result of a single network round trip.
pub type SharedResult = Shared<BoxFuture<'static, Result<ResponsePayload, GatewayError>>>;

/// Outcome of [`InFlightRegistry::begin`].
pub enum Flight {
    /// This caller created the round trip.
    Leader(SharedResult),
    /// Another caller already owns the round trip; its factory was not run.
    Follower(SharedResult),
}

impl Flight {
    pub fn shared(&self) -> SharedResult {
        match self {
            Flight::Leader(s) | Flight::Follower(s) => s.clone(),
        }
    }
}

/// At most one flight exists per key at any instant.
#[derive(Default)]
pub struct InFlightRegistry {
    pending: Arc<DashMap<CacheKey, SharedResult>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pending flight for `key`, if one exists right now.
    pub fn get(&self, key: &CacheKey) -> Option<SharedResult> {
        self.pending.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the existing flight for `key`, or installs one built from
    /// `factory`. The factory is not invoked when a flight already exists:
    /// N concurrent callers for one key produce exactly one network call.
    /// Whoever polls the installed future to completion also removes the
    /// key, on success and failure alike.
    pub fn begin<F>(&self, key: &CacheKey, factory: F) -> Flight
    where
        F: FnOnce() -> BoxFuture<'static, Result<ResponsePayload, GatewayError>>,
    {
        match self.pending.entry(key.clone()) {
            Entry::Occupied(existing) => Flight::Follower(existing.get().clone()),
            Entry::Vacant(vacant) => {
                let pending = Arc::clone(&self.pending);
                let settled_key = key.clone();
                let inner = factory();
                let shared = async move {
                    let result = inner.await;
                    pending.remove(&settled_key);
                    result
                }
                .boxed()
                .shared();
                vacant.insert(shared.clone());
                Flight::Leader(shared)
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&self) {
        self.pending.clear();
    }
}
