// src/core/store.rs

//! Bounded key→entry cache table with insertion-order eviction.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;

use crate::core::fetch::ResponsePayload;
use crate::core::key::CacheKey;
use crate::core::policy::RoutePolicy;

/// Default upper bound on stored entries.
pub const DEFAULT_CAPACITY: usize = 100;

/// A cached response together with the policy it was stored under.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: ResponsePayload,
    pub stored_at: Instant,
    pub policy: RoutePolicy,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Fresh iff `age < ttl`. A stale entry remains retrievable through
    /// [`CacheStore::get`] but only ever as a fallback value.
    pub fn is_fresh(&self) -> bool {
        self.age() < self.policy.ttl
    }

    /// True once the entry's age has crossed the given fraction of its TTL.
    pub fn near_expiry(&self, threshold: f64) -> bool {
        self.age().as_secs_f64() >= self.policy.ttl.as_secs_f64() * threshold
    }
}

/// In-memory key→entry table.
///
/// Eviction removes the single oldest-*inserted* entry once the capacity
/// bound is exceeded. Insertion order, not access recency: overwriting an
/// existing key keeps its original insertion slot. This is a deliberate,
/// observable property that tests pin down.
#[derive(Debug)]
pub struct CacheStore {
    entries: Mutex<IndexMap<CacheKey, CacheEntry>>,
    capacity: usize,
}

impl CacheStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    /// Inserts or overwrites the entry with `stored_at = now`. Returns the
    /// key evicted to honor the capacity bound, if any.
    pub fn put(
        &self,
        key: CacheKey,
        payload: ResponsePayload,
        policy: RoutePolicy,
    ) -> Option<CacheKey> {
        let mut entries = self.entries.lock();
        entries.insert(
            key,
            CacheEntry {
                payload,
                stored_at: Instant::now(),
                policy,
            },
        );
        if entries.len() > self.capacity {
            entries.shift_remove_index(0).map(|(evicted, _)| evicted)
        } else {
            None
        }
    }

    /// Removes every entry whose key matches the pattern. Returns the number
    /// of entries removed.
    pub fn invalidate(&self, pattern: &Regex) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !pattern.is_match(key.as_str()));
        before - entries.len()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
