//! LLM response cache with TTL expiry and optional capacity bound.
//!
//! Keys are [`Fingerprint`]s of `(prompt, model_id, params)`. Entries expire
//! `ttl` after creation and are never returned past that point, whether or
//! not [`ResponseCache::cleanup`] has run. When `max_entries` is set, adding
//! a new key to a full cache evicts the entry with the oldest `created_at`.
//!
//! All operations take `&self`; the entry map sits behind a
//! `std::sync::Mutex` held only for the map operation itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::providers::RequestParams;

use super::fingerprint::{Fingerprint, Fingerprinter};

/// A single cached LLM response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: Fingerprint,
    /// The serialized response payload.
    pub value: String,
    pub created_at: Instant,
    /// `None` when `created_at + ttl` is past the clock's range: the entry
    /// never expires.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
    insertions: AtomicU64,
    invalidations: AtomicU64,
}

/// In-memory response cache.
pub struct ResponseCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    fingerprinter: Fingerprinter,
    default_ttl: Duration,
    max_entries: Option<usize>,
    enabled: AtomicBool,
    counters: Counters,
}

impl ResponseCache {
    /// Create a cache from configuration.
    ///
    /// A configured `max_entries` is clamped to a minimum of 1.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fingerprinter: Fingerprinter::new(config.fingerprint_params.clone()),
            default_ttl: config.ttl(),
            max_entries: config.max_entries.map(|m| m.max(1)),
            enabled: AtomicBool::new(config.enabled),
            counters: Counters::default(),
        }
    }

    /// Cache key for a request.
    pub fn cache_key(&self, prompt: &str, model_id: &str, params: &RequestParams) -> Fingerprint {
        self.fingerprinter.fingerprint(prompt, model_id, params)
    }

    /// Cache key for a non-prompt request, such as a whole conversation.
    /// Use with [`Self::get_by_key`] and [`Self::put_by_key`].
    pub fn value_key<T: Serialize + ?Sized>(&self, namespace: &str, value: &T) -> Result<Fingerprint> {
        Fingerprinter::for_value(namespace, value)
    }

    /// Look up a cached response. Returns `None` if absent or expired.
    ///
    /// An expired entry found here is removed.
    pub fn get(&self, prompt: &str, model_id: &str, params: &RequestParams) -> Option<String> {
        let key = self.cache_key(prompt, model_id, params);
        self.get_by_key(&key)
    }

    /// Look up by a precomputed key.
    pub fn get_by_key(&self, key: &Fingerprint) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let now = Instant::now();
        let mut entries = self.lock_entries();
        let expired = entries.get(key).map(|e| e.is_expired(now));
        match expired {
            Some(false) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                entries.get(key).map(|e| e.value.clone())
            }
            Some(true) => {
                entries.remove(key);
                drop(entries);
                debug!(key = %key.short(), "Cache entry expired, removing");
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// The live entry for `key`, without touching hit/miss counters or
    /// removing it if expired.
    pub fn peek(&self, key: &Fingerprint) -> Option<CacheEntry> {
        let now = Instant::now();
        self.lock_entries()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .cloned()
    }

    /// Store a response, replacing any entry with the same key.
    ///
    /// `ttl = None` uses the configured default TTL.
    pub fn put(
        &self,
        prompt: &str,
        model_id: &str,
        params: &RequestParams,
        value: String,
        ttl: Option<Duration>,
    ) {
        let key = self.cache_key(prompt, model_id, params);
        self.put_by_key(key, value, ttl);
    }

    /// Store under a precomputed key.
    pub fn put_by_key(&self, key: Fingerprint, value: String, ttl: Option<Duration>) {
        if !self.is_enabled() {
            return;
        }
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry {
            key: key.clone(),
            value,
            created_at: now,
            expires_at: now.checked_add(ttl),
        };

        let mut entries = self.lock_entries();
        if let Some(max) = self.max_entries {
            if !entries.contains_key(&key) && entries.len() >= max {
                let purged = purge_expired(&mut entries, now);
                self.counters.expired.fetch_add(purged as u64, Ordering::Relaxed);
                while entries.len() >= max {
                    let Some(oldest) = entries
                        .iter()
                        .min_by_key(|(_, e)| e.created_at)
                        .map(|(k, _)| k.clone())
                    else {
                        break;
                    };
                    debug!(key = %oldest.short(), "Evicting oldest cache entry");
                    entries.remove(&oldest);
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        entries.insert(key, entry);
        self.counters.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Serialize `value` as JSON and store it.
    ///
    /// A serialization failure is returned and nothing is written.
    pub fn put_json<T: Serialize>(
        &self,
        prompt: &str,
        model_id: &str,
        params: &RequestParams,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        self.put(prompt, model_id, params, encoded, ttl);
        Ok(())
    }

    /// Fetch and deserialize a JSON value stored with [`Self::put_json`].
    pub fn get_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        model_id: &str,
        params: &RequestParams,
    ) -> Result<Option<T>> {
        match self.get(prompt, model_id, params) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Remove the entry for a request. Returns `true` if one was present.
    pub fn invalidate(&self, prompt: &str, model_id: &str, params: &RequestParams) -> bool {
        let key = self.cache_key(prompt, model_id, params);
        let removed = self.lock_entries().remove(&key).is_some();
        if removed {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key.short(), "Cache entry invalidated");
        }
        removed
    }

    /// Remove every expired entry and return how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let removed = purge_expired(&mut self.lock_entries(), now);
        if removed > 0 {
            self.counters.expired.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Cache cleanup pass");
        }
        removed
    }

    /// Remove all entries from the cache.
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    /// Enable or disable caching. A disabled cache misses every lookup and
    /// drops every write; existing entries are kept.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Return the number of entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// Return `true` if the cache contains no entries.
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Return aggregate statistics about the cache.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            entries: self.len(),
            max_entries: self.max_entries,
            default_ttl_secs: self.default_ttl.as_secs(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            insertions: self.counters.insertions.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    // -- private helpers ---------------------------------------------------

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<Fingerprint, CacheEntry>> {
        self.entries.lock().expect("response cache lock poisoned")
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.len())
            .field("max_entries", &self.max_entries)
            .field("default_ttl", &self.default_ttl)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn purge_expired(entries: &mut HashMap<Fingerprint, CacheEntry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, e| !e.is_expired(now));
    before - entries.len()
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    /// Number of entries currently in the cache.
    pub entries: usize,
    pub max_entries: Option<usize>,
    pub default_ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed because their TTL passed (lazily or by cleanup).
    pub expired: u64,
    /// Entries removed to make room under `max_entries`.
    pub evictions: u64,
    pub insertions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache, or 0.0 with no lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
