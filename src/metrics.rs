//! Point-in-time pool and cache metrics for an external monitor.
//!
//! [`MetricsSnapshot`] serializes to JSON and carries a list of tuning
//! [`Recommendation`]s derived from the numbers it reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::cache::{CacheStats, ResponseCache};
use crate::pool::{AgentPool, PoolStats};

/// Pool utilisation at or above which a larger pool is suggested.
const HIGH_UTILISATION: f64 = 0.8;
/// Hit rate below which, after enough lookups, a longer TTL is suggested.
const LOW_HIT_RATE: f64 = 0.2;
const MIN_LOOKUPS_FOR_HIT_RATE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// A tuning hint for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub severity: Severity,
    /// Subsystem the hint applies to (`pool` or `cache`).
    pub component: &'static str,
    pub message: String,
}

impl Recommendation {
    fn info(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            component,
            message: message.into(),
        }
    }

    fn warning(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            component,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub captured_at: DateTime<Utc>,
    pub pool: PoolStats,
    pub cache: CacheStats,
    pub recommendations: Vec<Recommendation>,
}

impl MetricsSnapshot {
    pub fn capture(pool: &AgentPool, cache: &ResponseCache) -> Self {
        Self::from_stats(pool.stats(), cache.stats())
    }

    pub fn from_stats(pool: PoolStats, cache: CacheStats) -> Self {
        let recommendations = recommend(&pool, &cache);
        Self {
            captured_at: Utc::now(),
            pool,
            cache,
            recommendations,
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Emit a one-line summary at info level.
    pub fn emit(&self, reason: &str) {
        info!(
            event = "pool_cache_summary",
            reason = reason,
            pool_size = self.pool.size,
            pool_capacity = self.pool.capacity,
            checked_out = self.pool.checked_out,
            evictions = self.pool.evictions,
            exhausted = self.pool.exhausted,
            cache_entries = self.cache.entries,
            cache_hits = self.cache.hits,
            cache_misses = self.cache.misses,
            recommendations = self.recommendations.len(),
            "Pool and cache metrics"
        );
    }
}

fn recommend(pool: &PoolStats, cache: &CacheStats) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if pool.capacity > 0 && pool.utilisation() >= HIGH_UTILISATION {
        out.push(Recommendation::warning(
            "pool",
            format!(
                "Agent pool is {:.0}% full ({}/{}); consider increasing pool_size",
                pool.utilisation() * 100.0,
                pool.size,
                pool.capacity
            ),
        ));
    }
    if pool.size == 0 {
        out.push(Recommendation::info(
            "pool",
            "Agent pool is empty; agents are constructed on first use",
        ));
    }
    if pool.exhausted > 0 {
        out.push(Recommendation::warning(
            "pool",
            format!(
                "{} acquires timed out waiting for an agent; consider a larger pool or longer acquire_timeout_ms",
                pool.exhausted
            ),
        ));
    }

    if !cache.enabled {
        out.push(Recommendation::warning(
            "cache",
            "Response cache is disabled; enable it to avoid repeated LLM calls",
        ));
    } else {
        let lookups = cache.hits + cache.misses;
        if lookups >= MIN_LOOKUPS_FOR_HIT_RATE && cache.hit_rate() < LOW_HIT_RATE {
            out.push(Recommendation::info(
                "cache",
                format!(
                    "Cache hit rate is {:.0}% over {} lookups; consider a longer ttl_secs",
                    cache.hit_rate() * 100.0,
                    lookups
                ),
            ));
        }
        if cache.evictions > 0 {
            out.push(Recommendation::info(
                "cache",
                format!(
                    "{} entries evicted at capacity; consider raising max_entries",
                    cache.evictions
                ),
            ));
        }
    }
    out.push(Recommendation::info(
        "cache",
        "Cache is in-process memory only; entries are not shared between instances",
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pool_stats(size: usize, capacity: usize) -> PoolStats {
        PoolStats {
            size,
            capacity,
            idle: size,
            checked_out: 0,
            constructing: 0,
            constructions: size as u64,
            construction_failures: 0,
            reuses: 0,
            evictions: 0,
            idle_evictions: 0,
            releases: 0,
            invalid_releases: 0,
            exhausted: 0,
            models: BTreeMap::new(),
        }
    }

    fn cache_stats(enabled: bool) -> CacheStats {
        CacheStats {
            enabled,
            entries: 0,
            max_entries: None,
            default_ttl_secs: 3600,
            hits: 0,
            misses: 0,
            expired: 0,
            evictions: 0,
            insertions: 0,
            invalidations: 0,
        }
    }

    fn messages(snapshot: &MetricsSnapshot, component: &str) -> Vec<(Severity, String)> {
        snapshot
            .recommendations
            .iter()
            .filter(|r| r.component == component)
            .map(|r| (r.severity, r.message.clone()))
            .collect()
    }

    #[test]
    fn test_high_utilisation_warns() {
        let snap = MetricsSnapshot::from_stats(pool_stats(8, 10), cache_stats(true));
        let pool = messages(&snap, "pool");
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].0, Severity::Warning);
        assert!(pool[0].1.contains("80%"));
    }

    #[test]
    fn test_moderate_utilisation_is_quiet() {
        let snap = MetricsSnapshot::from_stats(pool_stats(5, 10), cache_stats(true));
        assert!(messages(&snap, "pool").is_empty());
    }

    #[test]
    fn test_empty_pool_info() {
        let snap = MetricsSnapshot::from_stats(pool_stats(0, 10), cache_stats(true));
        assert_eq!(messages(&snap, "pool")[0].0, Severity::Info);
    }

    #[test]
    fn test_disabled_cache_warns() {
        let snap = MetricsSnapshot::from_stats(pool_stats(5, 10), cache_stats(false));
        let cache = messages(&snap, "cache");
        assert!(cache
            .iter()
            .any(|(sev, msg)| *sev == Severity::Warning && msg.contains("disabled")));
    }

    #[test]
    fn test_low_hit_rate_needs_enough_lookups() {
        let mut cache = cache_stats(true);
        cache.hits = 1;
        cache.misses = 20;
        let snap = MetricsSnapshot::from_stats(pool_stats(5, 10), cache.clone());
        assert!(!messages(&snap, "cache").iter().any(|(_, m)| m.contains("hit rate")));

        cache.misses = 200;
        let snap = MetricsSnapshot::from_stats(pool_stats(5, 10), cache);
        assert!(messages(&snap, "cache").iter().any(|(_, m)| m.contains("hit rate")));
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = MetricsSnapshot::from_stats(pool_stats(2, 10), cache_stats(true));
        let json: serde_json::Value = serde_json::from_str(&snap.to_json().unwrap()).unwrap();
        assert_eq!(json["pool"]["capacity"], 10);
        assert_eq!(json["cache"]["enabled"], true);
        assert!(json["captured_at"].is_string());
        assert_eq!(json["recommendations"][0]["severity"], "info");
    }
}
