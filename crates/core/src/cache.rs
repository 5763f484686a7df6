//! TTL cache for expensive tool calls (forecasts, web lookups).
//!
//! Entries expire a fixed interval after insertion regardless of access, and
//! the cache holds at most `max_entries` values, evicting the
//! least-recently-touched entry when full. One instance is shared across all
//! in-flight queries, so the interior map is mutex-guarded.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Deterministic cache key derived from a call's semantic arguments.
///
/// Arguments are sorted by name before hashing so equivalent calls with
/// reordered keyword arguments collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn of(namespace: &str, arguments: &Value) -> Self {
        let mut sorted: BTreeMap<String, String> = BTreeMap::new();
        if let Some(object) = arguments.as_object() {
            for (name, value) in object {
                sorted.insert(name.clone(), value.to_string());
            }
        } else {
            sorted.insert("_".to_string(), arguments.to_string());
        }

        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        for (name, value) in &sorted {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        let hex: String = digest.iter().take(8).map(|byte| format!("{byte:02x}")).collect();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    touched_at: DateTime<Utc>,
}

/// Snapshot of cache occupancy for the metrics/doctor surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub expired_entries: usize,
    pub max_entries: usize,
    pub ttl_secs: i64,
}

/// Generic key→value cache with TTL expiry and capacity-bounded eviction.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries, entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    pub fn set(&self, key: CacheKey, value: V) {
        self.set_at(key, value, Utc::now());
    }

    fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(key.as_str()) {
            Some(entry) => now - entry.inserted_at > self.ttl,
            None => return None,
        };
        if expired {
            entries.remove(key.as_str());
            return None;
        }
        let entry = entries.get_mut(key.as_str())?;
        entry.touched_at = now;
        Some(entry.value.clone())
    }

    fn set_at(&self, key: CacheKey, value: V, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if entries.len() >= self.max_entries && !entries.contains_key(key.as_str()) {
            let coldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.touched_at)
                .map(|(stored_key, _)| stored_key.clone());
            if let Some(stored_key) = coldest {
                entries.remove(&stored_key);
            }
        }

        entries.insert(
            key.as_str().to_string(),
            CacheEntry { value, inserted_at: now, touched_at: now },
        );
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key.as_str());
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired =
            entries.values().filter(|entry| now - entry.inserted_at > self.ttl).count();
        CacheStats {
            total_entries: entries.len(),
            active_entries: entries.len() - expired,
            expired_entries: expired,
            max_entries: self.max_entries,
            ttl_secs: self.ttl.num_seconds(),
        }
    }
}

/// Cache for forecast tool results: 15 minutes, 100 entries by default.
#[derive(Debug)]
pub struct ForecastCache {
    inner: TtlCache<String>,
}

impl ForecastCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { inner: TtlCache::new(ttl, max_entries) }
    }

    pub fn key(indicator: &str, periods: u32, method: &str, data_fingerprint: &str) -> CacheKey {
        CacheKey::of(
            "forecast",
            &serde_json::json!({
                "indicator": indicator.to_lowercase(),
                "periods": periods,
                "method": method.to_lowercase(),
                "data": data_fingerprint,
            }),
        )
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        self.inner.get(key)
    }

    pub fn set(&self, key: CacheKey, result: String) {
        self.inner.set(key, result);
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

impl Default for ForecastCache {
    fn default() -> Self {
        Self::new(Duration::minutes(15), 100)
    }
}

/// Cache for external search results: 30 minutes, 256 entries by default.
#[derive(Debug)]
pub struct SearchCache {
    inner: TtlCache<String>,
}

impl SearchCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { inner: TtlCache::new(ttl, max_entries) }
    }

    pub fn key(query: &str) -> CacheKey {
        CacheKey::of("search", &serde_json::json!({ "query": query.trim().to_lowercase() }))
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        self.inner.get(key)
    }

    pub fn set(&self, key: CacheKey, result: String) {
        self.inner.set(key, result);
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(Duration::minutes(30), 256)
    }
}
