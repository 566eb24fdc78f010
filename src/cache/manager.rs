/// Generic in-memory cache with TTL and access-count eviction
///
/// Thread-safe, keyed by namespaced strings (see `keys`).
/// Tracks metrics for monitoring.
use super::config::CacheConfig;
use crate::logger::{self, LogTag};
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Cache entry with TTL tracking
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    /// Insertion order, breaks ties between entries created in the same instant
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub inserts: u64,
}

/// Point-in-time view of one cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub size: usize,
    pub max_size: usize,
    /// Entries past their TTL that no sweep or read has dropped yet
    pub expired_count: usize,
    pub total_access_count: u64,
    /// Average accesses per resident entry
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Key selector for `invalidate`
#[derive(Debug, Clone)]
pub enum InvalidationPattern {
    Substring(String),
    Regex(Regex),
}

impl InvalidationPattern {
    fn matches(&self, key: &str) -> bool {
        match self {
            InvalidationPattern::Substring(needle) => key.contains(needle.as_str()),
            InvalidationPattern::Regex(re) => re.is_match(key),
        }
    }
}

impl From<&str> for InvalidationPattern {
    fn from(needle: &str) -> Self {
        InvalidationPattern::Substring(needle.to_string())
    }
}

impl From<String> for InvalidationPattern {
    fn from(needle: String) -> Self {
        InvalidationPattern::Substring(needle)
    }
}

impl From<Regex> for InvalidationPattern {
    fn from(re: Regex) -> Self {
        InvalidationPattern::Regex(re)
    }
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    metrics: CacheMetrics,
    next_seq: u64,
}

/// Time-boxed, capacity-bounded cache for one dataset
///
/// When full, inserting a new key evicts the entry with the lowest access
/// count, oldest first on ties. This approximates LFU/LRU without keeping
/// an access order list.
pub struct DataCache<V: Clone> {
    name: &'static str,
    config: CacheConfig,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone + Send + 'static> DataCache<V> {
    /// Create new cache with given configuration
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        Self {
            name,
            config,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                metrics: CacheMetrics::default(),
                next_seq: 0,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get value from cache (None if expired or missing)
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                state.metrics.misses += 1;
                return None;
            }
        };

        if expired {
            state.entries.remove(key);
            state.metrics.misses += 1;
            state.metrics.expirations += 1;
            return None;
        }

        let value = state.entries.get_mut(key).map(|entry| {
            entry.access_count += 1;
            entry.value.clone()
        });
        state.metrics.hits += 1;
        value
    }

    /// Insert with the cache's default TTL
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.config.ttl);
    }

    /// Insert with an explicit TTL for this entry
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let mut state = self.state.lock();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.max_size {
            if let Some(victim) = Self::pick_victim(&state.entries) {
                state.entries.remove(&victim);
                state.metrics.evictions += 1;
                logger::debug(
                    LogTag::Cache,
                    &format!("[{}] Evicted '{}' to make room for '{}'", self.name, victim, key),
                );
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                ttl,
                access_count: 0,
                seq,
            },
        );
        state.metrics.inserts += 1;
    }

    /// Whether a live entry exists (does not count as an access)
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return false,
        };
        if expired {
            state.entries.remove(key);
            state.metrics.expirations += 1;
        }
        !expired
    }

    /// Remove specific key; true if it was present
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().entries.remove(key).is_some()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Delete every key matching the pattern, returning how many were removed
    pub fn invalidate(&self, pattern: impl Into<InvalidationPattern>) -> usize {
        let pattern = pattern.into();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !pattern.matches(key));
        let removed = before - state.entries.len();

        if removed > 0 {
            logger::debug(
                LogTag::Cache,
                &format!("[{}] Invalidated {} entries ({:?})", self.name, removed, pattern),
            );
        }
        removed
    }

    /// Drop all expired entries regardless of access
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();
        state.metrics.expirations += removed as u64;
        removed
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().metrics.clone()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let state = self.state.lock();

        let size = state.entries.len();
        let expired_count = state.entries.values().filter(|e| e.is_expired(now)).count();
        let total_access_count: u64 = state.entries.values().map(|e| e.access_count).sum();
        let hit_rate = if size > 0 {
            total_access_count as f64 / size as f64
        } else {
            0.0
        };

        CacheStats {
            name: self.name.to_string(),
            size,
            max_size: self.config.max_size,
            expired_count,
            total_access_count,
            hit_rate,
            hits: state.metrics.hits,
            misses: state.metrics.misses,
            evictions: state.metrics.evictions,
        }
    }

    /// Periodically sweep expired entries until the token is cancelled
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.config.cleanup_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        logger::debug(
                            LogTag::Cache,
                            &format!("[{}] Sweeper stopped", cache.name),
                        );
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.sweep_expired();
                        if removed > 0 {
                            logger::verbose(
                                LogTag::Cache,
                                &format!("[{}] Swept {} expired entries", cache.name, removed),
                            );
                        }
                    }
                }
            }
        })
    }

    fn pick_victim(entries: &HashMap<String, CacheEntry<V>>) -> Option<String> {
        entries
            .iter()
            .min_by_key(|(_, e)| (e.access_count, e.created_at, e.seq))
            .map(|(key, _)| key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64, max_size: usize) -> DataCache<String> {
        DataCache::new("test", CacheConfig::custom(ttl_secs, max_size, 1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_basic_operations() {
        let cache = cache(60, 100);

        cache.set("key1", "value1".to_string());
        assert_eq!(cache.get("key1"), Some("value1".to_string()));
        assert_eq!(cache.get("nonexistent"), None);

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);

        assert!(cache.delete("key1"));
        assert!(!cache.delete("key1"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiration() {
        let cache = cache(1, 100);

        cache.set("key", "value".to_string());
        assert_eq!(cache.get("key"), Some("value".to_string()));

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(cache.get("key"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.metrics().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_entry_ttl_override() {
        let cache = cache(60, 100);
        cache.set_with_ttl("short", "v".to_string(), Duration::from_secs(5));
        cache.set("long", "v".to_string());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!cache.has("short"));
        assert!(cache.has("long"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_prefers_least_accessed() {
        let cache = cache(60, 2);

        cache.set("key1", "value1".to_string());
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("key2", "value2".to_string());

        // key1 is older but has been read
        cache.get("key1");
        cache.set("key3", "value3".to_string());

        assert_eq!(cache.len(), 2);
        assert!(cache.has("key1"));
        assert!(!cache.has("key2"));
        assert!(cache.has("key3"));
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_tie_breaks_on_age() {
        let cache = cache(60, 3);
        for key in ["a", "b", "c"] {
            cache.set(key, key.to_string());
        }
        cache.set("d", "d".to_string());
        assert!(!cache.has("a"));
        assert!(cache.has("b") && cache.has("c") && cache.has("d"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_never_exceeded() {
        let cache = cache(60, 5);
        for i in 0..50 {
            cache.set(format!("k{}", i), i.to_string());
            if i % 3 == 0 {
                cache.get(&format!("k{}", i));
            }
            assert!(cache.len() <= 5);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_at_capacity_keeps_others() {
        let cache = cache(60, 2);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.set("a", "3".to_string());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some("3".to_string()));
        assert!(cache.has("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_substring_and_regex() {
        let cache = cache(60, 100);
        cache.set("stakes:alice", "1".to_string());
        cache.set("portfolio:alice", "2".to_string());
        cache.set("stakes:bob", "3".to_string());
        cache.set("pools", "4".to_string());

        assert_eq!(cache.invalidate("alice"), 2);
        assert!(cache.has("stakes:bob"));

        let re = Regex::new(r"^stakes:").unwrap();
        assert_eq!(cache.invalidate(re), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_reports_expired_and_accesses() {
        let cache = cache(10, 100);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.get("a");
        cache.get("a");

        tokio::time::advance(Duration::from_secs(11)).await;
        cache.set("c", "3".to_string());

        let stats = cache.stats();
        assert_eq!(stats.size, 3);
        assert_eq!(stats.expired_count, 2);
        assert_eq!(stats.total_access_count, 2);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_until_cancelled() {
        let cache = Arc::new(DataCache::new("sweep", CacheConfig::custom(5, 10, 1)));
        let token = CancellationToken::new();
        let handle = cache.spawn_sweeper(token.clone());

        cache.set("k", "v".to_string());
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(cache.len(), 0);

        token.cancel();
        handle.await.unwrap();
    }
}
