// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bounded LRU Cache
//!
//! Thread-safe LRU map with two eviction triggers: an entry-count limit and
//! an aggregate memory budget. Whichever is hit first evicts from the
//! least-recently-used end.
//!
//! Memory is an estimate from [`ApproxSize`]; it only drives eviction and is
//! not meant for accounting. Recency is refreshed on both `get` and `put`.
//! Hits and misses are counted strictly by presence.

use std::borrow::Borrow;
use std::hash::Hash;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;
use crate::domain::{ContextValue, ExecutionPattern, PerformanceMetrics, Recommendation};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Structural size estimate in bytes. Must grow with the payload.
pub trait ApproxSize {
    fn approx_size(&self) -> usize;
}

impl ApproxSize for String {
    fn approx_size(&self) -> usize {
        size_of::<String>() + self.len()
    }
}

impl ApproxSize for ContextValue {
    fn approx_size(&self) -> usize {
        match self {
            ContextValue::Text(s) => size_of::<ContextValue>() + s.len(),
            _ => size_of::<ContextValue>(),
        }
    }
}

impl<T: ApproxSize> ApproxSize for Vec<T> {
    fn approx_size(&self) -> usize {
        size_of::<Vec<T>>() + self.iter().map(ApproxSize::approx_size).sum::<usize>()
    }
}

impl ApproxSize for ExecutionPattern {
    fn approx_size(&self) -> usize {
        size_of::<ExecutionPattern>()
            + self.id.len()
            + self.task_type.len()
            + self.pattern_used.len()
            + self.complexity_level.len()
            + self.tools_used.approx_size()
            + self
                .context_factors
                .iter()
                .map(|(k, v)| k.approx_size() + v.approx_size())
                .sum::<usize>()
    }
}

impl ApproxSize for Recommendation {
    fn approx_size(&self) -> usize {
        size_of::<Recommendation>() + self.pattern.len() + self.source.len()
    }
}

impl ApproxSize for PerformanceMetrics {
    fn approx_size(&self) -> usize {
        size_of::<PerformanceMetrics>()
            + self.component_name.len()
            + self.metric_name.len()
            + self
                .metadata
                .iter()
                .map(|(k, v)| k.approx_size() + v.approx_size())
                .sum::<usize>()
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub memory_bytes: usize,
    pub memory_mb: f64,
    pub max_memory_mb: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit ratio (0.0 to 1.0); 0.0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct BoundedLruCache<K, V> {
    max_entries: usize,
    max_memory_bytes: usize,
    inner: Mutex<LruInner<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct LruInner<K, V> {
    entries: lru::LruCache<K, V>,
    memory_bytes: usize,
}

fn key_len<K: Borrow<str>>(key: &K) -> usize {
    let key: &str = key.borrow();
    key.len()
}

impl<K, V> BoundedLruCache<K, V>
where
    K: Hash + Eq + Clone + Borrow<str>,
    V: Clone + ApproxSize,
{
    /// A zero `max_entries` is treated as 1.
    pub fn new(max_entries: usize, max_memory_mb: f64) -> Self {
        Self {
            max_entries: max_entries.max(1),
            max_memory_bytes: (max_memory_mb.max(0.0) * BYTES_PER_MB) as usize,
            inner: Mutex::new(LruInner {
                entries: lru::LruCache::unbounded(),
                memory_bytes: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.max_memory_mb)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key).cloned() {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Reads without touching recency or hit statistics.
    pub fn peek(&self, key: &str) -> Option<V> {
        self.inner.lock().entries.peek(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains(key)
    }

    pub fn put(&self, key: K, value: V) {
        let entry_size = key_len(&key) + value.approx_size();
        let mut inner = self.inner.lock();

        let replaced = {
            let existing: &str = key.borrow();
            inner.entries.pop(existing)
        };
        match replaced {
            Some(old) => {
                inner.memory_bytes = inner
                    .memory_bytes
                    .saturating_sub(key_len(&key) + old.approx_size());
            }
            None if inner.entries.len() >= self.max_entries => {
                self.evict_lru(&mut inner);
            }
            None => {}
        }

        inner.entries.put(key, value);
        inner.memory_bytes += entry_size;

        while inner.memory_bytes > self.max_memory_bytes && !inner.entries.is_empty() {
            self.evict_lru(&mut inner);
        }
    }

    /// Exact-key removal.
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(key)?;
        inner.memory_bytes = inner
            .memory_bytes
            .saturating_sub(key.len() + removed.approx_size());
        Some(removed)
    }

    /// Clears everything when `pattern` is `None`, otherwise removes every
    /// entry whose key contains `pattern`. Returns the number removed.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut inner = self.inner.lock();
        let Some(pattern) = pattern else {
            let removed = inner.entries.len();
            inner.entries.clear();
            inner.memory_bytes = 0;
            return removed;
        };

        let doomed: Vec<K> = inner
            .entries
            .iter()
            .filter(|(k, _)| {
                let k: &str = (*k).borrow();
                k.contains(pattern)
            })
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            let k: &str = key.borrow();
            if let Some(value) = inner.entries.pop(k) {
                inner.memory_bytes = inner
                    .memory_bytes
                    .saturating_sub(key_len(key) + value.approx_size());
            }
        }
        doomed.len()
    }

    /// Keeps only entries for which `keep` returns true. Returns the number removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut inner = self.inner.lock();
        let doomed: Vec<K> = inner
            .entries
            .iter()
            .filter(|(k, v)| !keep(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            let k: &str = key.borrow();
            if let Some(value) = inner.entries.pop(k) {
                inner.memory_bytes = inner
                    .memory_bytes
                    .saturating_sub(key_len(key) + value.approx_size());
            }
        }
        doomed.len()
    }

    /// Snapshot of all values, most recently used first.
    pub fn values(&self) -> Vec<V> {
        self.inner.lock().entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn memory_bytes(&self) -> usize {
        self.inner.lock().memory_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, memory_bytes) = {
            let inner = self.inner.lock();
            (inner.entries.len(), inner.memory_bytes)
        };
        CacheStats {
            entries,
            max_entries: self.max_entries,
            memory_bytes,
            memory_mb: memory_bytes as f64 / BYTES_PER_MB,
            max_memory_mb: self.max_memory_bytes as f64 / BYTES_PER_MB,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_lru(&self, inner: &mut LruInner<K, V>) {
        if let Some((key, value)) = inner.entries.pop_lru() {
            inner.memory_bytes = inner
                .memory_bytes
                .saturating_sub(key_len(&key) + value.approx_size());
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_entries: usize) -> BoundedLruCache<String, String> {
        BoundedLruCache::new(max_entries, 10.0)
    }

    #[test]
    fn test_overflow_evicts_least_recently_used() {
        let cache = cache(3);
        cache.put("a".into(), "1".into());
        cache.put("b".into(), "2".into());
        cache.put("c".into(), "3".into());

        // Touch "a" so "b" becomes the LRU entry.
        assert_eq!(cache.get("a"), Some("1".to_string()));
        cache.put("d".into(), "4".into());

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("b"));
        assert!(cache.contains("a"));
        assert!(cache.contains("d"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_max_plus_one_distinct_keys() {
        let cache = cache(5);
        for i in 0..6 {
            cache.put(format!("k{i}"), format!("v{i}"));
        }
        assert_eq!(cache.len(), 5);
        assert!(!cache.contains("k0"));
    }

    #[test]
    fn test_replacing_a_key_does_not_evict() {
        let cache = cache(2);
        cache.put("a".into(), "1".into());
        cache.put("b".into(), "2".into());
        cache.put("a".into(), "updated".into());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek("a"), Some("updated".to_string()));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_put_refreshes_recency() {
        let cache = cache(2);
        cache.put("a".into(), "1".into());
        cache.put("b".into(), "2".into());
        cache.put("a".into(), "1".into());
        cache.put("c".into(), "3".into());

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_memory_budget_evicts_oldest_first() {
        let entry = "x".repeat(1000);
        let budget_mb = (3.5 * (1 + entry.approx_size()) as f64) / BYTES_PER_MB;
        let cache: BoundedLruCache<String, String> = BoundedLruCache::new(100, budget_mb);

        for key in ["a", "b", "c", "d", "e"] {
            cache.put(key.to_string(), entry.clone());
        }

        let stats = cache.stats();
        assert_eq!(stats.entries, 3);
        assert!(stats.memory_bytes <= (stats.max_memory_mb * BYTES_PER_MB) as usize);
        assert!(!cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("e"));
    }

    #[test]
    fn test_miss_has_no_side_effect() {
        let cache = cache(2);
        cache.put("a".into(), "1".into());
        assert_eq!(cache.get("missing"), None);

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_hit_ratio() {
        let cache = cache(2);
        assert_eq!(cache.stats().hit_ratio(), 0.0);
        cache.put("a".into(), "1".into());
        let _ = cache.get("a");
        let _ = cache.get("a");
        let _ = cache.get("b");
        assert!((cache.stats().hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalidate_by_substring_and_all() {
        let cache = cache(10);
        cache.put("pattern:p1".into(), "1".into());
        cache.put("pattern:p2".into(), "2".into());
        cache.put("query:abc".into(), "3".into());

        assert_eq!(cache.invalidate(Some("pattern:")), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("query:abc"));

        cache.put("pattern:p3".into(), "3".into());
        assert_eq!(cache.invalidate(None), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.memory_bytes(), 0);
    }

    #[test]
    fn test_remove_is_exact() {
        let cache = cache(10);
        cache.put("p1".into(), "1".into());
        cache.put("p10".into(), "10".into());

        assert_eq!(cache.remove("p1"), Some("1".to_string()));
        assert!(cache.contains("p10"));
        assert_eq!(cache.remove("p1"), None);
    }

    #[test]
    fn test_retain() {
        let cache = cache(10);
        for i in 0..6 {
            cache.put(format!("k{i}"), i.to_string());
        }
        let removed = cache.retain(|_, v| v.parse::<u32>().unwrap() % 2 == 0);
        assert_eq!(removed, 3);
        assert_eq!(cache.len(), 3);
        assert!(cache.contains("k4"));
    }

    #[test]
    fn test_memory_tracks_removals() {
        let cache = cache(10);
        cache.put("a".into(), "12345".into());
        let after_put = cache.memory_bytes();
        assert!(after_put > 0);
        cache.remove("a");
        assert_eq!(cache.memory_bytes(), 0);
    }

    #[test]
    fn test_pattern_size_grows_with_payload() {
        let small = ExecutionPattern::new("t", "p");
        let large = small
            .clone()
            .with_tools(["grep", "read", "write"])
            .with_context_factor("notes", "a fairly long free-form annotation");
        assert!(large.approx_size() > small.approx_size());
    }
}
