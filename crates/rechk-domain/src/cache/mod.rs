//! Check result caching with FIFO trimming.
//!
//! This module memoizes checker results so that identical pattern/modifier
//! pairs seen across requests are analysed only once.
//!
//! # Policy
//!
//! - Only **definitive** results (status other than `unknown`) are stored.
//!   Indeterminate outcomes may resolve differently on a retry.
//! - **First write wins**: an entry is never replaced once inserted.
//! - **FIFO trimming**: [`ResultCache::maybe_trim`] is called once per batch.
//!   When the cache holds more than `high_water_mark` entries, the
//!   `trim_chunk` oldest entries (by insertion order) are removed. Reads do
//!   not refresh an entry, so hot entries can be evicted. This is not an LRU.
//!
//! # Performance Characteristics
//!
//! - **Get**: O(1) - hash lookup under a shared read lock
//! - **Insert**: O(1) - hash insert plus push to the order queue
//! - **Trim**: O(chunk), amortized over at least `trim_chunk` inserts
//!
//! # Key Design
//!
//! Keys are `pattern.trim() + "::" + modifier`. The modifier is used as is.
//!
//! # Example
//!
//! ```rust
//! use rechk_domain::cache::{CacheKey, ResultCache, ResultCacheConfig};
//! use rechk_domain::checker::{CheckResult, CheckStatus};
//!
//! let cache = ResultCache::new(ResultCacheConfig::default());
//! let key = CacheKey::new("  (a+)+$ ", "");
//!
//! assert!(cache.insert(key.clone(), CheckResult::new(CheckStatus::Vulnerable)));
//! assert_eq!(cache.get(&key).unwrap().status, CheckStatus::Vulnerable);
//! assert_eq!(key.as_str(), "(a+)+$::");
//! ```

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use crate::checker::CheckResult;

/// Default number of entries above which the cache is trimmed.
pub const DEFAULT_HIGH_WATER_MARK: usize = 15_000;

/// Default number of entries removed per trim.
pub const DEFAULT_TRIM_CHUNK: usize = 1_000;

/// Separator between the pattern and the modifier in a cache key.
pub const KEY_SEPARATOR: &str = "::";

/// Configuration for the result cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCacheConfig {
    /// Size above which a trim removes `trim_chunk` entries.
    pub high_water_mark: usize,
    /// Number of oldest entries removed by one trim.
    pub trim_chunk: usize,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            trim_chunk: DEFAULT_TRIM_CHUNK,
        }
    }
}

impl ResultCacheConfig {
    /// Sets the high-water mark.
    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    /// Sets the trim chunk size.
    pub fn with_trim_chunk(mut self, trim_chunk: usize) -> Self {
        self.trim_chunk = trim_chunk;
        self
    }
}

/// Trims leading and trailing whitespace the way pattern keys expect.
///
/// The trimmed set is ECMAScript's WhiteSpace and LineTerminator: tab,
/// line feed, vertical tab, form feed, carriage return, the `Zs` space
/// separators, U+2028, U+2029 and the byte order mark. Unlike
/// [`char::is_whitespace`] it keeps U+0085 (NEL).
pub fn trim_pattern(pattern: &str) -> &str {
    pattern.trim_matches(is_pattern_whitespace)
}

fn is_pattern_whitespace(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\u{0b}' | '\u{0c}' | '\r'
            | ' '
            | '\u{a0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200a}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202f}'
            | '\u{205f}'
            | '\u{3000}'
            | '\u{feff}'
    )
}

/// Cache key that uniquely identifies a check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key from a raw pattern (trimmed here) and a modifier.
    pub fn new(pattern: &str, modifier: &str) -> Self {
        let pattern = trim_pattern(pattern);
        let mut key = String::with_capacity(pattern.len() + KEY_SEPARATOR.len() + modifier.len());
        key.push_str(pattern);
        key.push_str(KEY_SEPARATOR);
        key.push_str(modifier);
        Self(key)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CheckResult>,
    /// Keys in insertion order; the front is the oldest.
    order: VecDeque<CacheKey>,
}

/// Bounded cache of definitive check results.
///
/// # Thread Safety
///
/// All operations take `&self`; the cache can be shared behind an `Arc`
/// by every in-flight request. The lock is never held across an await.
#[derive(Debug)]
pub struct ResultCache {
    inner: RwLock<CacheInner>,
    config: ResultCacheConfig,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(ResultCacheConfig::default())
    }
}

impl ResultCache {
    /// Creates an empty cache with the given configuration.
    pub fn new(config: ResultCacheConfig) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            config,
        }
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &ResultCacheConfig {
        &self.config
    }

    /// Retrieves a cached result.
    ///
    /// # Metrics
    ///
    /// - `rechk_cache_hits_total` - Incremented on cache hit
    /// - `rechk_cache_misses_total` - Incremented on cache miss
    pub fn get(&self, key: &CacheKey) -> Option<CheckResult> {
        let result = self.inner.read().entries.get(key).cloned();
        if result.is_some() {
            metrics::counter!("rechk_cache_hits_total").increment(1);
        } else {
            metrics::counter!("rechk_cache_misses_total").increment(1);
        }
        result
    }

    /// Returns true if the key is cached. Does not touch hit/miss metrics.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    /// Stores a result.
    ///
    /// Returns `false` without storing anything if the result is not
    /// definitive or the key is already present.
    pub fn insert(&self, key: CacheKey, result: CheckResult) -> bool {
        if !result.is_definitive() {
            return false;
        }

        let mut inner = self.inner.write();
        if inner.entries.contains_key(&key) {
            return false;
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, result);
        metrics::gauge!("rechk_cache_entries").set(inner.entries.len() as f64);
        true
    }

    /// Removes the oldest `trim_chunk` entries if the cache has grown past
    /// its high-water mark.
    ///
    /// Returns the number of entries removed.
    pub fn maybe_trim(&self) -> usize {
        if self.inner.read().entries.len() <= self.config.high_water_mark {
            return 0;
        }

        let mut inner = self.inner.write();
        // Another task may have trimmed between the two locks.
        if inner.entries.len() <= self.config.high_water_mark {
            return 0;
        }

        let mut evicted = 0;
        while evicted < self.config.trim_chunk {
            let Some(key) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&key);
            evicted += 1;
        }

        metrics::counter!("rechk_cache_evictions_total").increment(evicted as u64);
        metrics::gauge!("rechk_cache_entries").set(inner.entries.len() as f64);
        evicted
    }

    /// Returns the number of cached results.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registers result cache metrics descriptions.
///
/// Optional; gives the metrics a description in Prometheus output.
pub fn register_result_cache_metrics() {
    metrics::describe_counter!("rechk_cache_hits_total", "Total number of result cache hits");
    metrics::describe_counter!(
        "rechk_cache_misses_total",
        "Total number of result cache misses"
    );
    metrics::describe_counter!(
        "rechk_cache_evictions_total",
        "Total number of entries removed by cache trimming"
    );
    metrics::describe_gauge!("rechk_cache_entries", "Current number of cached results");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckStatus;
    use std::sync::Arc;

    fn safe() -> CheckResult {
        CheckResult::new(CheckStatus::Safe)
    }

    fn key(i: usize) -> CacheKey {
        CacheKey::new(&format!("pattern{i}"), "")
    }

    // ============================================================
    // Section 1: Keys
    // ============================================================

    #[test]
    fn test_key_is_trimmed_pattern_and_modifier() {
        assert_eq!(CacheKey::new("  a+  ", "i").as_str(), "a+::i");
        assert_eq!(CacheKey::new("\t\na+\r\n", "").as_str(), "a+::");
        assert_eq!(CacheKey::new("\u{feff}a+", "gu").as_str(), "a+::gu");
    }

    #[test]
    fn test_trim_set_matches_ecmascript_whitespace() {
        for c in ['\u{0b}', '\u{0c}', '\u{a0}', '\u{2003}', '\u{2028}', '\u{2029}', '\u{3000}'] {
            assert_eq!(trim_pattern(&format!("{c}a+{c}")), "a+", "U+{:04X}", c as u32);
        }
    }

    #[test]
    fn test_next_line_is_not_trimmed() {
        assert_eq!(trim_pattern("a\u{85}"), "a\u{85}");
        assert_ne!(CacheKey::new("a\u{85}", ""), CacheKey::new("a", ""));
    }

    #[test]
    fn test_key_does_not_trim_modifier() {
        assert_ne!(CacheKey::new("a", " i"), CacheKey::new("a", "i"));
    }

    #[test]
    fn test_keys_differ_by_modifier() {
        assert_ne!(CacheKey::new("a+", ""), CacheKey::new("a+", "i"));
        assert_eq!(CacheKey::new(" a+", "i"), CacheKey::new("a+ ", "i"));
    }

    // ============================================================
    // Section 2: Insert & Lookup
    // ============================================================

    #[test]
    fn test_cache_starts_empty() {
        let cache = ResultCache::default();
        assert!(cache.is_empty());
        assert!(cache.get(&key(0)).is_none());
    }

    #[test]
    fn test_insert_then_get_returns_result() {
        let cache = ResultCache::default();
        let result = CheckResult::new(CheckStatus::Vulnerable).with_detail("source", "(a+)+");

        assert!(cache.insert(key(1), result.clone()));

        assert_eq!(cache.get(&key(1)), Some(result));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unknown_results_are_never_stored() {
        let cache = ResultCache::default();

        assert!(!cache.insert(key(1), CheckResult::new(CheckStatus::Unknown)));

        assert!(cache.get(&key(1)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_first_write_wins() {
        let cache = ResultCache::default();
        let first = CheckResult::new(CheckStatus::Safe).with_detail("n", 1);
        let second = CheckResult::new(CheckStatus::Vulnerable).with_detail("n", 2);

        assert!(cache.insert(key(1), first.clone()));
        assert!(!cache.insert(key(1), second));

        assert_eq!(cache.get(&key(1)), Some(first));
        assert_eq!(cache.len(), 1);
    }

    // ============================================================
    // Section 3: Trimming
    // ============================================================

    #[test]
    fn test_no_trim_at_or_below_high_water_mark() {
        let cache = ResultCache::new(
            ResultCacheConfig::default()
                .with_high_water_mark(10)
                .with_trim_chunk(3),
        );
        for i in 0..10 {
            cache.insert(key(i), safe());
        }

        assert_eq!(cache.maybe_trim(), 0);
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn test_trim_removes_oldest_chunk_in_insertion_order() {
        let cache = ResultCache::new(
            ResultCacheConfig::default()
                .with_high_water_mark(10)
                .with_trim_chunk(3),
        );
        for i in 0..11 {
            cache.insert(key(i), safe());
        }

        assert_eq!(cache.maybe_trim(), 3);

        assert_eq!(cache.len(), 8);
        for i in 0..3 {
            assert!(!cache.contains(&key(i)), "key {i} should be evicted");
        }
        for i in 3..11 {
            assert!(cache.contains(&key(i)), "key {i} should remain");
        }
    }

    #[test]
    fn test_reads_do_not_protect_from_eviction() {
        let cache = ResultCache::new(
            ResultCacheConfig::default()
                .with_high_water_mark(2)
                .with_trim_chunk(1),
        );
        for i in 0..3 {
            cache.insert(key(i), safe());
        }
        // Touch the oldest entry repeatedly; FIFO must still evict it.
        for _ in 0..5 {
            assert!(cache.get(&key(0)).is_some());
        }

        assert_eq!(cache.maybe_trim(), 1);
        assert!(!cache.contains(&key(0)));
        assert!(cache.contains(&key(1)));
    }

    #[test]
    fn test_trim_chunk_larger_than_cache_empties_it() {
        let cache = ResultCache::new(
            ResultCacheConfig::default()
                .with_high_water_mark(1)
                .with_trim_chunk(100),
        );
        cache.insert(key(0), safe());
        cache.insert(key(1), safe());

        assert_eq!(cache.maybe_trim(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_default_thresholds_evict_exactly_oldest_thousand() {
        let cache = ResultCache::default();
        for i in 0..15_001 {
            assert!(cache.insert(key(i), safe()));
        }

        assert_eq!(cache.maybe_trim(), 1_000);

        assert_eq!(cache.len(), 14_001);
        assert!(!cache.contains(&key(0)));
        assert!(!cache.contains(&key(999)));
        assert!(cache.contains(&key(1_000)));
        assert!(cache.contains(&key(15_000)));
        // Back under the mark: nothing more to do.
        assert_eq!(cache.maybe_trim(), 0);
    }

    // ============================================================
    // Section 4: Concurrency
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_and_trims_keep_structure_consistent() {
        let cache = Arc::new(ResultCache::new(
            ResultCacheConfig::default()
                .with_high_water_mark(500)
                .with_trim_chunk(100),
        ));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    cache.insert(key(worker * 1_000 + i), safe());
                    if i % 50 == 0 {
                        cache.maybe_trim();
                    }
                    let _ = cache.get(&key(worker * 1_000 + i));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let inner = cache.inner.read();
        assert_eq!(inner.entries.len(), inner.order.len());
        for k in &inner.order {
            assert!(inner.entries.contains_key(k));
        }
    }
}
