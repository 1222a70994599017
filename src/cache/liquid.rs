// ABOUTME: Layered query-result cache with score-based placement and coldest-layer eviction
// ABOUTME: Ported from the source's liquid_cache.py: md5 fingerprint keys, TTL expiry, decayed-score layering
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Mutex;
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::Value as Json;

use crate::constants::cache::{
    DEFAULT_LAYERS, DEFAULT_MAX_SIZE, DEFAULT_TTL_SECS, SCORE_LAYER_0, SCORE_LAYER_1, SCORE_LAYER_2,
};

use super::patterns::PatternTracker;

/// Tunable knobs for a [`LiquidCache`] instance.
#[derive(Debug, Clone)]
pub struct LiquidCacheConfig {
    /// Number of conceptual hotness layers; layer 0 is hottest.
    pub layers: usize,
    /// Default entry time-to-live.
    pub ttl: Duration,
    /// Maximum total entries across all layers before eviction kicks in.
    pub max_size: usize,
}

impl Default for LiquidCacheConfig {
    fn default() -> Self {
        Self {
            layers: DEFAULT_LAYERS,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

struct Entry {
    value: Json,
    tag: Option<String>,
    inserted_at: Instant,
    last_access: Instant,
    access_count: u64,
    /// Boost applied by a preloader that predicted this entry would be
    /// wanted, rather than a caller that actually asked for it.
    predicted_score: f64,
    /// Current layer, 0 = hottest. Assigned directly on insert (predicted
    /// entries start at layer 1, others at the coldest layer) and then
    /// kept in sync with `score()` on every successful `get`.
    layer: usize,
}

impl Entry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }

    /// `access_count / max(1, seconds_since_last_access / 3600) * (1 + predicted_score)`.
    #[allow(clippy::cast_precision_loss)]
    fn score(&self) -> f64 {
        let seconds_since_last_access = self.last_access.elapsed().as_secs_f64();
        let decay = (seconds_since_last_access / 3600.0).max(1.0);
        (self.access_count as f64 / decay) * (1.0 + self.predicted_score)
    }

    fn score_to_layer(score: f64, layer_count: usize) -> usize {
        let max_layer = layer_count.saturating_sub(1);
        if score > SCORE_LAYER_0 {
            0
        } else if score > SCORE_LAYER_1 {
            1.min(max_layer)
        } else if score > SCORE_LAYER_2 {
            2.min(max_layer)
        } else {
            max_layer
        }
    }
}

struct State {
    entries: std::collections::HashMap<String, Entry>,
    patterns: PatternTracker,
}

/// Observed cache effectiveness, reported by `/admin/cache/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Total entries currently stored, across all layers.
    pub entry_count: usize,
    /// Per-layer entry counts, index 0 = hottest.
    pub layer_counts: Vec<usize>,
    /// Cumulative hits since process start.
    pub hits: u64,
    /// Cumulative misses since process start.
    pub misses: u64,
}

/// A layered, pattern-learning query-result cache.
///
/// All mutable state — entries and the successor-pattern tracker — lives
/// behind a single lock so a lookup's read, its pattern observation, and
/// any resulting eviction happen as one atomic step.
pub struct LiquidCache {
    config: LiquidCacheConfig,
    state: Mutex<State>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl LiquidCache {
    /// Build an empty cache, optionally seeded with patterns persisted at
    /// `patterns_path`.
    #[must_use]
    pub fn new(config: LiquidCacheConfig, patterns_path: Option<&std::path::Path>) -> Self {
        let patterns = patterns_path.map_or_else(PatternTracker::new, PatternTracker::load);
        Self {
            config,
            state: Mutex::new(State {
                entries: std::collections::HashMap::new(),
                patterns,
            }),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Deterministic cache key: `md5(query_type + ":" + canonical_json(params))`.
    ///
    /// `params` must already be in a canonical form (sorted map keys);
    /// [`crate::value::Value`]'s `Map` is a `BTreeMap`, so its JSON
    /// serialization is canonical by construction.
    #[must_use]
    pub fn fingerprint(query_type: &str, params: &Json) -> String {
        let canonical = params.to_string();
        let mut hasher = Md5::new();
        hasher.update(query_type.as_bytes());
        hasher.update(b":");
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Coarse access-pattern fingerprint, deliberately coarser than
    /// [`Self::fingerprint`]: it groups requests by the *shape* of the
    /// query (`cell_key`, `collection`, `query_type`, `limit`, `sort`)
    /// rather than by its exact parameter values, so pattern learning
    /// recognizes "the same kind of request" even when, say, the filter
    /// values differ between calls.
    #[must_use]
    pub fn register_query(
        cell_key: &str,
        collection: &str,
        query_type: &str,
        limit: Option<usize>,
        sort: Option<&[String]>,
    ) -> String {
        let limit_part = limit.map_or_else(|| "*".to_owned(), |l| l.to_string());
        let sort_part = sort.map(|fields| fields.join(",")).unwrap_or_default();
        format!("{cell_key}:{collection}:{query_type}:{limit_part}:{sort_part}")
    }

    /// Look up `key`, recording `pattern` for access-pattern learning.
    /// Returns `None` on miss or expiry.
    ///
    /// `pattern` is the coarse fingerprint from [`Self::register_query`],
    /// not `key` itself — pattern learning operates on request shape, the
    /// cache lookup operates on exact parameters.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned by a prior panicking holder.
    pub fn get(&self, key: &str, pattern: &str) -> Option<Json> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let due = state.patterns.observe(pattern);
        let ttl = self.config.ttl;
        let layer_count = self.config.layers;

        let Some(entry) = state.entries.get_mut(key) else {
            drop(state);
            self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return None;
        };

        if entry.is_expired(ttl) {
            state.entries.remove(key);
            drop(state);
            self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return None;
        }

        entry.last_access = Instant::now();
        entry.access_count += 1;
        entry.layer = Entry::score_to_layer(entry.score(), layer_count);
        let value = entry.value.clone();
        drop(state);

        self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let _ = due;
        Some(value)
    }

    /// Store `value` under `key`, optionally tagged for later bulk
    /// invalidation via [`Self::invalidate_related`].
    ///
    /// `predicted` marks an entry placed by a preloader acting on a
    /// pattern hint rather than an actual caller request: predicted
    /// entries start in layer 1 and carry a score boost, while ordinary
    /// entries start in the coldest layer with no boost. Both are
    /// re-layered by score on their first real `get`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned by a prior panicking holder.
    pub fn put(&self, key: &str, value: Json, tag: Option<String>, predicted: bool) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        let layer_count = self.config.layers;
        let layer = if predicted {
            1.min(layer_count.saturating_sub(1))
        } else {
            layer_count.saturating_sub(1)
        };
        state.entries.insert(
            key.to_owned(),
            Entry {
                value,
                tag,
                inserted_at: now,
                last_access: now,
                access_count: 0,
                predicted_score: if predicted { 1.0 } else { 0.0 },
                layer,
            },
        );
        self.evict_if_over_capacity(&mut state);
    }

    /// Remove every entry whose key or tag matches the glob `pattern`.
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid glob.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned by a prior panicking holder.
    pub fn invalidate_related(&self, pattern: &str) -> anyhow::Result<u64> {
        let glob_pattern = glob::Pattern::new(pattern)?;
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(k, e)| {
                glob_pattern.matches(k) || e.tag.as_deref().is_some_and(|t| glob_pattern.matches(t))
            })
            .map(|(k, _)| k.clone())
            .collect();

        for key in &doomed {
            state.entries.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    /// Keys predicted likely to be accessed next after `pattern`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned by a prior panicking holder.
    #[must_use]
    pub fn likely_next(&self, pattern: &str) -> Vec<(String, f64)> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.patterns.likely_next(pattern)
    }

    /// Patterns that clear the stricter preload threshold after `pattern`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned by a prior panicking holder.
    #[must_use]
    pub fn preload_candidates(&self, pattern: &str) -> Vec<(String, f64)> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.patterns.preload_candidates(pattern)
    }

    /// Persist the learned access patterns to `path`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned by a prior panicking holder.
    pub fn persist_patterns(&self, path: &std::path::Path) {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.patterns.persist(path);
    }

    /// Snapshot of current cache effectiveness.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned by a prior panicking holder.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut layer_counts = vec![0_usize; self.config.layers];
        for entry in state.entries.values() {
            if let Some(slot) = layer_counts.get_mut(entry.layer) {
                *slot += 1;
            }
        }
        CacheStats {
            entry_count: state.entries.len(),
            layer_counts,
            hits: self.hits.load(std::sync::atomic::Ordering::Relaxed),
            misses: self.misses.load(std::sync::atomic::Ordering::Relaxed),
        }
    }

    /// Evict entries from the coldest populated layer, ordered by
    /// `(access_count ascending, last_access oldest-first)`, until the
    /// cache is back within `max_size`.
    fn evict_if_over_capacity(&self, state: &mut State) {
        while state.entries.len() > self.config.max_size {
            let Some(coldest_key) = state
                .entries
                .iter()
                .max_by_key(|(_, e)| e.layer)
                .and_then(|(coldest_layer_key, _)| {
                    let coldest_layer = state.entries[coldest_layer_key].layer;
                    state
                        .entries
                        .iter()
                        .filter(|(_, e)| e.layer == coldest_layer)
                        .min_by(|(_, a), (_, b)| {
                            a.access_count
                                .cmp(&b.access_count)
                                .then_with(|| a.last_access.cmp(&b.last_access))
                        })
                        .map(|(k, _)| k.clone())
                })
            else {
                break;
            };
            state.entries.remove(&coldest_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> LiquidCache {
        LiquidCache::new(
            LiquidCacheConfig {
                max_size: 2,
                ..LiquidCacheConfig::default()
            },
            None,
        )
    }

    #[test]
    fn fingerprint_is_stable_for_same_inputs() {
        let params = json!({"a": 1, "b": 2});
        let k1 = LiquidCache::fingerprint("search", &params);
        let k2 = LiquidCache::fingerprint("search", &params);
        assert_eq!(k1, k2);
    }

    #[test]
    fn fingerprint_differs_for_different_query_type() {
        let params = json!({"a": 1});
        assert_ne!(
            LiquidCache::fingerprint("search", &params),
            LiquidCache::fingerprint("aggregate", &params)
        );
    }

    #[test]
    fn register_query_ignores_exact_parameter_values_but_not_shape() {
        let sort = vec!["name".to_owned()];
        let a = LiquidCache::register_query("cellA", "items", "query", Some(10), Some(&sort));
        let b = LiquidCache::register_query("cellA", "items", "query", Some(10), Some(&sort));
        assert_eq!(a, b);
        let different_limit = LiquidCache::register_query("cellA", "items", "query", Some(20), Some(&sort));
        assert_ne!(a, different_limit);
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = cache();
        cache.put("k1", json!({"v": 1}), None, false);
        assert_eq!(cache.get("k1", "p1"), Some(json!({"v": 1})));
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache = cache();
        assert_eq!(cache.get("nope", "p1"), None);
    }

    #[test]
    fn predicted_insert_lands_in_layer_one() {
        let cache = cache();
        cache.put("k1", json!(1), None, true);
        let state = cache.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(state.entries["k1"].layer, 1);
    }

    #[test]
    fn ordinary_insert_lands_in_coldest_layer() {
        let cache = cache();
        cache.put("k1", json!(1), None, false);
        let state = cache.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(state.entries["k1"].layer, cache.config.layers.saturating_sub(1));
    }

    #[test]
    fn evicts_coldest_entry_over_capacity() {
        let cache = cache();
        cache.put("k1", json!(1), None, false);
        cache.put("k2", json!(2), None, false);
        // k1 gets accessed; k2 never does, so k2 is the coldest by the tie-break.
        let _ = cache.get("k1", "p1");
        cache.put("k3", json!(3), None, false);
        assert!(cache.get("k1", "p1").is_some());
        assert!(cache.get("k3", "p3").is_some());
    }

    #[test]
    fn invalidate_related_removes_matching_tag() {
        let cache = cache();
        cache.put("k1", json!(1), Some("user:42".to_owned()), false);
        cache.put("k2", json!(2), Some("user:99".to_owned()), false);
        let removed = cache.invalidate_related("user:42").unwrap_or(0);
        assert_eq!(removed, 1);
        assert!(cache.get("k1", "p1").is_none());
        assert!(cache.get("k2", "p2").is_some());
    }
}
