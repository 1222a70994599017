// ABOUTME: Access-pattern tracker used by the liquid cache to learn request shape and predict successors
// ABOUTME: Ported from the source's access-pattern learner: per-pattern observation stats, successor histograms, threshold-gated preload hints
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::cache::{LIKELY_NEXT_THRESHOLD, PERSIST_EVERY, PERSIST_MIN_COUNT, PRELOAD_THRESHOLD};

/// Successor counts observed after a given pattern was seen.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Successors {
    counts: HashMap<String, u64>,
    total: u64,
}

/// Everything tracked about one observed access pattern: how often it has
/// recurred, when it was last seen, the rolling mean of the gaps between
/// sightings, and which patterns tend to follow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PatternRecord {
    count: u64,
    last_seen: DateTime<Utc>,
    avg_interval_secs: f64,
    successors: Successors,
}

impl PatternRecord {
    fn first_seen(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            last_seen: now,
            avg_interval_secs: 0.0,
            successors: Successors::default(),
        }
    }

    /// Bump `count` by exactly one and fold the gap since `last_seen` into
    /// the running mean interval.
    #[allow(clippy::cast_precision_loss)]
    fn record_observation(&mut self, now: DateTime<Utc>) {
        if self.count > 0 {
            let interval_secs = (now - self.last_seen).num_milliseconds().max(0) as f64 / 1000.0;
            let n = self.count as f64;
            self.avg_interval_secs = (self.avg_interval_secs * n + interval_secs) / (n + 1.0);
        }
        self.count += 1;
        self.last_seen = now;
    }
}

/// Learns "pattern A tends to recur, and pattern B tends to follow it"
/// from observed access order.
#[derive(Debug, Default)]
pub struct PatternTracker {
    patterns: HashMap<String, PatternRecord>,
    last_pattern: Option<String>,
    observations_since_persist: u64,
}

/// On-disk form of the learned pattern table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedPatterns {
    patterns: HashMap<String, PatternRecord>,
}

impl PatternTracker {
    /// A tracker with no prior history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load previously persisted pattern stats from `path`, if present.
    /// Missing or unreadable files are treated as empty history.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let mut tracker = Self::new();
        if let Ok(bytes) = std::fs::read(path) {
            if let Ok(persisted) = serde_json::from_slice::<PersistedPatterns>(&bytes) {
                tracker.patterns = persisted.patterns;
            } else {
                tracing::warn!(path = %path.display(), "failed to parse persisted access patterns, starting fresh");
            }
        }
        tracker
    }

    /// Record that `pattern` was just observed: bumps its own `count` and
    /// rolling interval by exactly one observation, and registers a
    /// successor transition from whatever pattern preceded it. Returns
    /// `true` if a persistence save is due.
    pub fn observe(&mut self, pattern: &str) -> bool {
        let now = Utc::now();

        self.patterns
            .entry(pattern.to_owned())
            .or_insert_with(|| PatternRecord::first_seen(now))
            .record_observation(now);

        if let Some(prev) = self.last_pattern.replace(pattern.to_owned()) {
            if prev != pattern {
                let prev_record = self
                    .patterns
                    .entry(prev)
                    .or_insert_with(|| PatternRecord::first_seen(now));
                *prev_record.successors.counts.entry(pattern.to_owned()).or_insert(0) += 1;
                prev_record.successors.total += 1;
            }
        }

        self.observations_since_persist += 1;
        let due = self.observations_since_persist >= PERSIST_EVERY;
        if due {
            self.observations_since_persist = 0;
        }
        due
    }

    /// Number of times `pattern` itself has been observed.
    #[must_use]
    pub fn count(&self, pattern: &str) -> u64 {
        self.patterns.get(pattern).map_or(0, |r| r.count)
    }

    /// Rolling mean of the gap, in seconds, between successive sightings
    /// of `pattern`. `0.0` if it has been seen fewer than twice.
    #[must_use]
    pub fn avg_interval_secs(&self, pattern: &str) -> f64 {
        self.patterns.get(pattern).map_or(0.0, |r| r.avg_interval_secs)
    }

    /// Patterns considered "likely next" after `pattern`: successor
    /// frequency above [`LIKELY_NEXT_THRESHOLD`], sorted by descending
    /// frequency.
    #[must_use]
    pub fn likely_next(&self, pattern: &str) -> Vec<(String, f64)> {
        self.successor_frequencies(pattern, LIKELY_NEXT_THRESHOLD)
    }

    /// Patterns eligible for actual background preload: successor
    /// frequency above the stricter [`PRELOAD_THRESHOLD`].
    #[must_use]
    pub fn preload_candidates(&self, pattern: &str) -> Vec<(String, f64)> {
        self.successor_frequencies(pattern, PRELOAD_THRESHOLD)
    }

    fn successor_frequencies(&self, pattern: &str, threshold: f64) -> Vec<(String, f64)> {
        let Some(record) = self.patterns.get(pattern) else {
            return Vec::new();
        };
        if record.successors.total == 0 {
            return Vec::new();
        }
        #[allow(clippy::cast_precision_loss)]
        let total = record.successors.total as f64;
        let mut freqs: Vec<(String, f64)> = record
            .successors
            .counts
            .iter()
            .filter_map(|(k, count)| {
                #[allow(clippy::cast_precision_loss)]
                let freq = *count as f64 / total;
                (freq > threshold).then(|| (k.clone(), freq))
            })
            .collect();
        freqs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        freqs
    }

    /// Persist patterns seen at least [`PERSIST_MIN_COUNT`] times to `path`
    /// as JSON. Patterns below that threshold are noise and are dropped
    /// rather than carried forward.
    pub fn persist(&self, path: &Path) {
        let patterns: HashMap<String, PatternRecord> = self
            .patterns
            .iter()
            .filter(|(_, r)| r.count >= PERSIST_MIN_COUNT)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create patterns directory");
                return;
            }
        }

        match serde_json::to_vec(&PersistedPatterns { patterns }) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(path, bytes) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to persist access patterns");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize access patterns"),
        }
    }

    /// Default on-disk location for persisted patterns under `cache_dir`.
    #[must_use]
    pub fn default_path(cache_dir: &Path) -> PathBuf {
        cache_dir.join("access_patterns.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observing_a_pattern_increases_its_count_by_exactly_one() {
        let mut tracker = PatternTracker::new();
        assert_eq!(tracker.count("a"), 0);
        tracker.observe("a");
        assert_eq!(tracker.count("a"), 1);
        tracker.observe("b");
        tracker.observe("a");
        assert_eq!(tracker.count("a"), 2);
    }

    #[test]
    fn observing_p_then_p_prime_increases_successor_count() {
        let mut tracker = PatternTracker::new();
        tracker.observe("a");
        tracker.observe("b");
        assert_eq!(tracker.patterns["a"].successors.counts["b"], 1);
        tracker.observe("a");
        tracker.observe("b");
        assert_eq!(tracker.patterns["a"].successors.counts["b"], 2);
    }

    #[test]
    fn learns_successor_above_likely_threshold() {
        let mut tracker = PatternTracker::new();
        for _ in 0..4 {
            tracker.observe("a");
            tracker.observe("b");
        }
        let likely = tracker.likely_next("a");
        assert_eq!(likely.len(), 1);
        assert_eq!(likely[0].0, "b");
    }

    #[test]
    fn preload_threshold_is_stricter_than_likely_threshold() {
        let mut tracker = PatternTracker::new();
        // "a" -> "b" 4 times, "a" -> "c" 3 times: b at 4/7 ~= 0.571, c at 3/7 ~= 0.429.
        // Both clear the 0.3 "likely" bar; neither clears the 0.7 preload bar.
        for _ in 0..4 {
            tracker.observe("a");
            tracker.observe("b");
        }
        for _ in 0..3 {
            tracker.observe("a");
            tracker.observe("c");
        }
        assert_eq!(tracker.likely_next("a").len(), 2);
        assert!(tracker.preload_candidates("a").is_empty());
    }

    #[test]
    fn unknown_pattern_has_no_successors_and_zero_count() {
        let tracker = PatternTracker::new();
        assert!(tracker.likely_next("nope").is_empty());
        assert_eq!(tracker.count("nope"), 0);
    }
}
