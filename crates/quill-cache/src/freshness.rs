//! Per-fingerprint freshness bookkeeping
//!
//! Tracks, for every fingerprint:
//! - a monotonic refresh generation, bumped whenever in-flight reads are
//!   cancelled or superseded
//! - whether the cached value is stale
//! - how many times the entry has been invalidated
//!
//! A background read captures the generation when it starts and may only
//! publish its result if the generation is unchanged when it finishes.

use std::collections::HashMap;

use quill_core::Fingerprint;

#[derive(Debug, Clone, Copy, Default)]
struct Freshness {
    generation: u64,
    stale: bool,
    invalidations: u64,
}

/// Tracks refresh generations and stale flags per fingerprint
#[derive(Debug, Clone, Default)]
pub struct FreshnessTracker {
    keys: HashMap<Fingerprint, Freshness>,
}

impl FreshnessTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Current refresh generation (0 for never-seen keys).
    pub fn generation(&self, key: &Fingerprint) -> u64 {
        self.keys.get(key).map_or(0, |f| f.generation)
    }

    /// Supersede any read started under the current generation.
    ///
    /// Generations are monotonic - they only increase.
    pub fn bump_generation(&mut self, key: &Fingerprint) -> u64 {
        let entry = self.keys.entry(key.clone()).or_default();
        entry.generation += 1;
        entry.generation
    }

    /// Mark a key stale and count the invalidation.
    pub fn mark_stale(&mut self, key: &Fingerprint) {
        let entry = self.keys.entry(key.clone()).or_default();
        entry.stale = true;
        entry.invalidations += 1;
    }

    /// Clear the stale flag if `generation` is still current.
    ///
    /// Returns whether the read that captured `generation` may publish.
    pub fn mark_fresh_if_current(&mut self, key: &Fingerprint, generation: u64) -> bool {
        match self.keys.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.stale = false;
                true
            }
            Some(_) => false,
            None => generation == 0,
        }
    }

    /// Whether the cached value for `key` is stale.
    ///
    /// Keys that have never been invalidated are fresh.
    pub fn is_stale(&self, key: &Fingerprint) -> bool {
        self.keys.get(key).is_some_and(|f| f.stale)
    }

    /// Number of invalidations recorded for `key`.
    pub fn invalidation_count(&self, key: &Fingerprint) -> u64 {
        self.keys.get(key).map_or(0, |f| f.invalidations)
    }

    /// Number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.keys.len()
    }
}
