//! Cache change notifications and counters.

use quill_core::Fingerprint;
use serde::Serialize;

/// A change to one cache entry.
///
/// Every variant names the fingerprint it concerns; subscribers filter on it
/// to observe a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheEvent {
    /// Entry content replaced by a transform
    Updated {
        /// Affected entry
        fingerprint: Fingerprint,
    },
    /// Entry marked stale
    Invalidated {
        /// Affected entry
        fingerprint: Fingerprint,
    },
    /// An in-flight refetch was cancelled
    RefreshCancelled {
        /// Affected entry
        fingerprint: Fingerprint,
    },
    /// Entry replaced by authoritative data
    Refreshed {
        /// Affected entry
        fingerprint: Fingerprint,
    },
    /// A further page was appended
    PageAppended {
        /// Affected entry
        fingerprint: Fingerprint,
        /// Number of pages after the append
        page_count: usize,
    },
}

impl CacheEvent {
    /// Fingerprint this event concerns.
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Self::Updated { fingerprint }
            | Self::Invalidated { fingerprint }
            | Self::RefreshCancelled { fingerprint }
            | Self::Refreshed { fingerprint }
            | Self::PageAppended { fingerprint, .. } => fingerprint,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    /// Transforms applied
    pub transforms: u64,
    /// Invalidations recorded
    pub invalidations: u64,
    /// In-flight refetches cancelled
    pub refreshes_cancelled: u64,
    /// Refetch results written to the cache
    pub refetches_applied: u64,
    /// Refetch results dropped because a newer write superseded them
    pub refetches_discarded: u64,
    /// Refetches that failed at the page source
    pub refetches_failed: u64,
}
