//! Stream merge: fold decoded increments into the pending-response record.
//!
//! Two pure reducers do the work:
//! - [`accumulate`] appends an increment to the text received so far
//! - [`fold_pending_response`] writes the accumulated text into the first
//!   page of an entry, creating the pending-response record on first data
//!
//! [`StreamMerger`] binds them to one cache entry.

use chrono::{DateTime, Utc};
use quill_cache::CacheStore;
use quill_core::{CacheEntry, Clock, Fingerprint};
use std::sync::Arc;

/// `(accumulated, increment) -> accumulated'`
///
/// Increments are concatenated in delivery order; nothing is reordered or
/// deduplicated.
pub fn accumulate(accumulated: &str, increment: &str) -> String {
    let mut next = String::with_capacity(accumulated.len() + increment.len());
    next.push_str(accumulated);
    next.push_str(increment);
    next
}

/// Write `accumulated` into the entry's pending-response record.
///
/// Total over empty entries. Never creates a second pending-response
/// record.
pub fn fold_pending_response(
    entry: &CacheEntry,
    accumulated: &str,
    created_at: DateTime<Utc>,
) -> CacheEntry {
    entry.with_pending_response(accumulated, created_at)
}

/// Folds accumulated response text into one cache entry.
pub struct StreamMerger {
    store: CacheStore,
    fingerprint: Fingerprint,
    clock: Arc<dyn Clock>,
    folds: usize,
}

impl StreamMerger {
    /// Merge into `fingerprint`'s entry in `store`.
    pub fn new(store: CacheStore, fingerprint: Fingerprint, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            fingerprint,
            clock,
            folds: 0,
        }
    }

    /// Replace the pending-response text with `accumulated`.
    pub fn fold(&mut self, accumulated: &str) {
        let now = self.clock.now();
        self.store.transform(&self.fingerprint, |entry| {
            fold_pending_response(entry, accumulated, now)
        });
        self.folds += 1;
        tracing::debug!(
            subject_id = %self.fingerprint.subject_id(),
            fold = self.folds,
            len = accumulated.len(),
            "Folded stream increment"
        );
    }

    /// Number of folds applied since creation.
    pub fn fold_count(&self) -> usize {
        self.folds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use quill_core::{Record, SystemClock};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_accumulate_concatenates_in_order() {
        let text = ["Hel", "lo", "!"]
            .iter()
            .fold(String::new(), |acc, inc| accumulate(&acc, inc));
        assert_eq!(text, "Hello!");
    }

    #[test]
    fn test_fold_keeps_own_message_below_reply() {
        let entry = CacheEntry::empty().with_prepended(Record::own("m1", "hi", at(1)));
        let entry = fold_pending_response(&entry, "Hel", at(2));
        let entry = fold_pending_response(&entry, "Hello!", at(3));

        let first = &entry.pages[0].messages;
        assert_eq!(first.len(), 2);
        assert!(first[0].is_pending_response());
        assert_eq!(first[0].text, "Hello!");
        assert_eq!(first[1].text, "hi");
    }

    #[test]
    fn test_merger_writes_through_store() {
        let store = CacheStore::new();
        let fp = Fingerprint::new("f1", 10).unwrap();
        let mut merger = StreamMerger::new(store.clone(), fp.clone(), Arc::new(SystemClock));

        merger.fold("Hel");
        assert_eq!(store.read(&fp).pending_response().unwrap().text, "Hel");
        merger.fold("Hello!");
        assert_eq!(store.read(&fp).pending_response().unwrap().text, "Hello!");
        assert_eq!(store.read(&fp).pending_response_count(), 1);
        assert_eq!(merger.fold_count(), 2);
    }
}
