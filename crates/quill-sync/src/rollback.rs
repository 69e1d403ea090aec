//! Snapshot and restore of a cache entry around an optimistic mutation.

use quill_cache::CacheStore;
use quill_core::{CacheEntry, Fingerprint, Record};

/// Pre-mutation state, captured before the optimistic insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Entry the snapshot belongs to
    pub fingerprint: Fingerprint,
    /// The entry exactly as it was, pages and cursors included
    pub previous_entry: CacheEntry,
    /// Composer text at submit time
    pub pending_input: String,
}

impl Snapshot {
    /// All records of the previous entry, flattened in page order.
    pub fn previous_messages(&self) -> Vec<Record> {
        self.previous_entry.flattened()
    }
}

/// Owns the snapshot of the mutation in flight.
///
/// Restoring consumes the snapshot, so a second restore for the same
/// mutation is a no-op.
#[derive(Debug)]
pub struct RollbackManager {
    store: CacheStore,
    fingerprint: Fingerprint,
    current: Option<Snapshot>,
    restores: u64,
}

impl RollbackManager {
    /// Manage snapshots of `fingerprint`'s entry.
    pub fn new(store: CacheStore, fingerprint: Fingerprint) -> Self {
        Self {
            store,
            fingerprint,
            current: None,
            restores: 0,
        }
    }

    /// Cancel in-flight reads, snapshot the entry and apply `optimistic`.
    ///
    /// The three steps run as one store operation, so no refetch can land
    /// between the snapshot and the optimistic write.
    pub fn begin<F>(&mut self, pending_input: String, optimistic: F) -> &Snapshot
    where
        F: FnOnce(&CacheEntry) -> CacheEntry,
    {
        let previous_entry = self.store.begin_optimistic(&self.fingerprint, optimistic);
        self.current.insert(Snapshot {
            fingerprint: self.fingerprint.clone(),
            previous_entry,
            pending_input,
        })
    }

    /// The snapshot held for the mutation in flight.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    /// Write the snapshot back verbatim and return the input to restore.
    ///
    /// Returns `None` when there is nothing to restore.
    pub fn restore(&mut self) -> Option<String> {
        let snapshot = self.current.take()?;
        let previous = snapshot.previous_entry;
        self.store
            .transform(&snapshot.fingerprint, move |_| previous);
        self.restores += 1;
        tracing::warn!(
            subject_id = %snapshot.fingerprint.subject_id(),
            restores = self.restores,
            "Rolled back optimistic mutation"
        );
        Some(snapshot.pending_input)
    }

    /// Drop the snapshot after a successful mutation.
    pub fn discard(&mut self) -> Option<Snapshot> {
        self.current.take()
    }

    /// How many times a snapshot has been restored.
    pub fn restore_count(&self) -> u64 {
        self.restores
    }
}
