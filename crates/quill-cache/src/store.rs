//! Paginated cache store
//!
//! All state lives behind one `parking_lot::Mutex` that is only ever held
//! for synchronous work: reading an entry, running a pure transform,
//! bumping a refresh generation. Nothing awaits while holding it, which is
//! what makes each transform atomic and keeps per-fingerprint ordering equal
//! to submission order.
//!
//! Background refetches run as tokio tasks. They read pages without the
//! lock and publish under it, guarded by the fingerprint's refresh
//! generation (see [`FreshnessTracker`]).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use quill_core::{
    CacheEntry, EngineConfig, Fingerprint, Page, PageCursor, PageSource, QuillError, QuillResult,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{CacheEvent, CacheStatistics};
use crate::freshness::FreshnessTracker;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Store tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Capacity of the change broadcast channel
    pub event_capacity: usize,
    /// Upper bound of pages re-read by a refetch
    pub max_refetch_pages: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            max_refetch_pages: 10,
        }
    }
}

impl From<&EngineConfig> for StoreConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            event_capacity: config.event_capacity.max(1),
            max_refetch_pages: config.max_refetch_pages.max(1),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// A spawned refetch. `done` closes when the task's future is dropped,
/// whether it ran to completion or was aborted.
struct RefreshTask {
    handle: JoinHandle<()>,
    done: watch::Receiver<()>,
}

impl RefreshTask {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

#[derive(Default)]
struct Slot {
    entry: CacheEntry,
    /// Cursor of the page after the last loaded one, as reported by the source
    next_cursor: Option<PageCursor>,
    refresh: Option<RefreshTask>,
}

#[derive(Default)]
struct StoreState {
    slots: HashMap<Fingerprint, Slot>,
    freshness: FreshnessTracker,
    stats: CacheStatistics,
}

struct StoreInner {
    state: Mutex<StoreState>,
    source: Option<Arc<dyn PageSource>>,
    events: broadcast::Sender<CacheEvent>,
    config: StoreConfig,
}

/// Builder for [`CacheStore`].
#[derive(Default)]
pub struct CacheStoreBuilder {
    source: Option<Arc<dyn PageSource>>,
    config: StoreConfig,
}

impl CacheStoreBuilder {
    /// Attach the authoritative page source used for refetch.
    pub fn page_source(mut self, source: Arc<dyn PageSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Override store tunables.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the store.
    pub fn build(self) -> CacheStore {
        let (events, _rx) = broadcast::channel(self.config.event_capacity.max(1));
        CacheStore {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                source: self.source,
                events,
                config: self.config,
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache Store
// ─────────────────────────────────────────────────────────────────────────────

/// Keyed store of paginated cache entries.
///
/// Cheap to clone; clones share the same entries. Pass one instance to
/// every component that needs it rather than reaching for a global.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CacheStore")
            .field("entries", &state.slots.len())
            .field("has_source", &self.inner.source.is_some())
            .field("stats", &state.stats)
            .finish()
    }
}

impl CacheStore {
    /// Store without a page source; invalidation only marks entries stale.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a store.
    pub fn builder() -> CacheStoreBuilder {
        CacheStoreBuilder::default()
    }

    /// Current entry, or the empty entry when absent. Never blocks on I/O.
    pub fn read(&self, fingerprint: &Fingerprint) -> CacheEntry {
        self.inner
            .state
            .lock()
            .slots
            .get(fingerprint)
            .map(|slot| slot.entry.clone())
            .unwrap_or_default()
    }

    /// Atomically replace the entry with `f(current)`.
    ///
    /// `f` must be pure and handle the empty entry.
    pub fn transform<F>(&self, fingerprint: &Fingerprint, f: F)
    where
        F: FnOnce(&CacheEntry) -> CacheEntry,
    {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let slot = state.slots.entry(fingerprint.clone()).or_default();
        slot.entry = f(&slot.entry);
        state.stats.transforms += 1;
        self.emit(CacheEvent::Updated {
            fingerprint: fingerprint.clone(),
        });
    }

    /// Abort any outstanding background refresh for `fingerprint`.
    ///
    /// Results of reads started before this call are discarded even if the
    /// task has already finished fetching.
    pub fn cancel_in_flight_reads(&self, fingerprint: &Fingerprint) {
        let mut guard = self.inner.state.lock();
        self.cancel_locked(&mut guard, fingerprint);
    }

    /// Cancel in-flight reads, capture the current entry and apply `f`, as
    /// one unit with respect to every other store operation.
    ///
    /// Returns the entry as it was before `f` ran.
    pub fn begin_optimistic<F>(&self, fingerprint: &Fingerprint, f: F) -> CacheEntry
    where
        F: FnOnce(&CacheEntry) -> CacheEntry,
    {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        self.cancel_locked(state, fingerprint);

        let slot = state.slots.entry(fingerprint.clone()).or_default();
        let previous = slot.entry.clone();
        slot.entry = f(&previous);
        state.stats.transforms += 1;
        self.emit(CacheEvent::Updated {
            fingerprint: fingerprint.clone(),
        });
        previous
    }

    /// Mark the entry stale without scheduling a refetch.
    ///
    /// Reads already in flight are superseded.
    pub fn mark_stale(&self, fingerprint: &Fingerprint) {
        let mut guard = self.inner.state.lock();
        self.mark_stale_locked(&mut guard, fingerprint);
    }

    /// Mark the entry stale and schedule a background refetch.
    ///
    /// Does not wait for the refetch. Without an attached page source, or
    /// outside a tokio runtime, the entry is only marked stale.
    pub fn invalidate(&self, fingerprint: &Fingerprint) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        self.mark_stale_locked(state, fingerprint);

        let Some(source) = self.inner.source.clone() else {
            debug!(
                subject_id = %fingerprint.subject_id(),
                page_size = fingerprint.page_size(),
                "No page source attached, entry left stale"
            );
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                subject_id = %fingerprint.subject_id(),
                "Invalidate called outside a tokio runtime, refetch skipped"
            );
            return;
        };

        let generation = state.freshness.generation(fingerprint);
        let slot = state.slots.entry(fingerprint.clone()).or_default();
        let page_count = slot
            .entry
            .pages
            .len()
            .clamp(1, self.inner.config.max_refetch_pages);

        let store = self.clone();
        let key = fingerprint.clone();
        let (finished, done) = watch::channel(());
        let handle = runtime.spawn(async move {
            let _finished = finished;
            store.run_refetch(source, key, generation, page_count).await;
        });
        slot.refresh = Some(RefreshTask { handle, done });
    }

    /// Re-read the entry from the page source and wait for the result.
    pub async fn refetch_now(&self, fingerprint: &Fingerprint) -> QuillResult<()> {
        let source = self.require_source()?;
        let (generation, page_count) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            self.cancel_locked(state, fingerprint);
            let page_count = state
                .slots
                .get(fingerprint)
                .map_or(1, |slot| slot.entry.pages.len())
                .clamp(1, self.inner.config.max_refetch_pages);
            (state.freshness.generation(fingerprint), page_count)
        };

        let result = load_pages(source.as_ref(), fingerprint, page_count).await;
        match result {
            Ok((entry, next_cursor)) => {
                self.publish_refetch(fingerprint, generation, entry, next_cursor);
                Ok(())
            }
            Err(err) => {
                self.inner.state.lock().stats.refetches_failed += 1;
                Err(err)
            }
        }
    }

    /// Load the page after the last loaded one and append it.
    ///
    /// An empty entry loads its first page. Returns `false` when the source
    /// reported no further page, or when a cancellation superseded the read.
    pub async fn fetch_next_page(&self, fingerprint: &Fingerprint) -> QuillResult<bool> {
        let source = self.require_source()?;
        let (cursor, generation) = {
            let state = self.inner.state.lock();
            let cursor = match state.slots.get(fingerprint) {
                Some(slot) if !slot.entry.is_empty() => match &slot.next_cursor {
                    Some(cursor) => cursor.clone(),
                    None => return Ok(false),
                },
                _ => PageCursor::Initial,
            };
            (cursor, state.freshness.generation(fingerprint))
        };

        let fetched = source.fetch_page(fingerprint, &cursor).await?;

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.freshness.generation(fingerprint) != generation {
            state.stats.refetches_discarded += 1;
            debug!(
                subject_id = %fingerprint.subject_id(),
                "Next page superseded by cancellation, discarding"
            );
            return Ok(false);
        }

        let slot = state.slots.entry(fingerprint.clone()).or_default();
        slot.entry.pages.push(Page::new(fetched.messages));
        slot.entry.page_params.push(cursor);
        slot.next_cursor = fetched.next_cursor;
        let page_count = slot.entry.pages.len();
        self.emit(CacheEvent::PageAppended {
            fingerprint: fingerprint.clone(),
            page_count,
        });
        Ok(true)
    }

    /// Wait until no background refetch is in flight for `fingerprint`.
    pub async fn wait_idle(&self, fingerprint: &Fingerprint) {
        loop {
            let done = self
                .inner
                .state
                .lock()
                .slots
                .get(fingerprint)
                .and_then(|slot| slot.refresh.as_ref())
                .filter(|task| task.is_running())
                .map(|task| task.done.clone());
            let Some(mut done) = done else {
                break;
            };
            // Nothing is ever sent, so this resolves once the task drops
            // its sender. A newer refetch may have replaced it meanwhile.
            let _ = done.changed().await;
            tokio::task::yield_now().await;
        }
    }

    /// Whether the entry has been invalidated and not refreshed since.
    pub fn is_stale(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.state.lock().freshness.is_stale(fingerprint)
    }

    /// Number of invalidations recorded for `fingerprint`.
    pub fn invalidation_count(&self, fingerprint: &Fingerprint) -> u64 {
        self.inner
            .state
            .lock()
            .freshness
            .invalidation_count(fingerprint)
    }

    /// Whether a background refetch task is still running.
    pub fn has_refresh_in_flight(&self, fingerprint: &Fingerprint) -> bool {
        self.inner
            .state
            .lock()
            .slots
            .get(fingerprint)
            .and_then(|slot| slot.refresh.as_ref())
            .is_some_and(RefreshTask::is_running)
    }

    /// Whether invalidation can schedule a refetch.
    pub fn has_page_source(&self) -> bool {
        self.inner.source.is_some()
    }

    /// Fingerprints with a stored entry.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        self.inner.state.lock().slots.keys().cloned().collect()
    }

    /// Snapshot of store counters.
    pub fn statistics(&self) -> CacheStatistics {
        self.inner.state.lock().stats
    }

    /// Subscribe to change events for all fingerprints.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    // ─── Internals ───────────────────────────────────────────

    fn require_source(&self) -> QuillResult<Arc<dyn PageSource>> {
        self.inner
            .source
            .clone()
            .ok_or_else(|| QuillError::not_found("no page source attached to cache store"))
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }

    fn cancel_locked(&self, state: &mut StoreState, fingerprint: &Fingerprint) {
        state.freshness.bump_generation(fingerprint);
        let Some(task) = state
            .slots
            .get_mut(fingerprint)
            .and_then(|slot| slot.refresh.take())
        else {
            return;
        };
        if !task.is_running() {
            return;
        }
        task.handle.abort();
        state.stats.refreshes_cancelled += 1;
        debug!(
            subject_id = %fingerprint.subject_id(),
            page_size = fingerprint.page_size(),
            "Cancelled in-flight refresh"
        );
        self.emit(CacheEvent::RefreshCancelled {
            fingerprint: fingerprint.clone(),
        });
    }

    fn mark_stale_locked(&self, state: &mut StoreState, fingerprint: &Fingerprint) {
        self.cancel_locked(state, fingerprint);
        state.freshness.mark_stale(fingerprint);
        state.stats.invalidations += 1;
        self.emit(CacheEvent::Invalidated {
            fingerprint: fingerprint.clone(),
        });
    }

    async fn run_refetch(
        &self,
        source: Arc<dyn PageSource>,
        fingerprint: Fingerprint,
        generation: u64,
        page_count: usize,
    ) {
        match load_pages(source.as_ref(), &fingerprint, page_count).await {
            Ok((entry, next_cursor)) => {
                self.publish_refetch(&fingerprint, generation, entry, next_cursor);
            }
            Err(err) => {
                self.inner.state.lock().stats.refetches_failed += 1;
                warn!(
                    subject_id = %fingerprint.subject_id(),
                    error = %err,
                    "Background refetch failed, entry stays stale"
                );
            }
        }
    }

    fn publish_refetch(
        &self,
        fingerprint: &Fingerprint,
        generation: u64,
        entry: CacheEntry,
        next_cursor: Option<PageCursor>,
    ) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if !state
            .freshness
            .mark_fresh_if_current(fingerprint, generation)
        {
            state.stats.refetches_discarded += 1;
            debug!(
                subject_id = %fingerprint.subject_id(),
                generation,
                "Discarding superseded refetch result"
            );
            return;
        }

        let slot = state.slots.entry(fingerprint.clone()).or_default();
        slot.entry = entry;
        slot.next_cursor = next_cursor;
        slot.refresh = None;
        state.stats.refetches_applied += 1;
        self.emit(CacheEvent::Refreshed {
            fingerprint: fingerprint.clone(),
        });
    }
}

/// Read `page_count` pages starting at the initial cursor.
async fn load_pages(
    source: &dyn PageSource,
    fingerprint: &Fingerprint,
    page_count: usize,
) -> QuillResult<(CacheEntry, Option<PageCursor>)> {
    let mut entry = CacheEntry::empty();
    let mut cursor = PageCursor::Initial;
    let mut next_cursor = None;

    for _ in 0..page_count {
        let fetched = source.fetch_page(fingerprint, &cursor).await?;
        entry.pages.push(Page::new(fetched.messages));
        entry.page_params.push(cursor);
        next_cursor = fetched.next_cursor;
        match &next_cursor {
            Some(next) => cursor = next.clone(),
            None => break,
        }
    }

    Ok((entry, next_cursor))
}
