//! In-memory authoritative page source.
//!
//! Records are kept per subject, newest first, and served in pages of the
//! fingerprint's page size. Cursors are offsets into that list. A gate lets
//! tests hold fetches in flight to exercise cancellation.

use async_trait::async_trait;
use quill_core::{
    FetchedPage, Fingerprint, PageCursor, PageSource, QuillError, QuillResult, Record,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug, Default)]
struct SourceState {
    records: HashMap<String, Vec<Record>>,
    failing: bool,
    fetches: usize,
}

/// Server-side record store answering page reads.
#[derive(Debug)]
pub struct MemoryPageSource {
    state: Mutex<SourceState>,
    gate: watch::Sender<bool>,
}

impl Default for MemoryPageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPageSource {
    /// Empty source with the gate open.
    pub fn new() -> Self {
        let (gate, _rx) = watch::channel(true);
        Self {
            state: Mutex::new(SourceState::default()),
            gate,
        }
    }

    /// Replace the records of `subject_id` (newest first).
    pub fn set_messages(&self, subject_id: &str, records: Vec<Record>) {
        self.state
            .lock()
            .unwrap()
            .records
            .insert(subject_id.to_string(), records);
    }

    /// Add `record` as the newest record of `subject_id`.
    pub fn push_newest(&self, subject_id: &str, record: Record) {
        self.state
            .lock()
            .unwrap()
            .records
            .entry(subject_id.to_string())
            .or_default()
            .insert(0, record);
    }

    /// Make every fetch fail until turned off.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Hold fetches before they read until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let held and future fetches proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Number of fetches started so far, held ones included.
    pub fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetches
    }
}

#[async_trait]
impl PageSource for MemoryPageSource {
    async fn fetch_page(
        &self,
        fingerprint: &Fingerprint,
        cursor: &PageCursor,
    ) -> QuillResult<FetchedPage> {
        self.state.lock().unwrap().fetches += 1;

        let mut gate = self.gate.subscribe();
        loop {
            let open = *gate.borrow_and_update();
            if open || gate.changed().await.is_err() {
                break;
            }
        }

        let state = self.state.lock().unwrap();
        if state.failing {
            return Err(QuillError::transport("page source unavailable"));
        }

        let offset = match cursor {
            PageCursor::Initial => 0,
            PageCursor::After(token) => token
                .parse::<usize>()
                .map_err(|_| QuillError::invalid(format!("bad cursor '{token}'")))?,
        };
        let records = state
            .records
            .get(fingerprint.subject_id())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let end = (offset + fingerprint.page_size() as usize).min(records.len());
        let messages = records.get(offset..end).unwrap_or_default().to_vec();
        let next_cursor = (end < records.len()).then(|| PageCursor::After(end.to_string()));

        Ok(FetchedPage {
            messages,
            next_cursor,
        })
    }
}
