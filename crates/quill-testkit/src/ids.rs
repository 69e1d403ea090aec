//! Predictable record ids.

use quill_core::{IdGenerator, RecordId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Generates `msg-1`, `msg-2`, ... in call order.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Start at `msg-1`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> RecordId {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        RecordId::new(format!("msg-{n}"))
    }
}
