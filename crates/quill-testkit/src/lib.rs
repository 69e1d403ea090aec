//! Quill Testing Infrastructure
//!
//! Deterministic implementations of every effect trait the engine consumes,
//! so tests can drive full mutations without a network or wall clock.
//!
//! - [`ScriptedTransport`]: replies from a queue of scripted responses
//! - [`RecordingNotifier`]: collects notifications for assertions
//! - [`FixedClock`]: returns a controllable instant
//! - [`SequentialIds`]: `msg-1`, `msg-2`, ...
//! - [`MemoryPageSource`]: server-side record list served in pages
//!
//! # Blocking Lock Usage
//!
//! Uses `std::sync::Mutex` because this is test infrastructure where lock
//! contention is not a concern and a synchronous API keeps tests readable.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod clock;
pub mod ids;
pub mod notifier;
pub mod page_source;
pub mod transport;

pub use clock::FixedClock;
pub use ids::SequentialIds;
pub use notifier::RecordingNotifier;
pub use page_source::MemoryPageSource;
pub use transport::{ChunkFeeder, ScriptedResponse, ScriptedTransport};

use chrono::{DateTime, TimeZone, Utc};
use quill_core::Record;

/// `secs` seconds after the Unix epoch.
pub fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

/// Server-side record authored by someone else.
pub fn server_record(id: &str, text: &str, secs: i64) -> Record {
    Record {
        id: id.into(),
        created_at: timestamp(secs),
        text: text.to_string(),
        is_own_message: false,
    }
}
