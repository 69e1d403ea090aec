//! Quill Cache: Paginated Cache Store
//!
//! A process-wide keyed store mapping a [`Fingerprint`] to a [`CacheEntry`].
//! Every write is a pure transform of the current value applied under the
//! store lock, so concurrent transforms on one fingerprint are applied in
//! submission order and partial writes are never observable.
//!
//! # Refresh model
//!
//! ```text
//! invalidate(fp) ── mark stale ── spawn refetch(gen = g)
//!                                     │
//! cancel_in_flight_reads(fp) ─ gen++ ─┤ (abort task)
//!                                     ▼
//!                          apply only if gen == g
//! ```
//!
//! A refetch that started before a cancellation can therefore never
//! overwrite an optimistic write made after it.
//!
//! [`Fingerprint`]: quill_core::Fingerprint
//! [`CacheEntry`]: quill_core::CacheEntry

#![forbid(unsafe_code)]

pub mod events;
pub mod freshness;
pub mod store;

pub use events::{CacheEvent, CacheStatistics};
pub use freshness::FreshnessTracker;
pub use store::{CacheStore, CacheStoreBuilder, StoreConfig};
