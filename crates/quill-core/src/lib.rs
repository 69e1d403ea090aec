//! Quill Core - Optimistic Sync Foundation
//!
//! This crate provides the data model, error taxonomy and effect interfaces
//! shared by the Quill optimistic synchronization engine. It contains no
//! scheduling or storage logic of its own.
//!
//! # Layers
//!
//! ## Data Model
//! - `Record`, `Page`, `CacheEntry`: the paginated conversation cache
//! - `Fingerprint`: the cache key (`subject_id`, `page_size`)
//! - `PageCursor`: opaque pagination cursor
//!
//! ## Effect Interfaces
//! - `MessageTransport`: dispatches a submission and returns a byte stream
//! - `Notifier`: side-channel failure notifications
//! - `Clock`, `IdGenerator`: injected time and identity sources
//! - `PageSource`: authoritative page reads used for refetch
//!
//! ## Ambient
//! - `QuillError` / `ErrorCategory`: unified error handling
//! - `EngineConfig`: TOML + environment configuration
//! - `Observable`: watch-backed reactive value for UI subscribers

#![forbid(unsafe_code)]

/// Paginated cache data model
pub mod model;

/// Unified error handling
pub mod errors;

/// Pure effect interfaces (no transport implementations)
pub mod effects;

/// Engine configuration loading and validation
pub mod config;

/// Observable values for reactive consumers
pub mod reactive;

pub use config::{ConfigDefaults, ConfigValidation, EngineConfig};
pub use effects::{
    ByteStream, Clock, FetchedPage, IdGenerator, MessageTransport, Notification, Notifier,
    PageSource, SubmitPayload, SubmitResponse, SystemClock, ToastLevel, TracingNotifier,
    UuidGenerator,
};
pub use errors::{ErrorCategory, QuillError, QuillResult};
pub use model::{
    CacheEntry, Fingerprint, Page, PageCursor, Record, RecordId, PENDING_RESPONSE_ID,
};
pub use reactive::Observable;
