//! Quill Sync - Optimistic Mutation Engine
//!
//! Reconciles an optimistic write to the paginated cache with a reply that
//! arrives as a byte stream.
//!
//! # Lifecycle
//!
//! ```text
//! submit ─▶ cancel reads ─▶ snapshot ─▶ optimistic prepend ─▶ dispatch
//!                                                              │
//!                 ┌──────── stream increments folded ◀─────────┤
//!                 ▼                                            ▼
//!            Succeeded                                 Failed (rollback + notify)
//!                 └──────────────▶ Settled ◀───────────────────┘
//!                                  (invalidate)
//! ```
//!
//! - [`machine`]: the lifecycle as a pure `(state, event) -> (state, effects)`
//! - [`controller`]: runs the machine against the cache and transport
//! - [`merger`]: stream increments folded into the pending-response record
//! - [`rollback`]: snapshot and verbatim restore
//! - [`decoder`]: incremental UTF-8 decoding across chunk boundaries

#![forbid(unsafe_code)]

pub mod controller;
pub mod decoder;
pub mod machine;
pub mod merger;
pub mod rollback;

pub use controller::{ComposerState, ControllerConfig, MutationController, MutationControllerBuilder};
pub use decoder::Utf8StreamDecoder;
pub use machine::{
    transition, MutationEffect, MutationEvent, MutationOutcome, MutationPhase, MutationState,
};
pub use merger::{accumulate, fold_pending_response, StreamMerger};
pub use rollback::{RollbackManager, Snapshot};
