//! Mutation lifecycle as a pure state machine.
//!
//! ```text
//! Idle ──Submit──▶ Submitting ──ResponseReceived(body)──▶ Streaming ──StreamCompleted──▶ Succeeded
//!                      │                                      │                              │
//!                      ├──DispatchFailed / no body──▶ Failed ◀┴──StreamFailed / Aborted       │
//!                      │                                │                                      │
//!                      └──Aborted──────────────────────▶┘──Settle──▶ Settled ◀──Settle────────┘
//! ```
//!
//! [`transition`] never performs I/O. It returns the next state plus the
//! effects the controller must run, in order. Events that do not apply to
//! the current phase leave the state untouched and produce no effects,
//! which is what makes rollback, notification and settle happen at most
//! once per mutation.

use chrono::{DateTime, Utc};
use quill_core::{QuillError, Record, RecordId};
use serde::{Deserialize, Serialize};

use crate::merger::accumulate;

/// Where a mutation is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    /// No mutation has started yet
    #[default]
    Idle,
    /// Request dispatched, response not yet received
    Submitting,
    /// Reading the response body
    Streaming,
    /// Stream ended without error
    Succeeded,
    /// Dispatch or stream failed; rollback has run
    Failed,
    /// Terminal phase reached and authoritative refresh scheduled
    Settled,
}

impl MutationPhase {
    /// Whether a request is outstanding.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Submitting | Self::Streaming)
    }

    /// Whether the mutation finished but has not settled yet.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Streaming => "streaming",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Settled => "settled",
        }
    }
}

impl std::fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Final result of a submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The response stream completed
    Succeeded {
        /// Full decoded response text
        response_text: String,
    },
    /// The mutation was rolled back
    Failed {
        /// What went wrong
        error: QuillError,
    },
}

impl MutationOutcome {
    /// Whether the mutation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// Start a mutation for `text`
    Submit {
        /// The composer text captured at submit time
        text: String,
        /// Id for the optimistic record
        record_id: RecordId,
        /// Creation time for the optimistic record
        created_at: DateTime<Utc>,
    },
    /// The transport answered
    ResponseReceived {
        /// Whether the response carries a body stream
        has_body: bool,
    },
    /// The transport could not dispatch the request
    DispatchFailed(QuillError),
    /// Newly decoded response text
    Increment(String),
    /// The body stream ended cleanly
    StreamCompleted,
    /// Reading or decoding the body failed
    StreamFailed(QuillError),
    /// The submit was dropped before it finished
    Aborted(QuillError),
    /// Finish the mutation
    Settle,
}

/// Side effects requested by a transition, run in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEffect {
    /// Clear the composer input
    ClearInput,
    /// Cancel in-flight reads, snapshot the entry and prepend `record`,
    /// remembering `input` for restore
    BeginOptimistic {
        /// The optimistic own-message record
        record: Record,
        /// Input text to restore on failure
        input: String,
    },
    /// Publish the busy flag
    SetBusy(bool),
    /// Send `text` through the transport
    Dispatch {
        /// The submitted text
        text: String,
    },
    /// Write the accumulated response into the pending-response record
    FoldResponse {
        /// Full response text received so far
        accumulated: String,
    },
    /// Restore the cache entry and composer input from the snapshot
    RestoreSnapshot,
    /// Emit exactly one failure notification
    Notify(QuillError),
    /// Drop the snapshot without restoring it
    DiscardSnapshot,
    /// Request an authoritative refresh of the entry
    Invalidate,
}

/// State carried between events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationState {
    /// Current phase
    pub phase: MutationPhase,
    /// Whether a submission is in flight
    pub busy: bool,
    /// Response text received so far
    pub accumulated: String,
    /// Result once the mutation reached a terminal phase
    pub outcome: Option<MutationOutcome>,
}

/// Advance `state` by `event`.
pub fn transition(
    state: &MutationState,
    event: MutationEvent,
) -> (MutationState, Vec<MutationEffect>) {
    use MutationEffect as Fx;
    use MutationPhase as P;

    match (state.phase, event) {
        (
            _,
            MutationEvent::Submit {
                text,
                record_id,
                created_at,
            },
        ) => {
            let next = MutationState {
                phase: P::Submitting,
                busy: true,
                accumulated: String::new(),
                outcome: None,
            };
            let record = Record::own(record_id, text.clone(), created_at);
            let effects = vec![
                Fx::ClearInput,
                Fx::BeginOptimistic {
                    record,
                    input: text.clone(),
                },
                Fx::SetBusy(true),
                Fx::Dispatch { text },
            ];
            (next, effects)
        }

        (P::Submitting, MutationEvent::ResponseReceived { has_body: true }) => (
            MutationState {
                phase: P::Streaming,
                ..state.clone()
            },
            Vec::new(),
        ),

        (P::Submitting, MutationEvent::ResponseReceived { has_body: false }) => {
            fail(state, QuillError::transport("response arrived without a body"))
        }

        (P::Submitting, MutationEvent::DispatchFailed(error)) => fail(state, error),

        (P::Streaming, MutationEvent::Increment(increment)) => {
            if increment.is_empty() {
                return (state.clone(), Vec::new());
            }
            let accumulated = accumulate(&state.accumulated, &increment);
            let next = MutationState {
                accumulated: accumulated.clone(),
                ..state.clone()
            };
            (next, vec![Fx::FoldResponse { accumulated }])
        }

        (P::Streaming, MutationEvent::StreamCompleted) => {
            let next = MutationState {
                phase: P::Succeeded,
                busy: false,
                outcome: Some(MutationOutcome::Succeeded {
                    response_text: state.accumulated.clone(),
                }),
                ..state.clone()
            };
            (next, vec![Fx::SetBusy(false)])
        }

        (P::Streaming, MutationEvent::StreamFailed(error)) => fail(state, error),

        (P::Submitting | P::Streaming, MutationEvent::Aborted(error)) => fail(state, error),

        (P::Succeeded | P::Failed, MutationEvent::Settle) => {
            let mut effects = Vec::new();
            if state.phase == P::Succeeded {
                effects.push(Fx::DiscardSnapshot);
            }
            effects.push(Fx::SetBusy(false));
            effects.push(Fx::Invalidate);
            let next = MutationState {
                phase: P::Settled,
                busy: false,
                ..state.clone()
            };
            (next, effects)
        }

        // Does not apply in this phase.
        _ => (state.clone(), Vec::new()),
    }
}

fn fail(state: &MutationState, error: QuillError) -> (MutationState, Vec<MutationEffect>) {
    let next = MutationState {
        phase: MutationPhase::Failed,
        busy: false,
        outcome: Some(MutationOutcome::Failed {
            error: error.clone(),
        }),
        ..state.clone()
    };
    let effects = vec![
        MutationEffect::RestoreSnapshot,
        MutationEffect::SetBusy(false),
        MutationEffect::Notify(error),
    ];
    (next, effects)
}
