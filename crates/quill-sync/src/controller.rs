//! Mutation controller: drives [`transition`] against real effects.
//!
//! The controller owns the composer state (`pending_text`, `busy`), the
//! rollback snapshot and the stream merger for one fingerprint. Every
//! external event is fed through the pure state machine; the effects it
//! returns are executed here, in order, before the next event is read.
//!
//! # Concurrency
//!
//! One mutation per controller may be in flight. Calling [`submit`] again
//! before the previous call returned is unsupported: the caller is expected
//! to disable submission while [`busy`] is true. The controller logs a
//! warning but neither queues nor rejects the second call.
//!
//! Dropping the future returned by [`submit`] before it completes aborts
//! the mutation: the drop runs the failure path (rollback, notification)
//! and then settles.
//!
//! [`submit`]: MutationController::submit
//! [`busy`]: MutationController::busy

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use quill_cache::CacheStore;
use quill_core::{
    ByteStream, Clock, EngineConfig, Fingerprint, IdGenerator, MessageTransport, Notification,
    Notifier, Observable, QuillError, RecordId, SubmitPayload, SystemClock, TracingNotifier,
    UuidGenerator,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::decoder::Utf8StreamDecoder;
use crate::machine::{
    transition, MutationEffect, MutationEvent, MutationOutcome, MutationPhase, MutationState,
};
use crate::merger::StreamMerger;
use crate::rollback::RollbackManager;

// ============================================================================
// Composer State
// ============================================================================

/// What the input surface observes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposerState {
    /// Text currently in the input
    pub pending_text: String,
    /// Whether a submission is in flight
    pub busy: bool,
}

/// Controller tunables taken from [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Invalidate (and refetch) on settle; otherwise only mark stale
    pub refetch_on_settle: bool,
    /// Failure notification headline
    pub failure_title: String,
    /// Failure notification body
    pub failure_description: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ControllerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            refetch_on_settle: config.refetch_on_settle,
            failure_title: config.failure_title.clone(),
            failure_description: config.failure_description.clone(),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`MutationController`].
pub struct MutationControllerBuilder {
    store: CacheStore,
    fingerprint: Fingerprint,
    transport: Arc<dyn MessageTransport>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: ControllerConfig,
}

impl MutationControllerBuilder {
    /// Notification sink for failures. Defaults to logging only.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Time source for record timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Identifier source for optimistic records.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Controller tunables.
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the controller.
    pub fn build(self) -> MutationController {
        let rollback = RollbackManager::new(self.store.clone(), self.fingerprint.clone());
        let merger = StreamMerger::new(
            self.store.clone(),
            self.fingerprint.clone(),
            self.clock.clone(),
        );
        MutationController {
            fingerprint: self.fingerprint,
            store: self.store,
            transport: self.transport,
            notifier: self.notifier,
            clock: self.clock,
            ids: self.ids,
            config: self.config,
            composer: Observable::default(),
            phase: Observable::default(),
            machine: Mutex::new(MutationState::default()),
            rollback: Mutex::new(rollback),
            merger: Mutex::new(merger),
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Orchestrates optimistic submissions for one fingerprint.
pub struct MutationController {
    fingerprint: Fingerprint,
    store: CacheStore,
    transport: Arc<dyn MessageTransport>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: ControllerConfig,
    composer: Observable<ComposerState>,
    phase: Observable<MutationPhase>,
    machine: Mutex<MutationState>,
    rollback: Mutex<RollbackManager>,
    merger: Mutex<StreamMerger>,
}

impl std::fmt::Debug for MutationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationController")
            .field("fingerprint", &self.fingerprint)
            .field("phase", &self.phase.get())
            .field("composer", &self.composer.get())
            .finish()
    }
}

impl MutationController {
    /// Start building a controller with production defaults for the
    /// notifier, clock and id generator.
    pub fn builder(
        store: CacheStore,
        fingerprint: Fingerprint,
        transport: Arc<dyn MessageTransport>,
    ) -> MutationControllerBuilder {
        MutationControllerBuilder {
            store,
            fingerprint,
            transport,
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            config: ControllerConfig::default(),
        }
    }

    /// The fingerprint this controller writes to.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The cache store this controller writes to.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Replace the composer text.
    pub fn update_pending_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.composer.update(|c| c.pending_text = text);
    }

    /// Current composer text.
    pub fn pending_text(&self) -> String {
        self.composer.with(|c| c.pending_text.clone())
    }

    /// Whether a submission is in flight.
    pub fn busy(&self) -> bool {
        self.composer.with(|c| c.busy)
    }

    /// Current composer state.
    pub fn composer_state(&self) -> ComposerState {
        self.composer.get()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> MutationPhase {
        self.phase.get()
    }

    /// Subscribe to composer changes.
    pub fn subscribe(&self) -> watch::Receiver<ComposerState> {
        self.composer.subscribe()
    }

    /// Subscribe to phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<MutationPhase> {
        self.phase.subscribe()
    }

    /// How many times a snapshot has been restored over this controller's
    /// lifetime.
    pub fn rollback_count(&self) -> u64 {
        self.rollback.lock().restore_count()
    }

    /// Submit the current composer text.
    ///
    /// Never returns an error: every failure is turned into a rollback, a
    /// notification and [`MutationOutcome::Failed`]. The entry is always
    /// invalidated before this returns.
    pub async fn submit(&self) -> MutationOutcome {
        let text = self.pending_text();
        let mutation_id = self.ids.next_id();

        if self.phase().is_in_flight() {
            warn!(
                subject_id = %self.fingerprint.subject_id(),
                mutation_id = %mutation_id,
                "Submit while another mutation is in flight"
            );
        }

        let mut guard = InFlight {
            controller: self,
            mutation_id: mutation_id.clone(),
            settled: false,
        };

        let dispatch = self.step(
            &mutation_id,
            MutationEvent::Submit {
                text,
                record_id: mutation_id.clone(),
                created_at: self.clock.now(),
            },
        );

        if let Some(text) = dispatch {
            let payload = SubmitPayload {
                subject_id: self.fingerprint.subject_id().to_string(),
                text,
            };
            match self.transport.submit(payload).await {
                Ok(response) => {
                    self.step(
                        &mutation_id,
                        MutationEvent::ResponseReceived {
                            has_body: response.has_body(),
                        },
                    );
                    if let Some(body) = response.into_body() {
                        self.drain(&mutation_id, body).await;
                    }
                }
                Err(err) => {
                    self.step(&mutation_id, MutationEvent::DispatchFailed(err));
                }
            }
        }

        guard.settle();
        self.outcome()
    }

    async fn drain(&self, mutation_id: &RecordId, mut body: ByteStream) {
        let mut decoder = Utf8StreamDecoder::new();
        while let Some(chunk) = body.next().await {
            let decoded = chunk
                .map_err(as_stream_failure)
                .and_then(|bytes| decoder.decode(&bytes));
            match decoded {
                Ok(text) => {
                    self.step(mutation_id, MutationEvent::Increment(text));
                }
                Err(err) => {
                    self.step(mutation_id, MutationEvent::StreamFailed(err));
                    return;
                }
            }
        }
        let event = match decoder.finish() {
            Ok(()) => MutationEvent::StreamCompleted,
            Err(err) => MutationEvent::StreamFailed(err),
        };
        self.step(mutation_id, event);
    }

    fn outcome(&self) -> MutationOutcome {
        self.machine
            .lock()
            .outcome
            .clone()
            .unwrap_or_else(|| MutationOutcome::Failed {
                error: QuillError::internal("mutation did not reach a terminal phase"),
            })
    }

    /// Feed one event through the state machine and run its effects.
    ///
    /// Returns the text to dispatch when the transition asked for it.
    fn step(&self, mutation_id: &RecordId, event: MutationEvent) -> Option<String> {
        let (from, to, effects) = {
            let mut machine = self.machine.lock();
            let from = machine.phase;
            let (next, effects) = transition(&machine, event);
            let to = next.phase;
            *machine = next;
            (from, to, effects)
        };

        if from != to {
            self.phase.set(to);
            debug!(
                subject_id = %self.fingerprint.subject_id(),
                page_size = self.fingerprint.page_size(),
                mutation_id = %mutation_id,
                from = %from,
                phase = %to,
                "Mutation phase transition"
            );
        }

        let mut dispatch = None;
        for effect in effects {
            if let Some(text) = self.execute(mutation_id, effect) {
                dispatch = Some(text);
            }
        }

        if from != to && to == MutationPhase::Settled {
            info!(
                subject_id = %self.fingerprint.subject_id(),
                page_size = self.fingerprint.page_size(),
                mutation_id = %mutation_id,
                from = %from,
                folds = self.merger.lock().fold_count(),
                "Mutation settled"
            );
        }
        dispatch
    }

    fn execute(&self, mutation_id: &RecordId, effect: MutationEffect) -> Option<String> {
        match effect {
            MutationEffect::ClearInput => {
                self.composer.update(|c| c.pending_text.clear());
            }
            MutationEffect::BeginOptimistic { record, input } => {
                self.rollback
                    .lock()
                    .begin(input, move |entry| entry.with_prepended(record));
            }
            MutationEffect::SetBusy(busy) => {
                self.composer.update(|c| c.busy = busy);
            }
            MutationEffect::Dispatch { text } => return Some(text),
            MutationEffect::FoldResponse { accumulated } => {
                self.merger.lock().fold(&accumulated);
            }
            MutationEffect::RestoreSnapshot => {
                let restored = self.rollback.lock().restore();
                if let Some(input) = restored {
                    self.composer.update(|c| c.pending_text = input);
                }
            }
            MutationEffect::Notify(error) => {
                let severity = error.category().toast_severity();
                warn!(
                    subject_id = %self.fingerprint.subject_id(),
                    mutation_id = %mutation_id,
                    error = %error,
                    category = %error.category(),
                    "Mutation failed"
                );
                self.notifier.notify(Notification::new(
                    self.config.failure_title.clone(),
                    self.config.failure_description.clone(),
                    severity,
                ));
            }
            MutationEffect::DiscardSnapshot => {
                self.rollback.lock().discard();
                if !self.refetches_on_settle() {
                    self.keep_settled_reply(mutation_id);
                }
            }
            MutationEffect::Invalidate => {
                if self.config.refetch_on_settle {
                    self.store.invalidate(&self.fingerprint);
                } else {
                    self.store.mark_stale(&self.fingerprint);
                }
            }
        }
        None
    }

    fn refetches_on_settle(&self) -> bool {
        self.config.refetch_on_settle && self.store.has_page_source()
    }

    /// Move the finished reply off the reserved id so the next mutation
    /// starts a fresh pending-response record above its own message.
    fn keep_settled_reply(&self, mutation_id: &RecordId) {
        if self.store.read(&self.fingerprint).pending_response().is_none() {
            return;
        }
        let id = RecordId::new(format!("{mutation_id}-reply"));
        debug!(
            subject_id = %self.fingerprint.subject_id(),
            reply_id = %id,
            "Keeping finished reply without refetch"
        );
        self.store
            .transform(&self.fingerprint, |entry| entry.with_settled_response(id));
    }
}

/// Runs the abort path if a submit is dropped before it settles.
struct InFlight<'a> {
    controller: &'a MutationController,
    mutation_id: RecordId,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(&mut self) {
        self.settled = true;
        self.controller
            .step(&self.mutation_id, MutationEvent::Settle);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.controller.step(
            &self.mutation_id,
            MutationEvent::Aborted(QuillError::transport("submission dropped before completion")),
        );
        self.settle();
    }
}

/// Errors raised while pulling chunks are read failures whatever their
/// origin.
fn as_stream_failure(err: QuillError) -> QuillError {
    if err.is_stream_failure() {
        err
    } else {
        QuillError::stream_read(err.to_string())
    }
}
