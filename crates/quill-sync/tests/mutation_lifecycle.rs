//! End-to-end mutation lifecycle against scripted effects.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use quill_cache::CacheStore;
use quill_core::{CacheEntry, Fingerprint, QuillError, ToastLevel};
use quill_sync::{
    ComposerState, ControllerConfig, MutationController, MutationOutcome, MutationPhase,
};
use quill_testkit::{
    server_record, FixedClock, MemoryPageSource, RecordingNotifier, ScriptedResponse,
    ScriptedTransport, SequentialIds,
};

struct Harness {
    fp: Fingerprint,
    store: CacheStore,
    transport: Arc<ScriptedTransport>,
    notifier: Arc<RecordingNotifier>,
    controller: Arc<MutationController>,
}

fn harness_with(store: CacheStore, config: ControllerConfig) -> Harness {
    let fp = Fingerprint::new("f1", 10).unwrap();
    let transport = Arc::new(ScriptedTransport::default());
    let notifier = Arc::new(RecordingNotifier::new());
    let controller = MutationController::builder(store.clone(), fp.clone(), transport.clone())
        .notifier(notifier.clone())
        .clock(Arc::new(FixedClock::default()))
        .id_generator(Arc::new(SequentialIds::new()))
        .config(config)
        .build();
    Harness {
        fp,
        store,
        transport,
        notifier,
        controller: Arc::new(controller),
    }
}

fn harness() -> Harness {
    harness_with(CacheStore::new(), ControllerConfig::default())
}

fn seeded_entry() -> CacheEntry {
    CacheEntry::from_messages(vec![
        server_record("s2", "how are you", 2),
        server_record("s1", "hello there", 1),
    ])
}

/// Wait until the pending-response record shows `text`.
async fn until_pending_text(store: &CacheStore, fp: &Fingerprint, text: &str) {
    let wait = async {
        loop {
            let current = store.read(fp).pending_response().map(|r| r.text.clone());
            if current.as_deref() == Some(text) {
                break;
            }
            tokio::task::yield_now().await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap();
}

// ============================================================================
// Optimistic insert
// ============================================================================

#[tokio::test]
async fn optimistic_record_is_visible_before_dispatch() {
    let h = harness();
    h.transport.push(ScriptedResponse::text(&["ok"]));

    let seen = Arc::new(Mutex::new(None));
    {
        let seen = seen.clone();
        let store = h.store.clone();
        let fp = h.fp.clone();
        let composer = h.controller.subscribe();
        h.transport.on_dispatch(move |_| {
            *seen.lock().unwrap() = Some((store.read(&fp), composer.borrow().clone()));
        });
    }

    h.controller.update_pending_text("hi");
    h.controller.submit().await;

    let (entry, composer) = seen.lock().unwrap().take().unwrap();
    let first = &entry.pages[0].messages[0];
    assert_eq!(first.text, "hi");
    assert_eq!(first.id.as_str(), "msg-1");
    assert!(first.is_own_message);
    // input cleared and busy set before the request leaves
    assert_eq!(composer.pending_text, "");
    assert!(composer.busy);

    let payload = &h.transport.payloads()[0];
    assert_eq!(payload.subject_id, "f1");
    assert_eq!(payload.text, "hi");
}

#[tokio::test]
async fn submit_on_empty_cache_creates_first_page() {
    let h = harness();
    h.transport.push(ScriptedResponse::text(&[]));
    h.controller.update_pending_text("hi");

    let outcome = h.controller.submit().await;

    assert_eq!(
        outcome,
        MutationOutcome::Succeeded {
            response_text: String::new()
        }
    );
    let entry = h.store.read(&h.fp);
    assert_eq!(entry.pages[0].messages[0].text, "hi");
    assert!(entry.pages[0].messages[0].is_own_message);
    // an empty stream never creates a pending-response record
    assert_eq!(entry.pending_response_count(), 0);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn pending_response_progresses_with_each_chunk() {
    let h = harness();
    let (response, feeder) = ScriptedResponse::channel();
    h.transport.push(response);
    h.controller.update_pending_text("hi");

    let controller = h.controller.clone();
    let submit = tokio::spawn(async move { controller.submit().await });

    feeder.send_text("Hel");
    until_pending_text(&h.store, &h.fp, "Hel").await;
    assert_eq!(h.controller.phase(), MutationPhase::Streaming);
    assert!(h.controller.busy());

    feeder.send_text("lo!");
    until_pending_text(&h.store, &h.fp, "Hello!").await;
    assert_eq!(h.store.read(&h.fp).pending_response_count(), 1);
    feeder.finish();

    let outcome = submit.await.unwrap();
    assert_eq!(
        outcome,
        MutationOutcome::Succeeded {
            response_text: "Hello!".into()
        }
    );

    // no refetch follows, so the finished reply leaves the reserved id
    let entry = h.store.read(&h.fp);
    assert_eq!(entry.pending_response_count(), 0);
    assert_eq!(entry.pages[0].messages[0].id.as_str(), "msg-1-reply");
    assert_eq!(entry.pages[0].messages[0].text, "Hello!");
    assert!(!entry.pages[0].messages[0].is_own_message);
    assert_eq!(entry.pages[0].messages[1].text, "hi");
    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test]
async fn multibyte_character_split_across_chunks() {
    let h = harness();
    h.transport.push(ScriptedResponse::bytes(vec![
        b"caf\xC3".to_vec(),
        b"\xA9 \xF0\x9F".to_vec(),
        b"\xA6\x80".to_vec(),
    ]));
    h.controller.update_pending_text("order");

    let outcome = h.controller.submit().await;
    assert_eq!(
        outcome,
        MutationOutcome::Succeeded {
            response_text: "café 🦀".into()
        }
    );
}

// ============================================================================
// Failure and rollback
// ============================================================================

#[tokio::test]
async fn stream_failure_restores_snapshot_and_input() {
    let h = harness();
    h.store.transform(&h.fp, |_| seeded_entry());
    let (response, feeder) = ScriptedResponse::channel();
    h.transport.push(response);
    h.controller.update_pending_text("hi");

    let controller = h.controller.clone();
    let submit = tokio::spawn(async move { controller.submit().await });

    feeder.send_text("Hel");
    until_pending_text(&h.store, &h.fp, "Hel").await;
    feeder.fail(QuillError::stream_read("connection reset"));

    let outcome = submit.await.unwrap();
    assert_matches!(outcome, MutationOutcome::Failed { error: QuillError::StreamRead { .. } });

    assert_eq!(h.store.read(&h.fp), seeded_entry());
    assert_eq!(h.controller.pending_text(), "hi");
    assert!(!h.controller.busy());
    assert_eq!(h.controller.rollback_count(), 1);

    let notifications = h.notifier.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Something went wrong");
    assert_eq!(notifications[0].severity, ToastLevel::Error);
}

#[tokio::test]
async fn missing_body_rolls_back_once() {
    let h = harness();
    h.transport.push(ScriptedResponse::NoBody);
    h.controller.update_pending_text("hi");

    let outcome = h.controller.submit().await;

    assert_matches!(outcome, MutationOutcome::Failed { error: QuillError::Transport { .. } });
    assert_eq!(h.notifier.count(), 1);
    assert_eq!(h.controller.rollback_count(), 1);
    assert!(h.store.read(&h.fp).is_empty());
    assert_eq!(h.controller.pending_text(), "hi");
}

#[tokio::test]
async fn dispatch_error_rolls_back() {
    let h = harness();
    h.store.transform(&h.fp, |_| seeded_entry());
    h.transport
        .push(ScriptedResponse::Fail(QuillError::transport("connection refused")));
    h.controller.update_pending_text("hi");

    let outcome = h.controller.submit().await;

    assert_eq!(
        outcome,
        MutationOutcome::Failed {
            error: QuillError::transport("connection refused")
        }
    );
    assert_eq!(h.store.read(&h.fp), seeded_entry());
    assert_eq!(h.notifier.count(), 1);
    assert_eq!(h.controller.pending_text(), "hi");
}

#[tokio::test]
async fn invalid_utf8_is_a_stream_failure() {
    let h = harness();
    h.transport
        .push(ScriptedResponse::bytes(vec![b"ok ".to_vec(), vec![0xFF, 0xFE]]));
    h.controller.update_pending_text("hi");

    let outcome = h.controller.submit().await;

    assert_matches!(outcome, MutationOutcome::Failed { error } => {
        assert!(error.is_stream_failure());
        assert_matches!(error, QuillError::Decode { .. });
    });
    assert!(h.store.read(&h.fp).is_empty());
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn truncated_character_at_end_of_stream_fails() {
    let h = harness();
    h.transport
        .push(ScriptedResponse::bytes(vec![b"ok".to_vec(), vec![0xE2, 0x82]]));
    h.controller.update_pending_text("hi");

    let outcome = h.controller.submit().await;
    assert_matches!(outcome, MutationOutcome::Failed { error: QuillError::Decode { .. } });
    assert_eq!(h.controller.rollback_count(), 1);
}

#[tokio::test]
async fn transport_error_inside_stream_is_reported_as_read_failure() {
    let h = harness();
    h.transport.push(ScriptedResponse::text_then_error(
        &["Hel"],
        QuillError::transport("peer went away"),
    ));
    h.controller.update_pending_text("hi");

    let outcome = h.controller.submit().await;
    assert_matches!(outcome, MutationOutcome::Failed { error: QuillError::StreamRead { .. } });
}

#[tokio::test]
async fn dropped_submit_rolls_back_and_settles() {
    let h = harness();
    h.store.transform(&h.fp, |_| seeded_entry());
    let (response, feeder) = ScriptedResponse::channel();
    h.transport.push(response);
    h.controller.update_pending_text("hi");

    let controller = h.controller.clone();
    let submit = tokio::spawn(async move { controller.submit().await });

    feeder.send_text("Hel");
    until_pending_text(&h.store, &h.fp, "Hel").await;

    submit.abort();
    assert!(submit.await.unwrap_err().is_cancelled());

    assert_eq!(h.store.read(&h.fp), seeded_entry());
    assert_eq!(h.controller.pending_text(), "hi");
    assert_eq!(h.controller.phase(), MutationPhase::Settled);
    assert!(!h.controller.busy());
    assert_eq!(h.notifier.count(), 1);
    assert_eq!(h.store.invalidation_count(&h.fp), 1);
}

// ============================================================================
// Settle
// ============================================================================

#[tokio::test]
async fn every_outcome_invalidates_exactly_once() {
    let responses = [
        ScriptedResponse::text(&["fine"]),
        ScriptedResponse::NoBody,
        ScriptedResponse::Fail(QuillError::transport("refused")),
        ScriptedResponse::text_then_error(&["par"], QuillError::stream_read("reset")),
    ];

    for response in responses {
        let h = harness();
        h.transport.push(response);
        h.controller.update_pending_text("hi");

        h.controller.submit().await;

        assert_eq!(h.store.invalidation_count(&h.fp), 1);
        assert!(h.store.is_stale(&h.fp));
        assert!(!h.controller.busy());
        assert_eq!(h.controller.phase(), MutationPhase::Settled);
    }
}

#[tokio::test]
async fn settle_refetch_replaces_optimistic_state() {
    let source = Arc::new(MemoryPageSource::new());
    source.set_messages("f1", vec![server_record("s1", "hello there", 1)]);
    let store = CacheStore::builder().page_source(source.clone()).build();
    let h = harness_with(store, ControllerConfig::default());
    h.store.refetch_now(&h.fp).await.unwrap();

    // the server stores the message and its reply when the request lands
    {
        let source = source.clone();
        h.transport.on_dispatch(move |payload| {
            source.push_newest("f1", server_record("srv-q", &payload.text, 10));
            source.push_newest("f1", server_record("srv-a", "Hello!", 11));
        });
    }
    h.transport.push(ScriptedResponse::text(&["Hel", "lo!"]));
    h.controller.update_pending_text("hi");

    h.controller.submit().await;
    h.store.wait_idle(&h.fp).await;

    let ids: Vec<_> = h
        .store
        .read(&h.fp)
        .flattened()
        .into_iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(ids, vec!["srv-a", "srv-q", "s1"]);
    assert!(!h.store.is_stale(&h.fp));
}

#[tokio::test]
async fn settle_without_refetch_only_marks_stale() {
    let source = Arc::new(MemoryPageSource::new());
    let store = CacheStore::builder().page_source(source.clone()).build();
    let config = ControllerConfig {
        refetch_on_settle: false,
        ..ControllerConfig::default()
    };
    let h = harness_with(store, config);
    h.transport.push(ScriptedResponse::text(&["ok"]));
    h.controller.update_pending_text("hi");

    h.controller.submit().await;

    assert!(h.store.is_stale(&h.fp));
    assert_eq!(h.store.invalidation_count(&h.fp), 1);
    assert!(!h.store.has_refresh_in_flight(&h.fp));
    assert_eq!(source.fetch_count(), 0);
    let entry = h.store.read(&h.fp);
    assert_eq!(entry.pending_response_count(), 0);
    assert_eq!(entry.pages[0].messages[0].id.as_str(), "msg-1-reply");
}

#[tokio::test]
async fn observers_see_busy_toggle_and_final_phase() {
    let h = harness();
    h.transport.push(ScriptedResponse::text(&["ok"]));
    let mut composer = h.controller.subscribe();
    let mut phase = h.controller.subscribe_phase();
    h.controller.update_pending_text("hi");
    let _ = composer.borrow_and_update();

    h.controller.submit().await;

    assert!(composer.has_changed().unwrap());
    assert_eq!(*composer.borrow_and_update(), ComposerState::default());
    assert!(phase.has_changed().unwrap());
    assert_eq!(*phase.borrow_and_update(), MutationPhase::Settled);
}

#[tokio::test]
async fn sequential_submits_keep_every_reply() {
    let h = harness();
    h.transport.push(ScriptedResponse::text(&["one"]));
    h.transport.push(ScriptedResponse::text(&["two"]));

    h.controller.update_pending_text("first");
    h.controller.submit().await;
    h.controller.update_pending_text("second");
    h.controller.submit().await;

    let records: Vec<_> = h
        .store
        .read(&h.fp)
        .flattened()
        .into_iter()
        .map(|r| format!("{}:{}", r.id, r.text))
        .collect();
    assert_eq!(
        records,
        vec![
            "msg-2-reply:two",
            "msg-2:second",
            "msg-1-reply:one",
            "msg-1:first"
        ]
    );
    assert_eq!(h.transport.dispatch_count(), 2);
}
