//! Property tests for the stream merge.
//!
//! - the pending-response text equals the concatenation of all increments,
//!   whatever the chunk boundaries
//! - the first page never holds more than one pending-response record

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use proptest::prelude::*;
use quill_cache::CacheStore;
use quill_core::{CacheEntry, Fingerprint, Record};
use quill_sync::{
    accumulate, fold_pending_response, MutationController, MutationOutcome, Utf8StreamDecoder,
};
use quill_testkit::{timestamp, FixedClock, ScriptedResponse, ScriptedTransport, SequentialIds};

/// Cut `bytes` at the given positions (taken modulo the length).
fn split_at_points(bytes: &[u8], points: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = points.iter().map(|p| p % (bytes.len() + 1)).collect();
    cuts.push(0);
    cuts.push(bytes.len());
    cuts.sort_unstable();
    cuts.dedup();
    cuts.windows(2)
        .map(|w| bytes[w[0]..w[1]].to_vec())
        .collect()
}

/// Decode and fold chunks the way the controller does, without a store.
fn fold_chunks(entry: &CacheEntry, chunks: &[Vec<u8>]) -> (CacheEntry, usize) {
    let mut decoder = Utf8StreamDecoder::new();
    let mut accumulated = String::new();
    let mut entry = entry.clone();
    let mut max_pending = entry.pending_response_count();
    for chunk in chunks {
        let increment = decoder.decode(chunk).unwrap();
        if increment.is_empty() {
            continue;
        }
        accumulated = accumulate(&accumulated, &increment);
        entry = fold_pending_response(&entry, &accumulated, timestamp(1));
        max_pending = max_pending.max(entry.pending_response_count());
    }
    decoder.finish().unwrap();
    (entry, max_pending)
}

fn arb_history() -> impl Strategy<Value = Vec<Record>> {
    proptest::collection::vec("[a-z ]{0,12}", 0..5).prop_map(|texts| {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Record::own(format!("h{i}"), text, timestamp(i as i64)))
            .collect()
    })
}

proptest! {
    /// Property: folded text equals the concatenation of all increments
    #[test]
    fn prop_fold_equals_concatenation(
        increments in proptest::collection::vec(any::<String>(), 0..10),
    ) {
        let chunks: Vec<Vec<u8>> = increments.iter().map(|s| s.as_bytes().to_vec()).collect();
        let (entry, _) = fold_chunks(&CacheEntry::empty(), &chunks);

        let expected = increments.concat();
        match entry.pending_response() {
            Some(record) => prop_assert_eq!(&record.text, &expected),
            None => prop_assert!(expected.is_empty()),
        }
    }

    /// Property: re-chunking the same bytes does not change the result
    #[test]
    fn prop_chunk_boundaries_do_not_matter(
        text in any::<String>(),
        points in proptest::collection::vec(any::<usize>(), 0..8),
    ) {
        let whole = vec![text.as_bytes().to_vec()];
        let split = split_at_points(text.as_bytes(), &points);

        let (a, _) = fold_chunks(&CacheEntry::empty(), &whole);
        let (b, _) = fold_chunks(&CacheEntry::empty(), &split);
        prop_assert_eq!(
            a.pending_response().map(|r| r.text.clone()),
            b.pending_response().map(|r| r.text.clone())
        );
    }

    /// Property: at most one pending-response record, always in the first page
    #[test]
    fn prop_single_pending_record(
        history in arb_history(),
        increments in proptest::collection::vec("[a-zé🦀]{0,4}", 0..12),
    ) {
        let start = CacheEntry::from_messages(history)
            .with_prepended(Record::own("mine", "hi", timestamp(50)));
        let chunks: Vec<Vec<u8>> = increments.iter().map(|s| s.as_bytes().to_vec()).collect();
        let (entry, max_pending) = fold_chunks(&start, &chunks);

        prop_assert!(max_pending <= 1);
        prop_assert_eq!(entry.pending_response_count(), entry.pages[0].pending_response_count());
        // the own message is never displaced from the first page
        prop_assert!(entry.pages[0].messages.iter().any(|m| m.id.as_str() == "mine"));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: a full submit reports the concatenated stream as its
    /// response and keeps it as the newest record
    #[test]
    fn prop_submit_merges_split_stream(
        text in "[a-zA-Z0-9 äöü€🦀]{1,24}",
        points in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        let chunks = split_at_points(text.as_bytes(), &points);
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let (outcome, entry) = runtime.block_on(async {
            let store = CacheStore::new();
            let fp = Fingerprint::new("f1", 10).unwrap();
            let transport = Arc::new(ScriptedTransport::new([ScriptedResponse::bytes(chunks)]));
            let controller = MutationController::builder(store.clone(), fp.clone(), transport)
                .clock(Arc::new(FixedClock::default()))
                .id_generator(Arc::new(SequentialIds::new()))
                .build();
            controller.update_pending_text("question");
            let outcome = controller.submit().await;
            (outcome, store.read(&fp))
        });

        prop_assert_eq!(outcome, MutationOutcome::Succeeded { response_text: text.clone() });
        // no page source, so settle keeps the reply under its own id
        prop_assert_eq!(entry.pending_response_count(), 0);
        prop_assert_eq!(entry.pages[0].messages[0].id.as_str(), "msg-1-reply");
        prop_assert_eq!(&entry.pages[0].messages[0].text, &text);
        prop_assert_eq!(&entry.pages[0].messages[1].text, "question");
    }
}
