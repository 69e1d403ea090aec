//! `quill chat`: one optimistic submit against the echo backend.
//!
//! Output is JSON lines on stdout:
//! - `change`: a cache event plus the pending-response text at that moment
//! - `notification`: a failure notification
//! - `outcome`: how the mutation ended
//! - `entry`: the cache entry after the settle refetch

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use quill_cache::{CacheEvent, CacheStore, StoreConfig};
use quill_core::{CacheEntry, EngineConfig, Fingerprint, Notification, Notifier};
use quill_sync::{ControllerConfig, MutationController, MutationOutcome};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::demo::{EchoBehavior, EchoServer, EchoTransport};

/// Arguments for `quill chat`.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Conversation to post into
    #[arg(long, default_value = "demo")]
    subject: String,

    /// Fail the reply stream after this many chunks
    #[arg(long)]
    fail_after: Option<usize>,

    /// Answer without a response body
    #[arg(long)]
    no_body: bool,

    /// Bytes per streamed chunk
    #[arg(long, default_value_t = 4)]
    chunk_size: usize,

    /// Milliseconds between chunks
    #[arg(long, default_value_t = 25)]
    delay_ms: u64,

    /// Message text
    text: String,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Line<'a> {
    Change {
        event: &'a CacheEvent,
        pending_response: Option<String>,
        message_count: usize,
    },
    Notification(&'a Notification),
    Outcome(&'a MutationOutcome),
    Entry {
        fingerprint: &'a Fingerprint,
        entry: &'a CacheEntry,
    },
}

fn emit(line: &Line<'_>) {
    match serde_json::to_string(line) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::warn!(error = %err, "Failed to serialise output line"),
    }
}

/// Prints notifications as output lines.
struct JsonNotifier;

impl Notifier for JsonNotifier {
    fn notify(&self, notification: Notification) {
        emit(&Line::Notification(&notification));
    }
}

fn print_change(store: &CacheStore, event: &CacheEvent) {
    let entry = store.read(event.fingerprint());
    emit(&Line::Change {
        event,
        pending_response: entry.pending_response().map(|r| r.text.clone()),
        message_count: entry.message_count(),
    });
}

fn drain(store: &CacheStore, events: &mut broadcast::Receiver<CacheEvent>) {
    while let Ok(event) = events.try_recv() {
        print_change(store, &event);
    }
}

/// Run one submit and print what happened.
pub async fn run(config: &EngineConfig, args: ChatArgs) -> Result<()> {
    let fingerprint = Fingerprint::new(args.subject.as_str(), config.page_size)?;
    let server = Arc::new(EchoServer::with_greeting(&args.subject));
    let store = CacheStore::builder()
        .page_source(server.clone())
        .config(StoreConfig::from(config))
        .build();
    store.refetch_now(&fingerprint).await?;

    let transport = Arc::new(EchoTransport::new(
        server,
        EchoBehavior {
            chunk_size: args.chunk_size,
            delay: Duration::from_millis(args.delay_ms),
            fail_after: args.fail_after,
            no_body: args.no_body,
        },
    ));
    let controller = MutationController::builder(store.clone(), fingerprint.clone(), transport)
        .notifier(Arc::new(JsonNotifier))
        .config(ControllerConfig::from(config))
        .build();

    let mut events = store.subscribe();
    controller.update_pending_text(args.text);

    let submit = controller.submit();
    tokio::pin!(submit);
    let outcome = loop {
        tokio::select! {
            outcome = &mut submit => break outcome,
            Ok(event) = events.recv() => print_change(&store, &event),
        }
    };
    drain(&store, &mut events);

    store.wait_idle(&fingerprint).await;
    drain(&store, &mut events);

    emit(&Line::Outcome(&outcome));
    emit(&Line::Entry {
        fingerprint: &fingerprint,
        entry: &store.read(&fingerprint),
    });

    if !outcome.is_success() {
        tracing::info!(
            restored_input = %controller.pending_text(),
            "Input restored after failed submit"
        );
    }
    Ok(())
}
