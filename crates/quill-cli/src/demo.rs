//! In-process echo backend.
//!
//! [`EchoServer`] is the authoritative record store the cache refetches
//! from. [`EchoTransport`] answers each submit by streaming
//! `You said: <text>` in fixed-size byte chunks, so multi-byte characters
//! may be split across chunks. Failure modes can be switched on to watch
//! the rollback path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use quill_core::{
    FetchedPage, Fingerprint, MessageTransport, PageCursor, PageSource, QuillError, QuillResult,
    Record, RecordId, SubmitPayload, SubmitResponse,
};

// ─── Server ──────────────────────────────────────────────────────────────────

/// Authoritative per-subject history, newest first.
#[derive(Debug, Default)]
pub struct EchoServer {
    history: Mutex<HashMap<String, Vec<Record>>>,
    next_id: AtomicU64,
}

impl EchoServer {
    /// Server with a greeting in `subject_id`'s history.
    pub fn with_greeting(subject_id: &str) -> Self {
        let server = Self::default();
        server.append(subject_id, "Hi! Send me anything and I will echo it.", false);
        server
    }

    /// Store a record as the newest of `subject_id`.
    pub fn append(&self, subject_id: &str, text: &str, is_own_message: bool) {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = Record {
            id: RecordId::new(format!("srv-{n}")),
            created_at: Utc::now(),
            text: text.to_string(),
            is_own_message,
        };
        self.history
            .lock()
            .entry(subject_id.to_string())
            .or_default()
            .insert(0, record);
    }
}

#[async_trait]
impl PageSource for EchoServer {
    async fn fetch_page(
        &self,
        fingerprint: &Fingerprint,
        cursor: &PageCursor,
    ) -> QuillResult<FetchedPage> {
        let offset = match cursor {
            PageCursor::Initial => 0,
            PageCursor::After(token) => token
                .parse::<usize>()
                .map_err(|_| QuillError::invalid(format!("bad cursor '{token}'")))?,
        };
        let history = self.history.lock();
        let records = history
            .get(fingerprint.subject_id())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let end = (offset + fingerprint.page_size() as usize).min(records.len());
        Ok(FetchedPage {
            messages: records.get(offset..end).unwrap_or_default().to_vec(),
            next_cursor: (end < records.len()).then(|| PageCursor::After(end.to_string())),
        })
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// How the echo transport answers.
#[derive(Debug, Clone)]
pub struct EchoBehavior {
    /// Bytes per streamed chunk
    pub chunk_size: usize,
    /// Pause between chunks
    pub delay: Duration,
    /// Fail the stream after this many chunks
    pub fail_after: Option<usize>,
    /// Answer without a body
    pub no_body: bool,
}

/// Transport that echoes submissions back as a chunked stream.
pub struct EchoTransport {
    server: Arc<EchoServer>,
    behavior: EchoBehavior,
}

impl EchoTransport {
    /// Echo through `server` with `behavior`.
    pub fn new(server: Arc<EchoServer>, behavior: EchoBehavior) -> Self {
        Self { server, behavior }
    }
}

/// Split `reply` into chunks of at most `size` bytes (at least one byte).
pub fn chunk_reply(reply: &str, size: usize) -> Vec<Bytes> {
    reply
        .as_bytes()
        .chunks(size.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

#[async_trait]
impl MessageTransport for EchoTransport {
    async fn submit(&self, payload: SubmitPayload) -> QuillResult<SubmitResponse> {
        if self.behavior.no_body {
            return Ok(SubmitResponse::without_body());
        }

        let reply = format!("You said: {}", payload.text);
        let chunks = chunk_reply(&reply, self.behavior.chunk_size);
        let fail_at = self.behavior.fail_after;
        let delay = self.behavior.delay;

        // Only completed exchanges reach the server history.
        let completes = !matches!(fail_at, Some(n) if n <= chunks.len());
        if completes {
            self.server.append(&payload.subject_id, &payload.text, true);
            self.server.append(&payload.subject_id, &reply, false);
        }

        let body = futures::stream::unfold(0_usize, move |index| {
            let next = if fail_at == Some(index) {
                Some(Err(QuillError::stream_read("simulated connection reset")))
            } else {
                chunks.get(index).cloned().map(Ok)
            };
            async move {
                let item = next?;
                tokio::time::sleep(delay).await;
                // Ends after an error by pointing past every chunk and the
                // failure index.
                let following = if item.is_err() { usize::MAX } else { index + 1 };
                Some((item, following))
            }
        });

        Ok(SubmitResponse::streaming(body.boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn behavior() -> EchoBehavior {
        EchoBehavior {
            chunk_size: 4,
            delay: Duration::ZERO,
            fail_after: None,
            no_body: false,
        }
    }

    #[test]
    fn test_chunk_reply_splits_bytes() {
        let chunks = chunk_reply("héllo", 2);
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();
        assert_eq!(joined, "héllo".as_bytes());
        assert!(chunks.iter().all(|c| c.len() <= 2));
        assert_eq!(chunk_reply("abc", 0).len(), 3);
    }

    #[tokio::test]
    async fn test_echo_streams_reply_and_records_exchange() {
        let server = Arc::new(EchoServer::default());
        let transport = EchoTransport::new(server.clone(), behavior());

        let response = transport
            .submit(SubmitPayload {
                subject_id: "s".into(),
                text: "hi".into(),
            })
            .await
            .unwrap();
        let items: Vec<_> = response.into_body().unwrap().collect().await;
        let bytes: Vec<u8> = items.into_iter().flat_map(|c| c.unwrap().to_vec()).collect();
        assert_eq!(bytes, b"You said: hi");

        let fp = Fingerprint::new("s", 10).unwrap();
        let page = server.fetch_page(&fp, &PageCursor::Initial).await.unwrap();
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.messages[0].text, "You said: hi");
        assert!(page.messages[1].is_own_message);
    }

    #[tokio::test]
    async fn test_fail_after_ends_stream_with_error() {
        let server = Arc::new(EchoServer::default());
        let transport = EchoTransport::new(
            server.clone(),
            EchoBehavior {
                fail_after: Some(1),
                ..behavior()
            },
        );

        let response = transport
            .submit(SubmitPayload {
                subject_id: "s".into(),
                text: "hello world".into(),
            })
            .await
            .unwrap();
        let items: Vec<_> = response.into_body().unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(QuillError::StreamRead { .. })));

        let fp = Fingerprint::new("s", 10).unwrap();
        let page = server.fetch_page(&fp, &PageCursor::Initial).await.unwrap();
        assert!(page.messages.is_empty());
    }

    #[tokio::test]
    async fn test_server_pages_follow_cursor() {
        let server = EchoServer::default();
        for i in 0..5 {
            server.append("s", &format!("m{i}"), false);
        }
        let fp = Fingerprint::new("s", 2).unwrap();
        let first = server.fetch_page(&fp, &PageCursor::Initial).await.unwrap();
        assert_eq!(first.messages[0].text, "m4");
        let cursor = first.next_cursor.unwrap();
        let second = server.fetch_page(&fp, &cursor).await.unwrap();
        assert_eq!(second.messages[0].text, "m2");
    }
}
