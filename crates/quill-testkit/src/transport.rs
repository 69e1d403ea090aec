//! Scripted message transport.
//!
//! Each `submit` pops the next [`ScriptedResponse`]. Responses can replay a
//! fixed list of chunks or hand chunk delivery to the test through a
//! [`ChunkFeeder`], which lets a test inspect the cache between chunks.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use quill_core::{MessageTransport, QuillError, QuillResult, SubmitPayload, SubmitResponse};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

type DispatchHook = Box<dyn Fn(&SubmitPayload) + Send + Sync>;

/// One scripted reply.
#[derive(Debug)]
pub enum ScriptedResponse {
    /// Body streams these items, then ends
    Chunks(Vec<QuillResult<Bytes>>),
    /// Body streams whatever the paired [`ChunkFeeder`] sends
    Channel(mpsc::UnboundedReceiver<QuillResult<Bytes>>),
    /// Response without a body
    NoBody,
    /// Dispatch itself fails
    Fail(QuillError),
}

impl ScriptedResponse {
    /// Body of UTF-8 text chunks.
    pub fn text(chunks: &[&str]) -> Self {
        Self::Chunks(
            chunks
                .iter()
                .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
                .collect(),
        )
    }

    /// Body of raw byte chunks.
    pub fn bytes(chunks: Vec<Vec<u8>>) -> Self {
        Self::Chunks(chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect())
    }

    /// Text chunks followed by a read error.
    pub fn text_then_error(chunks: &[&str], error: QuillError) -> Self {
        let mut items: Vec<QuillResult<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
            .collect();
        items.push(Err(error));
        Self::Chunks(items)
    }

    /// Body fed by the test. The stream ends when the feeder is dropped.
    pub fn channel() -> (Self, ChunkFeeder) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Channel(rx), ChunkFeeder { tx })
    }
}

/// Sending half of [`ScriptedResponse::channel`].
#[derive(Debug, Clone)]
pub struct ChunkFeeder {
    tx: mpsc::UnboundedSender<QuillResult<Bytes>>,
}

impl ChunkFeeder {
    /// Deliver a text chunk.
    pub fn send_text(&self, chunk: &str) {
        let _ = self.tx.send(Ok(Bytes::copy_from_slice(chunk.as_bytes())));
    }

    /// Deliver raw bytes.
    pub fn send_bytes(&self, chunk: &[u8]) {
        let _ = self.tx.send(Ok(Bytes::copy_from_slice(chunk)));
    }

    /// Deliver a read error.
    pub fn fail(&self, error: QuillError) {
        let _ = self.tx.send(Err(error));
    }

    /// End the stream.
    pub fn finish(self) {}
}

/// Transport replying from a script.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedResponse>>,
    payloads: Mutex<Vec<SubmitPayload>>,
    on_dispatch: Mutex<Option<DispatchHook>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("remaining", &self.script.lock().unwrap().len())
            .field("dispatched", &self.payloads.lock().unwrap().len())
            .finish()
    }
}

impl ScriptedTransport {
    /// Transport that answers with `responses` in order.
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Queue another response.
    pub fn push(&self, response: ScriptedResponse) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Run `hook` on every payload at dispatch time, before replying.
    pub fn on_dispatch(&self, hook: impl Fn(&SubmitPayload) + Send + Sync + 'static) {
        *self.on_dispatch.lock().unwrap() = Some(Box::new(hook));
    }

    /// Every payload dispatched so far.
    pub fn payloads(&self) -> Vec<SubmitPayload> {
        self.payloads.lock().unwrap().clone()
    }

    /// Number of dispatches so far.
    pub fn dispatch_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageTransport for ScriptedTransport {
    async fn submit(&self, payload: SubmitPayload) -> QuillResult<SubmitResponse> {
        if let Some(hook) = self.on_dispatch.lock().unwrap().as_ref() {
            hook(&payload);
        }
        self.payloads.lock().unwrap().push(payload);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(ScriptedResponse::Chunks(items)) => Ok(SubmitResponse::streaming(
                futures::stream::iter(items).boxed(),
            )),
            Some(ScriptedResponse::Channel(rx)) => {
                let body = futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(SubmitResponse::streaming(body.boxed()))
            }
            Some(ScriptedResponse::NoBody) => Ok(SubmitResponse::without_body()),
            Some(ScriptedResponse::Fail(error)) => Err(error),
            None => Err(QuillError::transport("no scripted response left")),
        }
    }
}
