//! Request dispatch effect.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: host application (HTTP, IPC, in-process)
//! - **Usage**: the mutation controller, once per submit
//!
//! The engine treats dispatch as an opaque asynchronous capability that
//! yields a byte stream. End of stream is signalled by the stream ending;
//! a chunk-level `Err` aborts the mutation.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::errors::QuillResult;

/// Incrementally delivered response body.
pub type ByteStream = BoxStream<'static, QuillResult<Bytes>>;

/// What gets sent for a submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPayload {
    /// Conversation the text belongs to
    pub subject_id: String,
    /// The submitted text
    pub text: String,
}

/// Response to a submit.
///
/// A response without a body is a transport failure from the engine's point
/// of view.
pub struct SubmitResponse {
    body: Option<ByteStream>,
}

impl SubmitResponse {
    /// Response carrying a streamed body.
    pub fn streaming(body: ByteStream) -> Self {
        Self { body: Some(body) }
    }

    /// Response that arrived without a body.
    pub fn without_body() -> Self {
        Self { body: None }
    }

    /// Whether a body stream is attached.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Take the body stream.
    pub fn into_body(self) -> Option<ByteStream> {
        self.body
    }
}

impl fmt::Debug for SubmitResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitResponse")
            .field("has_body", &self.has_body())
            .finish()
    }
}

/// Dispatches submissions to the authoritative backend.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send `payload` and return the response whose body streams the reply.
    async fn submit(&self, payload: SubmitPayload) -> QuillResult<SubmitResponse>;
}

/// Blanket implementation for Arc<T> where T: MessageTransport
#[async_trait]
impl<T: MessageTransport + ?Sized> MessageTransport for Arc<T> {
    async fn submit(&self, payload: SubmitPayload) -> QuillResult<SubmitResponse> {
        (**self).submit(payload).await
    }
}
