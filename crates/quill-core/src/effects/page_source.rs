//! Authoritative page reads.
//!
//! # Effect Classification
//!
//! - **Category**: Application Effect
//! - **Implementation**: host application
//! - **Usage**: cache store refetch after invalidation, next-page loads

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::QuillResult;
use crate::model::{Fingerprint, PageCursor, Record};

/// One page as returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    /// Records on the page, newest first
    pub messages: Vec<Record>,
    /// Cursor for the following page; `None` when this is the last page
    pub next_cursor: Option<PageCursor>,
}

/// Reads pages from the server-authoritative source.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page at `cursor` for `fingerprint`.
    async fn fetch_page(
        &self,
        fingerprint: &Fingerprint,
        cursor: &PageCursor,
    ) -> QuillResult<FetchedPage>;
}

/// Blanket implementation for Arc<T> where T: PageSource
#[async_trait]
impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    async fn fetch_page(
        &self,
        fingerprint: &Fingerprint,
        cursor: &PageCursor,
    ) -> QuillResult<FetchedPage> {
        (**self).fetch_page(fingerprint, cursor).await
    }
}
