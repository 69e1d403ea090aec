//! # Paginated Cache Model
//!
//! Records are grouped into pages, pages into a cache entry, and entries are
//! keyed by a [`Fingerprint`]. Pages follow a newest-first convention: new
//! records are prepended to the first page.
//!
//! All mutating helpers on [`CacheEntry`] take `&self` and return a new
//! entry so they can be handed to the cache store as pure transforms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{QuillError, QuillResult};

/// Reserved record id for the in-progress server reply.
///
/// At most one record with this id exists per cache entry, always in the
/// first page.
pub const PENDING_RESPONSE_ID: &str = "pending-response";

// ============================================================================
// Identifiers
// ============================================================================

/// Record identifier, unique within a page at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved pending-response id.
    pub fn pending_response() -> Self {
        Self(PENDING_RESPONSE_ID.to_string())
    }

    /// Borrow the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved pending-response id.
    pub fn is_pending_response(&self) -> bool {
        self.0 == PENDING_RESPONSE_ID
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Cache key: which subject's conversation, paged at which size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint {
    subject_id: String,
    page_size: u32,
}

impl Fingerprint {
    /// Create a fingerprint. `page_size` must be greater than zero.
    pub fn new(subject_id: impl Into<String>, page_size: u32) -> QuillResult<Self> {
        if page_size == 0 {
            return Err(QuillError::invalid("page_size must be greater than zero"));
        }
        Ok(Self {
            subject_id: subject_id.into(),
            page_size,
        })
    }

    /// Subject (conversation) this entry belongs to.
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Number of records per page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.page_size)
    }
}

/// Opaque pagination cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCursor {
    /// The first page.
    #[default]
    Initial,
    /// The page following the given server token.
    After(String),
}

// ============================================================================
// Records and Pages
// ============================================================================

/// A single conversation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier
    pub id: RecordId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Record text
    pub text: String,
    /// Whether the local user authored this record
    pub is_own_message: bool,
}

impl Record {
    /// Create an own-message record, as inserted optimistically on submit.
    pub fn own(id: impl Into<RecordId>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            text: text.into(),
            is_own_message: true,
        }
    }

    /// Create the pending-response record for a streamed reply.
    pub fn pending_response(text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::pending_response(),
            created_at,
            text: text.into(),
            is_own_message: false,
        }
    }

    /// Whether this record is the in-progress server reply.
    pub fn is_pending_response(&self) -> bool {
        self.id.is_pending_response()
    }
}

/// An ordered page of records, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Records on this page
    pub messages: Vec<Record>,
}

impl Page {
    /// Create a page from records.
    pub fn new(messages: Vec<Record>) -> Self {
        Self { messages }
    }

    /// Number of pending-response records on this page.
    pub fn pending_response_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.is_pending_response())
            .count()
    }
}

// ============================================================================
// Cache Entry
// ============================================================================

/// Cached pages for one fingerprint.
///
/// Absent entries read as [`CacheEntry::empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Loaded pages, first page holds the newest records
    pub pages: Vec<Page>,
    /// Cursor used to load each page, parallel to `pages`
    pub page_params: Vec<PageCursor>,
}

impl CacheEntry {
    /// The empty entry (`pages: []`, `page_params: []`).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Single-page entry holding `messages`.
    pub fn from_messages(messages: Vec<Record>) -> Self {
        Self {
            pages: vec![Page::new(messages)],
            page_params: vec![PageCursor::Initial],
        }
    }

    /// Whether no pages are loaded.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The first (newest) page, if loaded.
    pub fn first_page(&self) -> Option<&Page> {
        self.pages.first()
    }

    /// All records in page order.
    pub fn flattened(&self) -> Vec<Record> {
        self.pages
            .iter()
            .flat_map(|page| page.messages.iter().cloned())
            .collect()
    }

    /// Total number of records across pages.
    pub fn message_count(&self) -> usize {
        self.pages.iter().map(|page| page.messages.len()).sum()
    }

    /// The pending-response record in the first page, if present.
    pub fn pending_response(&self) -> Option<&Record> {
        self.first_page()
            .and_then(|page| page.messages.iter().find(|m| m.is_pending_response()))
    }

    /// Number of pending-response records across all pages.
    pub fn pending_response_count(&self) -> usize {
        self.pages.iter().map(Page::pending_response_count).sum()
    }

    /// Return a copy with `record` prepended to the first page.
    ///
    /// An empty entry gains a first page loaded from the initial cursor.
    pub fn with_prepended(&self, record: Record) -> Self {
        let mut next = self.clone();
        match next.pages.first_mut() {
            Some(page) => page.messages.insert(0, record),
            None => {
                next.pages.push(Page::new(vec![record]));
                next.page_params = vec![PageCursor::Initial];
            }
        }
        next
    }

    /// Return a copy whose pending-response record carries `text`.
    ///
    /// Creates the record at the head of the first page when absent,
    /// otherwise replaces its text in place.
    pub fn with_pending_response(&self, text: &str, created_at: DateTime<Utc>) -> Self {
        let existing = self
            .first_page()
            .and_then(|page| page.messages.iter().position(Record::is_pending_response));

        match existing {
            Some(index) => {
                let mut next = self.clone();
                if let Some(record) = next
                    .pages
                    .first_mut()
                    .and_then(|page| page.messages.get_mut(index))
                {
                    record.text = text.to_string();
                }
                next
            }
            None => self.with_prepended(Record::pending_response(text, created_at)),
        }
    }

    /// Return a copy whose pending-response record is kept under `id`.
    ///
    /// Used when a finished reply stays visible without an authoritative
    /// refetch, so the next reply starts a record of its own.
    pub fn with_settled_response(&self, id: RecordId) -> Self {
        let mut next = self.clone();
        if let Some(record) = next
            .pages
            .first_mut()
            .and_then(|page| page.messages.iter_mut().find(|m| m.is_pending_response()))
        {
            record.id = id;
        }
        next
    }
}
