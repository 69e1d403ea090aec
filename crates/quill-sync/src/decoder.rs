//! Incremental UTF-8 decoding of a chunked byte stream.
//!
//! Chunk boundaries may split a multi-byte character. The decoder holds the
//! incomplete tail back until the next chunk completes it, so the decoded
//! text never depends on where the transport cut the bytes.

use quill_core::{QuillError, QuillResult};

/// Streaming UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    /// Bytes of an incomplete trailing sequence
    pending: Vec<u8>,
    /// Total bytes decoded so far, for error offsets
    consumed: usize,
}

impl Utf8StreamDecoder {
    /// Create a decoder with no buffered bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, returning all text that is now complete.
    ///
    /// The result may be empty when the chunk only extends an incomplete
    /// character. Invalid sequences fail with `QuillError::Decode`.
    pub fn decode(&mut self, chunk: &[u8]) -> QuillResult<String> {
        self.pending.extend_from_slice(chunk);

        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) => {
                if let Some(bad_len) = err.error_len() {
                    return Err(QuillError::decode(format!(
                        "invalid UTF-8 sequence of {bad_len} byte(s) at offset {}",
                        self.consumed + err.valid_up_to()
                    )));
                }
                err.valid_up_to()
            }
        };

        let tail = self.pending.split_off(valid);
        let complete = std::mem::replace(&mut self.pending, tail);
        self.consumed += complete.len();
        String::from_utf8(complete).map_err(|e| QuillError::internal(e.to_string()))
    }

    /// Signal end of stream. Fails if a character was left incomplete.
    pub fn finish(&mut self) -> QuillResult<()> {
        if !self.has_pending() {
            return Ok(());
        }
        let dangling = self.pending.len();
        self.pending.clear();
        Err(QuillError::decode(format!(
            "stream ended inside a multi-byte character ({dangling} byte(s) at offset {})",
            self.consumed
        )))
    }

    /// Whether bytes of an incomplete character are buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
