// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Reassembles sentences from arbitrarily split stream reads

use bytes::{Buf, Bytes, BytesMut};

use crate::error::Result;
use crate::mikrotik::types::Sentence;

use super::protocol::{DEFAULT_MAX_INBOUND_WORD_LEN, word_span};

/// Initial capacity of the carry-over buffer
const INITIAL_CAPACITY: usize = 4096;

/// Buffers inbound bytes and yields complete sentences
///
/// Bytes leave the buffer only once a whole word has been decoded, so a
/// length prefix or payload split across reads decodes exactly as if it had
/// arrived in one piece. Words of the sentence in progress are kept until
/// its zero-length terminator arrives.
#[derive(Debug)]
pub struct SentenceFramer {
    buffer: BytesMut,
    words: Vec<Bytes>,
    max_word_len: usize,
}

impl Default for SentenceFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_word_len(DEFAULT_MAX_INBOUND_WORD_LEN)
    }

    /// Creates a framer that rejects any word longer than `max_word_len`
    #[must_use]
    pub fn with_max_word_len(max_word_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            words: Vec::new(),
            max_word_len,
        }
    }

    /// Appends newly received bytes
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete sentence, or `None` until more bytes are fed
    ///
    /// Empty sentences (a stray terminator) are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ProtocolCorruption` for an unknown control byte or
    /// a word over the configured limit. The stream cannot be resynchronised
    /// after that.
    pub fn next_sentence(&mut self) -> Result<Option<Sentence>> {
        loop {
            let Some((prefix_len, len)) = word_span(&self.buffer, self.max_word_len)? else {
                return Ok(None);
            };
            self.buffer.advance(prefix_len);
            let word = self.buffer.split_to(len).freeze();

            if !word.is_empty() {
                self.words.push(word);
                continue;
            }
            if self.words.is_empty() {
                tracing::trace!("Skipping empty sentence");
                continue;
            }
            return Ok(Some(Sentence::new(std::mem::take(&mut self.words))));
        }
    }

    /// Number of buffered bytes not yet decoded into words
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if a sentence has started but not yet terminated
    #[must_use]
    pub fn in_sentence(&self) -> bool {
        !self.words.is_empty()
    }
}
