// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Type definitions for RouterOS API sentences and replies

use std::collections::BTreeMap;
use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::Result;

use super::connection::{encode_word, parse_attributes};

/// Per-request correlation identifier carried as `.tag=<n>`
pub type Tag = u64;

/// Attributes of a single sentence, keyed by name
///
/// `=name=value` words are stored under `name`, `.tag=3` style words keep
/// their leading dot, flags map to an empty string.
pub type AttributeMap = BTreeMap<String, String>;

/// Reply rows keyed by `.id` (marker stripped) or `tag-<n>`
pub type IndexedResult = BTreeMap<String, AttributeMap>;

/// Reply type carried in the first word of an inbound sentence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReplyType {
    Re,
    Done,
    Trap,
    Fatal,
    Other(String),
}

impl ReplyType {
    #[must_use]
    pub fn parse(word: &[u8]) -> Self {
        match word {
            b"!re" => Self::Re,
            b"!done" => Self::Done,
            b"!trap" => Self::Trap,
            b"!fatal" => Self::Fatal,
            other => Self::Other(decode_text(other)),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Re => "!re",
            Self::Done => "!done",
            Self::Trap => "!trap",
            Self::Fatal => "!fatal",
            Self::Other(word) => word,
        }
    }
}

impl fmt::Display for ReplyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol message: the words preceding a zero-length terminator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    words: Vec<Bytes>,
}

impl Sentence {
    #[must_use]
    pub fn new(words: Vec<Bytes>) -> Self {
        Self { words }
    }

    /// Builds a sentence by copying each word
    pub fn from_words<I, W>(words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: AsRef<[u8]>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| Bytes::copy_from_slice(w.as_ref()))
                .collect(),
        }
    }

    #[must_use]
    pub fn words(&self) -> &[Bytes] {
        &self.words
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Reply type of an inbound sentence, `None` for an empty sentence
    #[must_use]
    pub fn reply(&self) -> Option<ReplyType> {
        self.words.first().map(|w| ReplyType::parse(w))
    }

    /// Attributes carried after the first word
    #[must_use]
    pub fn attributes(&self) -> AttributeMap {
        parse_attributes(self.words.get(1..).unwrap_or_default())
    }

    /// Value of the `.tag` attribute, if present and numeric
    #[must_use]
    pub fn tag(&self) -> Option<Tag> {
        self.words
            .iter()
            .skip(1)
            .find_map(|w| w.strip_prefix(b".tag="))
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|v| v.parse().ok())
    }

    /// Appends the wire form of the sentence, including the terminator, to `dst`
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ProtocolLimit` if a word is too long to encode.
    /// Nothing is appended in that case.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let capacity = self.words.iter().map(|w| w.len() + 1).sum::<usize>() + 1;
        let mut out = BytesMut::with_capacity(capacity);
        for word in &self.words {
            encode_word(word, &mut out)?;
        }
        encode_word(&[], &mut out)?;
        dst.extend_from_slice(&out);
        Ok(())
    }

    /// Wire form of the sentence as a single buffer
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ProtocolLimit` if a word is too long to encode.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        self.encode(&mut out)?;
        Ok(out.freeze())
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&decode_text(word))?;
        }
        Ok(())
    }
}

/// Decodes a word as UTF-8, falling back to Latin-1 so no byte is lost
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}
