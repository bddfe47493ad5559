// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! RouterOS response parsing helpers

use bytes::Bytes;

use crate::error::ApiError;
use crate::mikrotik::types::{AttributeMap, IndexedResult, decode_text};

/// Folds attribute words into a map
///
/// `=name=value` is stored as `name`, `.tag=1` keeps the dot as `.tag`, and
/// a word without `=` after its first byte is a flag with an empty value.
/// The value is everything after the first such `=`, so values may contain
/// `=` themselves.
pub(crate) fn parse_attributes(words: &[Bytes]) -> AttributeMap {
    let mut attrs = AttributeMap::new();
    for word in words {
        let word = decode_text(word);
        match word.char_indices().skip(1).find(|&(_, c)| c == '=').map(|(i, _)| i) {
            Some(pos) => {
                let key = word[..pos].strip_prefix('=').unwrap_or(&word[..pos]);
                attrs.insert(key.to_string(), word[pos + 1..].to_string());
            }
            None => {
                attrs.insert(word, String::new());
            }
        }
    }
    attrs
}

/// Result key of a row: `.id` without its marker, else `tag-<n>`
pub(crate) fn row_key(row: &AttributeMap) -> String {
    match row.get(".id") {
        Some(id) => match id.chars().next() {
            Some(marker) if !marker.is_ascii_digit() => id[marker.len_utf8()..].to_string(),
            _ => id.clone(),
        },
        None => format!("tag-{}", row.get(".tag").map_or("", String::as_str)),
    }
}

/// Indexes reply rows by `.id` or by their tag
///
/// Rows without `.id` from one request share the key `tag-<n>`, so the last
/// one wins. Use the row list directly when every row matters.
#[must_use]
pub fn index_by_id_or_tag(rows: Vec<AttributeMap>) -> IndexedResult {
    rows.into_iter().map(|row| (row_key(&row), row)).collect()
}

/// Builds the error delivered for a `!trap` reply
pub(crate) fn trap_error(attrs: &AttributeMap) -> ApiError {
    let message = attrs.get("message").cloned().unwrap_or_else(|| {
        attrs
            .iter()
            .filter(|(k, _)| k.as_str() != ".tag")
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    });
    ApiError::Trap {
        message,
        category: attrs.get("category").and_then(|c| c.parse().ok()),
    }
}

/// Builds the error delivered for a `!fatal` reply
///
/// The router sends the reason as a bare word, e.g. `session terminated on request`.
pub(crate) fn fatal_error(words: &[Bytes]) -> ApiError {
    let message = words
        .iter()
        .skip(1)
        .map(|w| decode_text(w))
        .collect::<Vec<_>>()
        .join(" ");
    if message.is_empty() {
        ApiError::Fatal("unknown error".to_string())
    } else {
        ApiError::Fatal(message)
    }
}
