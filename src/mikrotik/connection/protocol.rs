// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! RouterOS wire protocol word encoding

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ApiError, Result};

/// Largest word length the five-byte prefix can carry
pub const MAX_WORD_LEN: usize = u32::MAX as usize;

/// Default cap on a single word received from a router
pub const DEFAULT_MAX_INBOUND_WORD_LEN: usize = 64 * 1024 * 1024;

/// Encodes a word length using the RouterOS variable-length prefix
///
/// # Errors
///
/// Returns `ApiError::ProtocolLimit` if `len` does not fit the prefix.
// RouterOS protocol length encoding - intentional truncation is part of the wire format
#[allow(clippy::cast_possible_truncation)]
pub fn encode_length(len: usize) -> Result<Vec<u8>> {
    if len < 0x80 {
        Ok(vec![len as u8])
    } else if len < 0x4000 {
        Ok(((len as u16) | 0x8000).to_be_bytes().to_vec())
    } else if len < 0x0020_0000 {
        Ok(((len as u32) | 0x00C0_0000).to_be_bytes()[1..].to_vec())
    } else if len < 0x1000_0000 {
        Ok(((len as u32) | 0xE000_0000).to_be_bytes().to_vec())
    } else if len <= MAX_WORD_LEN {
        let mut out = Vec::with_capacity(5);
        out.push(0xF0);
        out.extend_from_slice(&(len as u32).to_be_bytes());
        Ok(out)
    } else {
        Err(ApiError::ProtocolLimit { len })
    }
}

/// Decodes a length prefix from the start of `buf`
///
/// Returns `(payload_len, prefix_len)`, or `None` if `buf` does not yet hold
/// the whole prefix.
///
/// # Errors
///
/// Returns `ApiError::ProtocolCorruption` for an unknown control byte.
pub fn decode_length(buf: &[u8]) -> Result<Option<(usize, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let prefix_len = if first & 0x80 == 0x00 {
        1
    } else if first & 0xC0 == 0x80 {
        2
    } else if first & 0xE0 == 0xC0 {
        3
    } else if first & 0xF0 == 0xE0 {
        4
    } else if first & 0xF8 == 0xF0 {
        5
    } else {
        return Err(ApiError::ProtocolCorruption(format!(
            "unknown control byte {first:#04X}"
        )));
    };
    if buf.len() < prefix_len {
        return Ok(None);
    }
    let len = match prefix_len {
        1 => first as usize,
        2 => ((first & 0x3F) as usize) << 8 | buf[1] as usize,
        3 => ((first & 0x1F) as usize) << 16 | (buf[1] as usize) << 8 | buf[2] as usize,
        4 => {
            ((first & 0x0F) as usize) << 24
                | (buf[1] as usize) << 16
                | (buf[2] as usize) << 8
                | buf[3] as usize
        }
        // marker byte, length follows as a big-endian u32
        _ => u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize,
    };
    Ok(Some((len, prefix_len)))
}

/// Appends the prefixed form of `word` to `dst`
///
/// # Errors
///
/// Returns `ApiError::ProtocolLimit` if the word is too long.
pub fn encode_word(word: &[u8], dst: &mut BytesMut) -> Result<()> {
    let prefix = encode_length(word.len())?;
    dst.reserve(prefix.len() + word.len());
    dst.put_slice(&prefix);
    dst.put_slice(word);
    Ok(())
}

/// Locates the complete word at the start of `buf`
///
/// Returns `(prefix_len, payload_len)` once the prefix and the whole payload
/// are buffered, `None` before that.
///
/// # Errors
///
/// Returns `ApiError::ProtocolCorruption` for an unknown control byte or a
/// declared length above `max_len`.
pub(crate) fn word_span(buf: &[u8], max_len: usize) -> Result<Option<(usize, usize)>> {
    let Some((len, prefix_len)) = decode_length(buf)? else {
        return Ok(None);
    };
    if len > max_len {
        return Err(ApiError::ProtocolCorruption(format!(
            "word length {len} exceeds limit {max_len}"
        )));
    }
    if buf.len() - prefix_len < len {
        return Ok(None);
    }
    Ok(Some((prefix_len, len)))
}

/// Decodes one word from the start of `buf`
///
/// Returns the word and the number of bytes it occupied, or `None` if more
/// input is needed.
///
/// # Errors
///
/// Returns `ApiError::ProtocolCorruption` for an unknown control byte.
pub fn decode_word(buf: &[u8]) -> Result<Option<(Bytes, usize)>> {
    let Some((prefix_len, len)) = word_span(buf, MAX_WORD_LEN)? else {
        return Ok(None);
    };
    let end = prefix_len + len;
    Ok(Some((Bytes::copy_from_slice(&buf[prefix_len..end]), end)))
}
