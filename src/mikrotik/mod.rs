//! `MikroTik` `RouterOS` API client module
//!
//! This module implements the `RouterOS` API wire protocol: word and sentence
//! framing, tagged request multiplexing over one connection, and login.

mod client;
mod connection;
mod observer;
mod types;

// Re-export public types and functions
pub use client::{Client, ClientOptions};
pub use connection::{
    CloseReason, DEFAULT_MAX_INBOUND_WORD_LEN, LoginMethod, MAX_WORD_LEN, RequestOutcome, SentenceFramer, Session,
    SessionOptions, SessionState, TagSequence, challenge_response, decode_length, decode_word,
    encode_length, encode_word, index_by_id_or_tag,
};
pub use observer::{Observers, SessionObserver, TracingObserver};
pub use types::{AttributeMap, IndexedResult, ReplyType, Sentence, Tag};
