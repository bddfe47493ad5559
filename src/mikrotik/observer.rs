// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Session event hooks

use std::borrow::Cow;
use std::sync::Arc;

use super::connection::{CloseReason, RequestOutcome};
use super::types::{Sentence, Tag, decode_text};

/// Attribute words whose values never reach the log
const SECRET_ATTRIBUTES: [&str; 2] = ["=password=", "=response="];

/// Receives session events
///
/// Every method defaults to doing nothing. Calls are made from the session
/// task and must not block.
pub trait SessionObserver: Send + Sync {
    /// A tagged request was registered and is about to be written
    fn request_sent(&self, _tag: Tag, _words: &[String]) {}

    /// A complete sentence was decoded from the transport
    fn sentence_received(&self, _sentence: &Sentence) {}

    /// A request was removed from the pending map
    fn request_finished(&self, _tag: Tag, _outcome: RequestOutcome) {}

    /// The session reached `Closed`
    fn session_closed(&self, _reason: &CloseReason) {}
}

/// Masks the value of a credential attribute word
fn redact(word: &str) -> Cow<'_, str> {
    match SECRET_ATTRIBUTES.iter().find(|prefix| word.starts_with(*prefix)) {
        Some(prefix) => Cow::Owned(format!("{prefix}***")),
        None => Cow::Borrowed(word),
    }
}

/// Logs every word on the wire at trace level, with credentials masked
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn request_sent(&self, tag: Tag, words: &[String]) {
        for word in words {
            tracing::trace!(tag, "<<< {}", redact(word));
        }
    }

    fn sentence_received(&self, sentence: &Sentence) {
        if !tracing::enabled!(tracing::Level::TRACE) {
            return;
        }
        let words: Vec<String> = sentence
            .words()
            .iter()
            .map(|word| redact(&decode_text(word)).into_owned())
            .collect();
        tracing::trace!(">>> {}", words.join(" "));
    }

    fn request_finished(&self, tag: Tag, outcome: RequestOutcome) {
        tracing::trace!(tag, outcome = outcome.as_str(), "Request finished");
    }
}

/// Fans events out to several observers
#[derive(Default, Clone)]
pub struct Observers(Vec<Arc<dyn SessionObserver>>);

impl Observers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.0.push(observer);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl SessionObserver for Observers {
    fn request_sent(&self, tag: Tag, words: &[String]) {
        for o in &self.0 {
            o.request_sent(tag, words);
        }
    }

    fn sentence_received(&self, sentence: &Sentence) {
        for o in &self.0 {
            o.sentence_received(sentence);
        }
    }

    fn request_finished(&self, tag: Tag, outcome: RequestOutcome) {
        for o in &self.0 {
            o.request_finished(tag, outcome);
        }
    }

    fn session_closed(&self, reason: &CloseReason) {
        for o in &self.0 {
            o.session_closed(reason);
        }
    }
}
