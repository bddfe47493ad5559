// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Routes decoded sentences to the requests waiting for them

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::{ApiError, Result};
use crate::mikrotik::observer::SessionObserver;
use crate::mikrotik::types::{AttributeMap, ReplyType, Sentence, Tag};

use super::parse::{fatal_error, parse_attributes, trap_error};
use super::state::RequestOutcome;

/// Channel a waiting request receives its rows (or error) on
pub(crate) type ReplySender = oneshot::Sender<Result<Vec<AttributeMap>>>;

struct PendingRequest {
    reply: ReplySender,
    rows: Vec<AttributeMap>,
}

/// Tag → pending request map plus the reply classification rules
///
/// Owned by the session task, which is the only writer.
pub(crate) struct ResponseAggregator {
    pending: HashMap<Tag, PendingRequest>,
    observer: Arc<dyn SessionObserver>,
}

impl ResponseAggregator {
    pub(crate) fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            pending: HashMap::new(),
            observer,
        }
    }

    pub(crate) fn register(&mut self, tag: Tag, reply: ReplySender) {
        self.pending.insert(
            tag,
            PendingRequest {
                reply,
                rows: Vec::new(),
            },
        );
    }

    /// Drops a request whose caller stopped waiting
    pub(crate) fn cancel(&mut self, tag: Tag) -> bool {
        if self.pending.remove(&tag).is_some() {
            tracing::debug!(tag, "Pending request cancelled");
            self.observer.request_finished(tag, RequestOutcome::Cancelled);
            true
        } else {
            false
        }
    }

    /// Applies one inbound sentence
    ///
    /// Returns the error for a `!fatal` reply. The caller must then fail
    /// every pending request and close the connection.
    pub(crate) fn handle(&mut self, sentence: &Sentence) -> Option<ApiError> {
        self.observer.sentence_received(sentence);

        let reply = sentence.reply()?;
        if reply == ReplyType::Fatal {
            return Some(fatal_error(sentence.words()));
        }

        let attrs = parse_attributes(&sentence.words()[1..]);
        let Some(tag) = attrs.get(".tag").and_then(|t| t.parse::<Tag>().ok()) else {
            tracing::debug!("Dropping untagged {} sentence", reply);
            return None;
        };
        let Some(pending) = self.pending.get_mut(&tag) else {
            tracing::trace!(tag, "Dropping {} for unknown tag", reply);
            return None;
        };

        match reply {
            ReplyType::Re => pending.rows.push(attrs),
            ReplyType::Done => {
                if let Some(request) = self.pending.remove(&tag) {
                    let mut rows = request.rows;
                    // `!done` only adds a row when it carries data, e.g. the login challenge
                    if attrs.keys().any(|k| k != ".tag") {
                        rows.push(attrs);
                    }
                    tracing::trace!(tag, rows = rows.len(), "Request completed");
                    self.deliver(tag, request.reply, Ok(rows), RequestOutcome::Completed);
                }
            }
            ReplyType::Trap => {
                if let Some(request) = self.pending.remove(&tag) {
                    let err = trap_error(&attrs);
                    tracing::debug!(tag, "Request trapped: {}", err);
                    self.deliver(tag, request.reply, Err(err), RequestOutcome::Trapped);
                }
            }
            ReplyType::Fatal | ReplyType::Other(_) => {
                tracing::debug!(tag, "Ignoring {} reply", reply);
            }
        }
        None
    }

    /// Fails every pending request with the same error
    pub(crate) fn fail_all(&mut self, err: &ApiError) {
        if !self.pending.is_empty() {
            tracing::debug!(
                pending = self.pending.len(),
                "Failing pending requests: {}",
                err
            );
        }
        for (tag, request) in self.pending.drain() {
            if request.reply.send(Err(err.clone())).is_err() {
                tracing::trace!(tag, "Waiter already gone");
            }
            self.observer.request_finished(tag, RequestOutcome::Failed);
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn deliver(
        &self,
        tag: Tag,
        reply: ReplySender,
        result: Result<Vec<AttributeMap>>,
        outcome: RequestOutcome,
    ) {
        if reply.send(result).is_err() {
            tracing::trace!(tag, "Waiter already gone");
        }
        self.observer.request_finished(tag, outcome);
    }
}
