// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Session lifecycle and tag allocation

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::mikrotik::types::Tag;

/// Why a session stopped accepting requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by the caller
    Local,
    /// Router sent `!fatal`
    Fatal(String),
    /// Transport read or write failed, or the peer closed the stream
    Transport(String),
    /// Malformed bytes on the wire
    Corruption(String),
    /// Login was rejected
    AuthenticationFailed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::AuthenticationFailed => f.write_str("authentication failed"),
        }
    }
}

/// Connection state machine
///
/// `Connecting → Authenticating → Ready → Closed`. `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Ready,
    Closed(CloseReason),
}

impl SessionState {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Ready => f.write_str("ready"),
            Self::Closed(reason) => write!(f, "closed ({reason})"),
        }
    }
}

/// How a registered request left the pending map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// `!done` received
    Completed,
    /// `!trap` received
    Trapped,
    /// Failed by a connection-wide error
    Failed,
    /// Caller stopped waiting
    Cancelled,
}

impl RequestOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Trapped => "trapped",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Monotonic tag counter, starting at 1
///
/// Clones share the counter, so a caller that reconnects can hand the same
/// sequence to the new session and tags keep increasing.
#[derive(Debug, Clone)]
pub struct TagSequence(Arc<AtomicU64>);

impl Default for TagSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl TagSequence {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    /// Allocates the next tag, never returning one twice
    pub fn next_tag(&self) -> Tag {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Tag the next allocation will return
    #[must_use]
    pub fn peek(&self) -> Tag {
        self.0.load(Ordering::Relaxed)
    }
}
