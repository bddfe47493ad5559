// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Error types for the RouterOS API client

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::mikrotik::SessionState;

/// Main API error type
///
/// Cloneable so a single connection-fatal cause can be delivered to every
/// request waiting on the session.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Malformed length prefix on the wire, the connection cannot continue
    #[error("Protocol corruption: {0}")]
    ProtocolCorruption(String),

    /// Word too long to be represented by the length prefix
    #[error("Word of {len} bytes exceeds the protocol length limit")]
    ProtocolLimit { len: usize },

    /// `!trap` reply, scoped to a single request
    #[error("RouterOS trap: {message}")]
    Trap {
        message: String,
        category: Option<u32>,
    },

    /// `!fatal` reply, the router closed the session
    #[error("RouterOS fatal: {0}")]
    Fatal(String),

    /// Login was rejected by the router
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Session is closed, nothing is sent to the transport
    #[error("Connection closed")]
    ConnectionClosed,

    /// Caller passed something the protocol cannot express
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is not allowed in the current session state
    #[error("Operation not allowed while session is {0}")]
    InvalidState(SessionState),

    /// Operation did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Network or IO error
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Returns `true` if the error leaves the connection unusable
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolCorruption(_) | Self::Fatal(_) | Self::ConnectionClosed | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for ApiError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

/// Convenient alias for Result with the API error
pub type Result<T> = std::result::Result<T, ApiError>;
