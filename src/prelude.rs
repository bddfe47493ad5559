// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Prelude module for convenient imports
//!
//! ```rust
//! use routeros_api::prelude::*;
//! ```

// Core types
pub use crate::config::{Config, RouterConfig};
pub use crate::error::{ApiError, Result};

// Metrics types
pub use crate::metrics::ApiMetrics;

// RouterOS client
pub use crate::mikrotik::{
    AttributeMap, Client, ClientOptions, CloseReason, IndexedResult, LoginMethod, Session,
    SessionObserver, SessionOptions, SessionState,
};
