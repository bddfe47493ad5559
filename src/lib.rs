// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! # RouterOS API
//!
//! Async client for the MikroTik RouterOS API protocol.
//!
//! One TCP connection carries any number of concurrent commands. Each command
//! is tagged, replies are routed back by tag, and `!fatal` or transport errors
//! fail everything still in flight.
//!
//! ## Main modules
//! - `config`: router credentials and timeouts
//! - `error`: error types
//! - `metrics`: Prometheus counters fed by session events
//! - `mikrotik`: wire codec, session and login
//! - `prelude`: commonly used types and traits
//!
//! ```no_run
//! use routeros_api::{Client, RouterConfig};
//!
//! # async fn run(config: RouterConfig) -> routeros_api::Result<()> {
//! let client = Client::connect(config).await?;
//! let interfaces = client.query(&["/interface/print"]).await?;
//! for (id, attrs) in &interfaces {
//!     println!("{id}: {:?}", attrs.get("name"));
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod metrics;
mod mikrotik;
pub mod prelude;

// Re-export commonly used types
/// Application configuration
pub use config::{Config, RouterConfig, defaults, env_vars};

/// Error and result type
pub use error::{ApiError, Result};

/// Metrics registry and labels
pub use metrics::{ApiMetrics, OutcomeLabels, ReplyLabels, RouterLabels};

/// Client, session and observer hooks
pub use mikrotik::{
    Client, ClientOptions, CloseReason, LoginMethod, Observers, RequestOutcome, Session,
    SessionObserver, SessionOptions, SessionState, TagSequence, TracingObserver,
};

/// Sentence and result types
pub use mikrotik::{AttributeMap, IndexedResult, ReplyType, Sentence, Tag};

/// Wire codec
pub use mikrotik::{
    DEFAULT_MAX_INBOUND_WORD_LEN, MAX_WORD_LEN, SentenceFramer, challenge_response, decode_length, decode_word, encode_length,
    encode_word, index_by_id_or_tag,
};
