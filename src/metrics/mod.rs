// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Prometheus metrics for RouterOS API sessions
//!
//! [`ApiMetrics`] plugs into a session as a
//! [`SessionObserver`](crate::mikrotik::SessionObserver) and counts requests,
//! replies and closes per router.

mod labels;
mod registry;

/// Labels for routers, reply types and request outcomes
pub use labels::{OutcomeLabels, ReplyLabels, RouterLabels};

/// Prometheus metrics registry
pub use registry::ApiMetrics;
