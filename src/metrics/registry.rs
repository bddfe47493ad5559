// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Metrics registry and session observer

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::mikrotik::{CloseReason, RequestOutcome, Sentence, SessionObserver, Tag};

use super::labels::{OutcomeLabels, ReplyLabels, RouterLabels};

#[derive(Clone)]
pub struct ApiMetrics {
    registry: Arc<Mutex<Registry>>,
    requests: Family<RouterLabels, Counter>,
    requests_finished: Family<OutcomeLabels, Counter>,
    sentences_received: Family<ReplyLabels, Counter>,
    pending_requests: Family<RouterLabels, Gauge>,
    sessions_closed: Family<RouterLabels, Counter>,
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests = Family::<RouterLabels, Counter>::default();
        registry.register(
            "routeros_api_requests",
            "Tagged requests sent to the router",
            requests.clone(),
        );
        let requests_finished = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "routeros_api_requests_finished",
            "Requests removed from the pending map, by outcome",
            requests_finished.clone(),
        );
        let sentences_received = Family::<ReplyLabels, Counter>::default();
        registry.register(
            "routeros_api_sentences_received",
            "Sentences received from the router, by reply type",
            sentences_received.clone(),
        );
        let pending_requests = Family::<RouterLabels, Gauge>::default();
        registry.register(
            "routeros_api_pending_requests",
            "Requests waiting for a reply",
            pending_requests.clone(),
        );
        let sessions_closed = Family::<RouterLabels, Counter>::default();
        registry.register(
            "routeros_api_sessions_closed",
            "Sessions that reached the closed state",
            sessions_closed.clone(),
        );

        Self {
            registry: Arc::new(Mutex::new(registry)),
            requests,
            requests_finished,
            sentences_received,
            pending_requests,
            sessions_closed,
        }
    }

    /// Observer that records events of one router's session
    ///
    /// Also creates the router's series at zero so rates are defined from
    /// the first scrape.
    #[must_use]
    pub fn observer(&self, router: &str) -> Arc<dyn SessionObserver> {
        let labels = RouterLabels {
            router: router.to_string(),
        };
        let _ = self.requests.get_or_create(&labels);
        let _ = self.pending_requests.get_or_create(&labels);
        let _ = self.sessions_closed.get_or_create(&labels);
        Arc::new(RouterObserver {
            metrics: self.clone(),
            labels,
        })
    }

    pub async fn encode_metrics(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let registry = self.registry.lock().await;
        let mut buffer = String::new();
        encode(&mut buffer, &registry)?;
        Ok(buffer)
    }

    #[must_use]
    pub fn requests_sent(&self, router: &str) -> u64 {
        self.requests.get_or_create(&router_labels(router)).get()
    }

    #[must_use]
    pub fn requests_finished(&self, router: &str, outcome: RequestOutcome) -> u64 {
        let labels = OutcomeLabels {
            router: router.to_string(),
            outcome: outcome.as_str().to_string(),
        };
        self.requests_finished.get_or_create(&labels).get()
    }

    #[must_use]
    pub fn pending(&self, router: &str) -> i64 {
        self.pending_requests.get_or_create(&router_labels(router)).get()
    }

    #[must_use]
    pub fn sessions_closed(&self, router: &str) -> u64 {
        self.sessions_closed.get_or_create(&router_labels(router)).get()
    }
}

fn router_labels(router: &str) -> RouterLabels {
    RouterLabels {
        router: router.to_string(),
    }
}

struct RouterObserver {
    metrics: ApiMetrics,
    labels: RouterLabels,
}

impl SessionObserver for RouterObserver {
    fn request_sent(&self, _tag: Tag, _words: &[String]) {
        self.metrics.requests.get_or_create(&self.labels).inc();
        self.metrics.pending_requests.get_or_create(&self.labels).inc();
    }

    fn sentence_received(&self, sentence: &Sentence) {
        let Some(reply) = sentence.reply() else {
            return;
        };
        let labels = ReplyLabels {
            router: self.labels.router.clone(),
            reply: reply.as_str().trim_start_matches('!').to_string(),
        };
        self.metrics.sentences_received.get_or_create(&labels).inc();
    }

    fn request_finished(&self, _tag: Tag, outcome: RequestOutcome) {
        let labels = OutcomeLabels {
            router: self.labels.router.clone(),
            outcome: outcome.as_str().to_string(),
        };
        self.metrics.requests_finished.get_or_create(&labels).inc();
        self.metrics.pending_requests.get_or_create(&self.labels).dec();
    }

    fn session_closed(&self, _reason: &CloseReason) {
        self.metrics.sessions_closed.get_or_create(&self.labels).inc();
    }
}
