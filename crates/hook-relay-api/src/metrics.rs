//! Prometheus counters for the relay.
//!
//! Counters live in a registry owned by [`ServiceMetrics`] rather than the
//! process-global default registry, so several instances can coexist (one per
//! router in tests).

use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Service metrics for observability
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    /// Inbound webhooks by source (`github`, `feishu`)
    pub webhooks_received_total: IntCounterVec,

    pub notifications_sent_total: IntCounter,
    pub notification_failures_total: IntCounter,

    /// Current chat changes by cause (`added`, `removed`)
    pub chat_changes_total: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let webhooks_received_total = IntCounterVec::new(
            Opts::new(
                "relay_webhooks_received_total",
                "Inbound webhook requests by source",
            ),
            &["source"],
        )?;
        let notifications_sent_total = IntCounter::new(
            "relay_notifications_sent_total",
            "Notification cards accepted by Feishu",
        )?;
        let notification_failures_total = IntCounter::new(
            "relay_notification_failures_total",
            "Notification cards that could not be delivered",
        )?;
        let chat_changes_total = IntCounterVec::new(
            Opts::new(
                "relay_chat_changes_total",
                "Changes of the current target chat by cause",
            ),
            &["cause"],
        )?;

        registry.register(Box::new(webhooks_received_total.clone()))?;
        registry.register(Box::new(notifications_sent_total.clone()))?;
        registry.register(Box::new(notification_failures_total.clone()))?;
        registry.register(Box::new(chat_changes_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            webhooks_received_total,
            notifications_sent_total,
            notification_failures_total,
            chat_changes_total,
        }))
    }

    pub fn record_webhook(&self, source: &str) {
        self.webhooks_received_total
            .with_label_values(&[source])
            .inc();
    }

    pub fn record_delivery(&self, success: bool) {
        if success {
            self.notifications_sent_total.inc();
        } else {
            self.notification_failures_total.inc();
        }
    }

    pub fn record_chat_change(&self, cause: &str) {
        self.chat_changes_total.with_label_values(&[cause]).inc();
    }

    /// Text exposition of every counter.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
