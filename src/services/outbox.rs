// SPDX-License-Identifier: MIT

//! Outbox delivery: pushes pending notification events to the bot layer.
//!
//! Events are marked delivered only after the sink acknowledges them, so
//! delivery is at-least-once; consumers dedupe on the event ID. With no
//! sink configured the events are logged and marked delivered, which keeps
//! local setups from accumulating an unbounded backlog.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::error::AppError;
use crate::store::LedgerStore;

const SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// What one delivery tick accomplished.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DeliveryReport {
    pub delivered: u32,
    pub failed: u32,
}

#[derive(Clone)]
pub struct OutboxDelivery {
    store: Arc<dyn LedgerStore>,
    clock: Clock,
    client: reqwest::Client,
    sink_url: Option<String>,
}

impl OutboxDelivery {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Clock, sink_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SINK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            store,
            clock,
            client,
            sink_url,
        }
    }

    /// Drain up to `limit` pending events, oldest first. Failed posts stay
    /// pending and are retried on the next tick.
    pub async fn deliver_pending(&self, limit: usize) -> Result<DeliveryReport, AppError> {
        let pending = self.store.pending_events(limit).await?;
        if pending.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let mut report = DeliveryReport::default();
        for event in pending {
            let ok = match &self.sink_url {
                Some(url) => self.post_event(url, &event).await,
                None => {
                    tracing::info!(
                        event_id = %event.id,
                        kind = ?event.kind,
                        payload = %event.payload,
                        "No notification sink configured, logging event"
                    );
                    true
                }
            };

            if ok {
                self.store
                    .mark_event_delivered(&event.id, self.clock.now())
                    .await?;
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            "Outbox delivery tick finished"
        );
        Ok(report)
    }

    async fn post_event(&self, url: &str, event: &crate::models::OutboxEvent) -> bool {
        let body = serde_json::json!({
            "id": event.id,
            "kind": event.kind,
            "payload": event.payload,
            "created_at": event.created_at,
        });

        match self.client.post(url).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    event_id = %event.id,
                    status = %response.status(),
                    "Notification sink rejected event"
                );
                false
            }
            Err(e) => {
                tracing::warn!(event_id = %event.id, error = %e, "Notification sink unreachable");
                false
            }
        }
    }
}
