// SPDX-License-Identifier: MIT

//! Outbox events: durable notification log written in the same unit of work
//! as the state change it announces, delivered asynchronously at-least-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "score.recorded")]
    ScoreRecorded,
    #[serde(rename = "payment.recorded")]
    PaymentRecorded,
    #[serde(rename = "winner.decided")]
    WinnerDecided,
}

/// One pending or delivered notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Random ID (also the document ID); consumers dedupe on it
    pub id: String,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Flat flag the store filters pending events on
    pub delivered: bool,
    /// When the sink acknowledged the event
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload,
            created_at: now,
            delivered: false,
            delivered_at: None,
        }
    }
}
