// SPDX-License-Identifier: MIT

//! Subscription model. An active subscription grants access for every month
//! until cancelled, independent of per-month Payment rows (each billing cycle
//! still records a Payment for pool accounting).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

/// Recurring entry-fee subscription. Never deleted; cancellation flips the
/// status and keeps the row for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub player_id: u64,
    /// Gateway subscription reference (unique, used as document ID)
    pub external_ref: String,
    pub status: SubscriptionStatus,
    /// Billing amount per cycle, minor units
    pub amount_minor: i64,
    pub next_billing: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}
