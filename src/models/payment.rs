// SPDX-License-Identifier: MIT

//! Payment model. A completed payment for month M is what grants access
//! for M (alongside active subscriptions, see `subscription.rs`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Single entry fee for one month
    OneOff,
    /// One billing cycle of a subscription (recorded for pool accounting)
    SubscriptionCharge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    /// Set by the monthly rollover for one-off payments of a closed month
    Expired,
}

/// One confirmed gateway charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub player_id: u64,
    /// Amount in currency minor units
    pub amount_minor: i64,
    pub currency: String,
    pub kind: PaymentKind,
    /// Month the payment buys access for
    pub month_key: String,
    pub status: PaymentStatus,
    /// Gateway transaction reference (unique; dedupes webhook retries)
    pub external_ref: String,
    pub recorded_at: DateTime<Utc>,
}
