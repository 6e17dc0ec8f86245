// SPDX-License-Identifier: MIT

//! Frozen per-month winners record, written exactly once by the rollover.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ranked winner with their computed payout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerEntry {
    /// 1-based rank
    pub rank: u32,
    pub player_id: u64,
    pub display_name: String,
    pub best_score: u32,
    /// Payout in currency minor units
    pub payout_minor: i64,
}

/// Immutable snapshot of a closed month (document ID is the month key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyWinnersRecord {
    pub month_key: String,
    /// Top three (fewer if the month had fewer qualified players)
    pub winners: Vec<WinnerEntry>,
    /// Total collected pool, minor units
    pub pool_minor: i64,
    /// Distinct paying players that month
    pub player_count: u32,
    pub currency: String,
    pub closed_at: DateTime<Utc>,
}
