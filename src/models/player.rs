// SPDX-License-Identifier: MIT

//! Player profile model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Player profile (document ID is the player_id).
///
/// Created on first contact with the bot layer, mutated on profile edits,
/// deleted only by explicit user-initiated erasure (which cascades to scores,
/// payments and subscriptions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Opaque numeric ID from the messaging platform
    pub player_id: u64,
    /// Name shown on the leaderboard
    pub display_name: String,
    /// Payout destination for monthly winners (may be missing)
    pub payout_email: Option<String>,
    /// Denormalized "paid this month" hint; the Payment/Subscription rows are
    /// the canonical truth, never this flag.
    pub paid_current_month: bool,
    /// When the player first appeared
    pub created_at: DateTime<Utc>,
    /// Last session or submission
    pub last_active: DateTime<Utc>,
}

impl Player {
    pub fn new(player_id: u64, display_name: String, now: DateTime<Utc>) -> Self {
        Self {
            player_id,
            display_name,
            payout_email: None,
            paid_current_month: false,
            created_at: now,
            last_active: now,
        }
    }
}
