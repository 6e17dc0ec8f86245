// SPDX-License-Identifier: MIT

//! Score model. Append-only: rows are never mutated or deleted (except by
//! whole-account erasure).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded game result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    /// Random ID, also the storage document ID
    pub score_id: String,
    pub player_id: u64,
    /// Non-negative game score
    pub value: u32,
    pub recorded_at: DateTime<Utc>,
    /// "YYYY-MM", derived from recorded_at in the competition zone
    pub month_key: String,
    /// "YYYY-MM-DD", derived from recorded_at in the competition zone;
    /// scopes the daily attempt quota
    pub day_key: String,
}
