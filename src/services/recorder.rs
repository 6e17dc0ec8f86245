// SPDX-License-Identifier: MIT

//! Score recorder: the submission workflow.
//!
//! Order matters: access is checked before any quota is consumed, and the
//! quota consume + score append + outbox event are one atomic store unit,
//! so a rejected submission never burns an attempt and concurrent
//! submissions never exceed the daily quota.

use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{EventKind, OutboxEvent, Score};
use crate::services::AccessControl;
use crate::store::{LedgerStore, ScoreInsert};

/// Accepted submission, with updated usage counters.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub value: u32,
    pub month_key: String,
    /// Attempts used today, including this one
    pub games_today: u32,
    /// Attempts left today
    pub remaining: u32,
}

#[derive(Clone)]
pub struct ScoreRecorder {
    store: Arc<dyn LedgerStore>,
    access: AccessControl,
    clock: Clock,
    quota: u32,
    max_score: Option<u32>,
}

impl ScoreRecorder {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        access: AccessControl,
        clock: Clock,
        quota: u32,
        max_score: Option<u32>,
    ) -> Self {
        Self {
            store,
            access,
            clock,
            quota,
            max_score,
        }
    }

    /// Validate and record a score for the current month.
    pub async fn submit_score(
        &self,
        player_id: u64,
        value: u32,
    ) -> Result<SubmitOutcome, AppError> {
        if let Some(max) = self.max_score {
            if value > max {
                return Err(AppError::InvalidScore(format!(
                    "score {value} exceeds the maximum of {max}"
                )));
            }
        }

        let now = self.clock.now();
        let month_key = self.clock.month_key_of(now);
        let day_key = self.clock.day_key_of(now);

        // Access gate first: a denied player must not consume quota.
        if !self.access.has_access(player_id, &month_key).await? {
            return Err(AppError::AccessDenied { month_key });
        }

        let score = Score {
            score_id: uuid::Uuid::new_v4().to_string(),
            player_id,
            value,
            recorded_at: now,
            month_key: month_key.clone(),
            day_key,
        };

        // The notification is written in the same unit of work as the score,
        // so it fires at-least-once only after the row is durable.
        let event = OutboxEvent::new(
            EventKind::ScoreRecorded,
            serde_json::json!({
                "player_id": player_id,
                "value": value,
                "month_key": month_key,
            }),
            now,
        );

        match self
            .store
            .record_score_atomic(score, self.quota, event)
            .await?
        {
            ScoreInsert::Recorded {
                games_today,
                remaining,
            } => {
                tracing::info!(player_id, value, games_today, "Score recorded");
                Ok(SubmitOutcome {
                    value,
                    month_key,
                    games_today,
                    remaining,
                })
            }
            ScoreInsert::QuotaExhausted { games_today } => {
                Err(AppError::QuotaExceeded { games_today })
            }
        }
    }

    /// Attempts left for the player today.
    pub async fn remaining_attempts(&self, player_id: u64) -> Result<u32, AppError> {
        let used = self
            .store
            .attempts_today(player_id, &self.clock.day_key())
            .await?;
        Ok(self.quota.saturating_sub(used))
    }
}
