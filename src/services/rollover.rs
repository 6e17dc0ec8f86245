// SPDX-License-Identifier: MIT

//! Monthly rollover: freeze the closed month, decide winners, expire
//! one-off payments, emit winner notifications.
//!
//! Idempotency comes from a durable marker row keyed by month. The marker is
//! written only after every other step has succeeded: a partial failure
//! leaves the month open, and the next scheduler tick retries the whole
//! operation safely (the winners record insert and payment expiry are both
//! repeat-safe).

use std::sync::Arc;

use serde::Serialize;

use crate::clock::{previous_month_key, Clock};
use crate::error::AppError;
use crate::models::{EventKind, MonthlyWinnersRecord, OutboxEvent, WinnerEntry};
use crate::services::{LeaderboardEngine, PrizeCalculator};
use crate::store::LedgerStore;

/// How many ranks are paid out.
const PAID_RANKS: usize = 3;

/// Result of one rollover check.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RolloverOutcome {
    /// The month was closed by this call.
    Closed {
        month_key: String,
        winners: u32,
        pool_minor: i64,
    },
    /// The month was already closed; treated as success, not an error.
    AlreadyClosed { month_key: String },
}

#[derive(Clone)]
pub struct MonthlyRollover {
    store: Arc<dyn LedgerStore>,
    clock: Clock,
    leaderboard: LeaderboardEngine,
    prizes: PrizeCalculator,
}

impl MonthlyRollover {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Clock,
        leaderboard: LeaderboardEngine,
        prizes: PrizeCalculator,
    ) -> Self {
        Self {
            store,
            clock,
            leaderboard,
            prizes,
        }
    }

    /// Close the previous month if it is still open. Safe to call at any
    /// frequency; repeat calls after success are no-ops.
    pub async fn run_if_due(&self) -> Result<RolloverOutcome, AppError> {
        let now = self.clock.now();
        let current = self.clock.month_key_of(now);
        let closing = previous_month_key(&current)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("bad month key: {current}")))?;

        if self.store.rollover_marker(&closing).await? {
            tracing::debug!(month = %closing, "Rollover already executed, skipping");
            return Ok(RolloverOutcome::AlreadyClosed { month_key: closing });
        }

        tracing::info!(month = %closing, "Running monthly rollover");

        // An existing winners record means a previous run failed partway
        // through. The standings cannot be recomputed then (payment expiry
        // may already have revoked access for the closed month), so the
        // frozen record is the source of truth from here on.
        let record = match self.store.winners_record(&closing).await? {
            Some(existing) => {
                tracing::info!(month = %closing, "Resuming partially-failed rollover");
                existing
            }
            None => {
                let standings = self.leaderboard.leaderboard(&closing, PAID_RANKS).await?;
                let pool = self.prizes.prize_pool(&closing).await?;

                let winners: Vec<WinnerEntry> = standings
                    .iter()
                    .map(|entry| WinnerEntry {
                        rank: entry.position,
                        player_id: entry.player_id,
                        display_name: entry.display_name.clone(),
                        best_score: entry.best_score,
                        payout_minor: pool.payout_for_rank(entry.position),
                    })
                    .collect();

                let record = MonthlyWinnersRecord {
                    month_key: closing.clone(),
                    winners,
                    pool_minor: pool.total_minor,
                    player_count: pool.player_count,
                    currency: pool.currency.clone(),
                    closed_at: now,
                };
                self.store.put_winners_record(&record).await?;
                record
            }
        };

        // Winner events go out before anything is expired: a failure past
        // this point retries with the notifications already durable
        // (at-least-once; consumers dedupe).
        let events: Vec<OutboxEvent> = record
            .winners
            .iter()
            .map(|w| {
                OutboxEvent::new(
                    EventKind::WinnerDecided,
                    serde_json::json!({
                        "month_key": closing,
                        "rank": w.rank,
                        "player_id": w.player_id,
                        "best_score": w.best_score,
                        "payout_minor": w.payout_minor,
                        "currency": record.currency,
                    }),
                    now,
                )
            })
            .collect();
        self.store.append_events(events).await?;

        // Subscription holders keep access across the boundary; only
        // unsubscribed one-off payments expire.
        let exempt = self.store.players_with_active_subscription().await?;
        let expired = self
            .store
            .expire_one_off_payments(&closing, &exempt)
            .await?;

        // The marker comes last: writing it earlier would silently skip the
        // retry of a partially-failed rollover.
        self.store.put_rollover_marker(&closing, now).await?;

        tracing::info!(
            month = %closing,
            winners = record.winners.len(),
            pool_minor = record.pool_minor,
            expired_payments = expired,
            "Month closed"
        );

        Ok(RolloverOutcome::Closed {
            month_key: closing,
            winners: record.winners.len() as u32,
            pool_minor: record.pool_minor,
        })
    }
}
