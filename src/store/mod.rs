// SPDX-License-Identifier: MIT

//! Ledger storage layer.
//!
//! Every component reaches durable state through the [`LedgerStore`] trait;
//! there are no ad-hoc queries around it. Two backends: Firestore for
//! deployments, an in-memory DashMap store for tests and local development.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreLedger;
pub use memory::MemoryLedger;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{MonthlyWinnersRecord, OutboxEvent, Payment, Player, Score, Subscription};

/// Collection names as constants.
pub mod collections {
    pub const PLAYERS: &str = "players";
    pub const SCORES: &str = "scores";
    pub const PAYMENTS: &str = "payments";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const MONTHLY_WINNERS: &str = "monthly_winners";
    /// Rollover idempotency markers, keyed by month
    pub const ROLLOVER_MARKERS: &str = "rollover_markers";
    pub const OUTBOX: &str = "outbox";
    /// Per-(player, day) attempt counters backing the quota transaction
    pub const ATTEMPT_COUNTERS: &str = "attempt_counters";
}

/// Outcome of the atomic quota-guarded score append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreInsert {
    /// Score was appended; counters reflect the new state.
    Recorded { games_today: u32, remaining: u32 },
    /// Quota already exhausted; nothing was written.
    QuotaExhausted { games_today: u32 },
}

/// Narrow storage contract shared by all ledger components.
///
/// Implementations must make `record_score_atomic` linearizable per
/// (player, day key): the quota check, the score append and the outbox
/// append are one unit, never a check-then-write race.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─── Players ─────────────────────────────────────────────────
    async fn get_player(&self, player_id: u64) -> Result<Option<Player>, AppError>;
    async fn upsert_player(&self, player: &Player) -> Result<(), AppError>;
    /// User-initiated erasure: cascades to scores, payments, subscriptions.
    /// Returns the number of documents removed.
    async fn delete_player_data(&self, player_id: u64) -> Result<usize, AppError>;

    // ─── Scores ──────────────────────────────────────────────────
    /// Append `score` if the player has used fewer than `quota` attempts on
    /// `score.day_key`, writing `event` in the same unit of work.
    async fn record_score_atomic(
        &self,
        score: Score,
        quota: u32,
        event: OutboxEvent,
    ) -> Result<ScoreInsert, AppError>;
    async fn attempts_today(&self, player_id: u64, day_key: &str) -> Result<u32, AppError>;
    async fn scores_for_month(&self, month_key: &str) -> Result<Vec<Score>, AppError>;
    async fn scores_for_player_month(
        &self,
        player_id: u64,
        month_key: &str,
    ) -> Result<Vec<Score>, AppError>;

    // ─── Payments ────────────────────────────────────────────────
    /// Record a confirmed charge; idempotent on `payment.external_ref`
    /// (gateway webhooks are at-least-once). Returns false on duplicate.
    async fn record_payment(&self, payment: Payment, event: OutboxEvent)
        -> Result<bool, AppError>;
    async fn payments_for_month(&self, month_key: &str) -> Result<Vec<Payment>, AppError>;
    async fn has_completed_payment(
        &self,
        player_id: u64,
        month_key: &str,
    ) -> Result<bool, AppError>;
    /// Flip completed one-off payments of `month_key` to expired, except for
    /// players in `exempt` (active subscribers keep uninterrupted access).
    /// Returns the number of payments expired. Safe to repeat.
    async fn expire_one_off_payments(
        &self,
        month_key: &str,
        exempt: &HashSet<u64>,
    ) -> Result<u32, AppError>;

    // ─── Subscriptions ───────────────────────────────────────────
    async fn upsert_subscription(&self, sub: &Subscription) -> Result<(), AppError>;
    async fn subscription_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Subscription>, AppError>;
    async fn active_subscription(&self, player_id: u64) -> Result<Option<Subscription>, AppError>;
    /// Returns true if the subscription existed and is now cancelled.
    async fn cancel_subscription(
        &self,
        external_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;
    async fn players_with_active_subscription(&self) -> Result<HashSet<u64>, AppError>;

    // ─── Monthly winners & rollover marker ───────────────────────
    async fn winners_record(
        &self,
        month_key: &str,
    ) -> Result<Option<MonthlyWinnersRecord>, AppError>;
    /// Insert-if-absent; an existing record is left untouched.
    async fn put_winners_record(&self, record: &MonthlyWinnersRecord) -> Result<(), AppError>;
    async fn rollover_marker(&self, month_key: &str) -> Result<bool, AppError>;
    async fn put_rollover_marker(&self, month_key: &str, at: DateTime<Utc>)
        -> Result<(), AppError>;

    // ─── Outbox ──────────────────────────────────────────────────
    async fn append_events(&self, events: Vec<OutboxEvent>) -> Result<(), AppError>;
    /// Undelivered events, oldest first.
    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, AppError>;
    async fn mark_event_delivered(
        &self,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}
