// SPDX-License-Identifier: MIT

//! In-memory ledger store.
//!
//! Backs the test suite and local/single-instance deployments. Submission
//! atomicity comes from a per-player async mutex: the quota check, the score
//! append and the outbox append happen under one lock keyed by player, never
//! a global lock.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::{
    MonthlyWinnersRecord, OutboxEvent, Payment, PaymentKind, PaymentStatus, Player, Score,
    Subscription, SubscriptionStatus,
};
use crate::store::{LedgerStore, ScoreInsert};

/// DashMap-backed store; cheap to clone via `Arc`.
#[derive(Default)]
pub struct MemoryLedger {
    players: DashMap<u64, Player>,
    /// Scores per player (append-only vectors)
    scores: DashMap<u64, Vec<Score>>,
    /// Payments per player
    payments: DashMap<u64, Vec<Payment>>,
    /// Subscriptions keyed by gateway reference
    subscriptions: DashMap<String, Subscription>,
    winners: DashMap<String, MonthlyWinnersRecord>,
    markers: DashMap<String, DateTime<Utc>>,
    /// Outbox in append order
    outbox: StdMutex<Vec<OutboxEvent>>,
    /// Per-player submission locks
    submit_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn submit_lock(&self, player_id: u64) -> Arc<Mutex<()>> {
        self.submit_locks
            .entry(player_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn count_attempts(&self, player_id: u64, day_key: &str) -> u32 {
        self.scores
            .get(&player_id)
            .map(|rows| rows.iter().filter(|s| s.day_key == day_key).count() as u32)
            .unwrap_or(0)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get_player(&self, player_id: u64) -> Result<Option<Player>, AppError> {
        Ok(self.players.get(&player_id).map(|p| p.clone()))
    }

    async fn upsert_player(&self, player: &Player) -> Result<(), AppError> {
        self.players.insert(player.player_id, player.clone());
        Ok(())
    }

    async fn delete_player_data(&self, player_id: u64) -> Result<usize, AppError> {
        let mut deleted = 0;

        if let Some((_, rows)) = self.scores.remove(&player_id) {
            deleted += rows.len();
        }
        if let Some((_, rows)) = self.payments.remove(&player_id) {
            deleted += rows.len();
        }
        let sub_refs: Vec<String> = self
            .subscriptions
            .iter()
            .filter(|e| e.value().player_id == player_id)
            .map(|e| e.key().clone())
            .collect();
        for r in sub_refs {
            self.subscriptions.remove(&r);
            deleted += 1;
        }
        if self.players.remove(&player_id).is_some() {
            deleted += 1;
        }

        tracing::info!(player_id, deleted, "Player data erased");
        Ok(deleted)
    }

    async fn record_score_atomic(
        &self,
        score: Score,
        quota: u32,
        event: OutboxEvent,
    ) -> Result<ScoreInsert, AppError> {
        let lock = self.submit_lock(score.player_id);
        let _guard = lock.lock().await;

        let used = self.count_attempts(score.player_id, &score.day_key);
        if used >= quota {
            return Ok(ScoreInsert::QuotaExhausted { games_today: used });
        }

        self.scores.entry(score.player_id).or_default().push(score);
        self.outbox
            .lock()
            .map_err(|_| AppError::Storage("outbox lock poisoned".to_string()))?
            .push(event);

        let games_today = used + 1;
        Ok(ScoreInsert::Recorded {
            games_today,
            remaining: quota - games_today,
        })
    }

    async fn attempts_today(&self, player_id: u64, day_key: &str) -> Result<u32, AppError> {
        Ok(self.count_attempts(player_id, day_key))
    }

    async fn scores_for_month(&self, month_key: &str) -> Result<Vec<Score>, AppError> {
        let mut out = Vec::new();
        for entry in self.scores.iter() {
            out.extend(
                entry
                    .value()
                    .iter()
                    .filter(|s| s.month_key == month_key)
                    .cloned(),
            );
        }
        Ok(out)
    }

    async fn scores_for_player_month(
        &self,
        player_id: u64,
        month_key: &str,
    ) -> Result<Vec<Score>, AppError> {
        Ok(self
            .scores
            .get(&player_id)
            .map(|rows| {
                rows.iter()
                    .filter(|s| s.month_key == month_key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn record_payment(
        &self,
        payment: Payment,
        event: OutboxEvent,
    ) -> Result<bool, AppError> {
        let duplicate = self.payments.iter().any(|e| {
            e.value()
                .iter()
                .any(|p| p.external_ref == payment.external_ref)
        });
        if duplicate {
            tracing::debug!(
                external_ref = %payment.external_ref,
                "Duplicate payment reference, skipping (webhook retry)"
            );
            return Ok(false);
        }

        self.payments
            .entry(payment.player_id)
            .or_default()
            .push(payment);
        self.outbox
            .lock()
            .map_err(|_| AppError::Storage("outbox lock poisoned".to_string()))?
            .push(event);
        Ok(true)
    }

    async fn payments_for_month(&self, month_key: &str) -> Result<Vec<Payment>, AppError> {
        let mut out = Vec::new();
        for entry in self.payments.iter() {
            out.extend(
                entry
                    .value()
                    .iter()
                    .filter(|p| p.month_key == month_key)
                    .cloned(),
            );
        }
        Ok(out)
    }

    async fn has_completed_payment(
        &self,
        player_id: u64,
        month_key: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .payments
            .get(&player_id)
            .map(|rows| {
                rows.iter()
                    .any(|p| p.month_key == month_key && p.status == PaymentStatus::Completed)
            })
            .unwrap_or(false))
    }

    async fn expire_one_off_payments(
        &self,
        month_key: &str,
        exempt: &HashSet<u64>,
    ) -> Result<u32, AppError> {
        let mut expired = 0;
        for mut entry in self.payments.iter_mut() {
            if exempt.contains(entry.key()) {
                continue;
            }
            for p in entry.value_mut().iter_mut() {
                if p.month_key == month_key
                    && p.kind == PaymentKind::OneOff
                    && p.status == PaymentStatus::Completed
                {
                    p.status = PaymentStatus::Expired;
                    expired += 1;
                }
            }
        }
        Ok(expired)
    }

    async fn upsert_subscription(&self, sub: &Subscription) -> Result<(), AppError> {
        self.subscriptions
            .insert(sub.external_ref.clone(), sub.clone());
        Ok(())
    }

    async fn subscription_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Subscription>, AppError> {
        Ok(self.subscriptions.get(external_ref).map(|s| s.clone()))
    }

    async fn active_subscription(&self, player_id: u64) -> Result<Option<Subscription>, AppError> {
        Ok(self
            .subscriptions
            .iter()
            .find(|e| e.value().player_id == player_id && e.value().is_active())
            .map(|e| e.value().clone()))
    }

    async fn cancel_subscription(
        &self,
        external_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        match self.subscriptions.get_mut(external_ref) {
            Some(mut sub) => {
                sub.status = SubscriptionStatus::Cancelled;
                sub.cancelled_at = Some(at);
                sub.next_billing = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn players_with_active_subscription(&self) -> Result<HashSet<u64>, AppError> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|e| e.value().is_active())
            .map(|e| e.value().player_id)
            .collect())
    }

    async fn winners_record(
        &self,
        month_key: &str,
    ) -> Result<Option<MonthlyWinnersRecord>, AppError> {
        Ok(self.winners.get(month_key).map(|r| r.clone()))
    }

    async fn put_winners_record(&self, record: &MonthlyWinnersRecord) -> Result<(), AppError> {
        self.winners
            .entry(record.month_key.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn rollover_marker(&self, month_key: &str) -> Result<bool, AppError> {
        Ok(self.markers.contains_key(month_key))
    }

    async fn put_rollover_marker(
        &self,
        month_key: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.markers.insert(month_key.to_string(), at);
        Ok(())
    }

    async fn append_events(&self, events: Vec<OutboxEvent>) -> Result<(), AppError> {
        self.outbox
            .lock()
            .map_err(|_| AppError::Storage("outbox lock poisoned".to_string()))?
            .extend(events);
        Ok(())
    }

    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, AppError> {
        Ok(self
            .outbox
            .lock()
            .map_err(|_| AppError::Storage("outbox lock poisoned".to_string()))?
            .iter()
            .filter(|e| !e.delivered)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_event_delivered(
        &self,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut outbox = self
            .outbox
            .lock()
            .map_err(|_| AppError::Storage("outbox lock poisoned".to_string()))?;
        if let Some(event) = outbox.iter_mut().find(|e| e.id == event_id) {
            event.delivered = true;
            event.delivered_at = Some(at);
        }
        Ok(())
    }
}
