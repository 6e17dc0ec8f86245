// SPDX-License-Identifier: MIT

//! Monthly rollover: winner freezing, payment expiry, idempotency.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use runner_league::clock::Clock;
use runner_league::config::{Config, MAINTENANCE_QUEUE_NAME};
use runner_league::error::AppError;
use runner_league::models::{
    EventKind, MonthlyWinnersRecord, OutboxEvent, Payment, Player, Score, Subscription,
};
use runner_league::services::RolloverOutcome;
use runner_league::store::{LedgerStore, MemoryLedger, ScoreInsert};
use tower::ServiceExt;

mod common;

fn rollover_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/tasks/monthly-rollover")
        .header("x-scheduler-queue", MAINTENANCE_QUEUE_NAME)
        .body(Body::empty())
        .unwrap()
}

/// Build a February with four paid players and scores, ranked 1..=4.
async fn seed_february(state: &runner_league::AppState) {
    let feb = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
    for (id, score) in [(1u64, 400u32), (2, 300), (3, 200), (4, 100)] {
        common::seed_player(state, id, &format!("P{id}")).await;
        common::seed_payment(state, id, "2026-02").await;
        common::seed_score(
            state,
            id,
            score,
            "2026-02",
            "2026-02-10",
            feb + Duration::minutes(id as i64),
        )
        .await;
    }
}

#[tokio::test]
async fn rollover_freezes_winners_with_payouts() {
    let (app, state) = common::create_test_app();
    seed_february(&state).await;

    let response = app.oneshot(rollover_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["outcome"], "closed");
    assert_eq!(json["month_key"], "2026-02");
    assert_eq!(json["winners"], 3);
    assert_eq!(json["pool_minor"], 4_000);

    let record = state
        .store
        .winners_record("2026-02")
        .await
        .unwrap()
        .expect("winners record written");
    assert_eq!(record.winners.len(), 3);
    assert_eq!(record.player_count, 4);
    assert_eq!(record.winners[0].player_id, 1);
    assert_eq!(record.winners[0].best_score, 400);
    assert_eq!(record.winners[0].payout_minor, 1_600); // 40% of 40.00
    assert_eq!(record.winners[1].payout_minor, 600); // 15%
    assert_eq!(record.winners[2].payout_minor, 200); // 5%
}

#[tokio::test]
async fn rollover_is_idempotent() {
    let (app, state) = common::create_test_app();
    seed_february(&state).await;

    let first = app.clone().oneshot(rollover_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(rollover_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = axum::body::to_bytes(second.into_body(), 1024).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["outcome"], "already_closed");

    // The winners record was written exactly once and kept intact.
    let record = state.store.winners_record("2026-02").await.unwrap().unwrap();
    assert_eq!(record.winners.len(), 3);

    // Winner events were appended exactly once.
    let events = state.store.pending_events(100).await.unwrap();
    let winner_events = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::WinnerDecided))
        .count();
    assert_eq!(winner_events, 3);
}

#[tokio::test]
async fn rollover_expires_one_off_access_but_spares_subscribers() {
    let (app, state) = common::create_test_app();
    common::seed_player(&state, 1, "OneOff").await;
    common::seed_payment(&state, 1, "2026-02").await;
    common::seed_player(&state, 2, "Subscriber").await;
    common::seed_payment(&state, 2, "2026-02").await;
    common::seed_subscription(&state, 2, "sub-2").await;

    assert!(state.access.has_access(1, "2026-02").await.unwrap());
    assert!(state.access.has_access(2, "2026-02").await.unwrap());

    let response = app.oneshot(rollover_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The one-off player lost access; the subscriber kept it.
    assert!(!state.access.has_access(1, "2026-02").await.unwrap());
    assert!(state.access.has_access(2, "2026-02").await.unwrap());
}

/// Store wrapper that fails the first outbox append, simulating a crash
/// between freezing winners and notifying them.
struct FlakyOutboxStore {
    inner: MemoryLedger,
    fail_next_append: AtomicBool,
}

#[async_trait]
impl LedgerStore for FlakyOutboxStore {
    async fn get_player(&self, player_id: u64) -> Result<Option<Player>, AppError> {
        self.inner.get_player(player_id).await
    }
    async fn upsert_player(&self, player: &Player) -> Result<(), AppError> {
        self.inner.upsert_player(player).await
    }
    async fn delete_player_data(&self, player_id: u64) -> Result<usize, AppError> {
        self.inner.delete_player_data(player_id).await
    }
    async fn record_score_atomic(
        &self,
        score: Score,
        quota: u32,
        event: OutboxEvent,
    ) -> Result<ScoreInsert, AppError> {
        self.inner.record_score_atomic(score, quota, event).await
    }
    async fn attempts_today(&self, player_id: u64, day_key: &str) -> Result<u32, AppError> {
        self.inner.attempts_today(player_id, day_key).await
    }
    async fn scores_for_month(&self, month_key: &str) -> Result<Vec<Score>, AppError> {
        self.inner.scores_for_month(month_key).await
    }
    async fn scores_for_player_month(
        &self,
        player_id: u64,
        month_key: &str,
    ) -> Result<Vec<Score>, AppError> {
        self.inner.scores_for_player_month(player_id, month_key).await
    }
    async fn record_payment(
        &self,
        payment: Payment,
        event: OutboxEvent,
    ) -> Result<bool, AppError> {
        self.inner.record_payment(payment, event).await
    }
    async fn payments_for_month(&self, month_key: &str) -> Result<Vec<Payment>, AppError> {
        self.inner.payments_for_month(month_key).await
    }
    async fn has_completed_payment(
        &self,
        player_id: u64,
        month_key: &str,
    ) -> Result<bool, AppError> {
        self.inner.has_completed_payment(player_id, month_key).await
    }
    async fn expire_one_off_payments(
        &self,
        month_key: &str,
        exempt: &HashSet<u64>,
    ) -> Result<u32, AppError> {
        self.inner.expire_one_off_payments(month_key, exempt).await
    }
    async fn upsert_subscription(&self, sub: &Subscription) -> Result<(), AppError> {
        self.inner.upsert_subscription(sub).await
    }
    async fn subscription_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Subscription>, AppError> {
        self.inner.subscription_by_ref(external_ref).await
    }
    async fn active_subscription(&self, player_id: u64) -> Result<Option<Subscription>, AppError> {
        self.inner.active_subscription(player_id).await
    }
    async fn cancel_subscription(
        &self,
        external_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.inner.cancel_subscription(external_ref, at).await
    }
    async fn players_with_active_subscription(&self) -> Result<HashSet<u64>, AppError> {
        self.inner.players_with_active_subscription().await
    }
    async fn winners_record(
        &self,
        month_key: &str,
    ) -> Result<Option<MonthlyWinnersRecord>, AppError> {
        self.inner.winners_record(month_key).await
    }
    async fn put_winners_record(&self, record: &MonthlyWinnersRecord) -> Result<(), AppError> {
        self.inner.put_winners_record(record).await
    }
    async fn rollover_marker(&self, month_key: &str) -> Result<bool, AppError> {
        self.inner.rollover_marker(month_key).await
    }
    async fn put_rollover_marker(
        &self,
        month_key: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.inner.put_rollover_marker(month_key, at).await
    }
    async fn append_events(&self, events: Vec<OutboxEvent>) -> Result<(), AppError> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(AppError::Storage("outbox write lost".into()));
        }
        self.inner.append_events(events).await
    }
    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, AppError> {
        self.inner.pending_events(limit).await
    }
    async fn mark_event_delivered(
        &self,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.inner.mark_event_delivered(event_id, at).await
    }
}

#[tokio::test]
async fn rollover_retry_recovers_winner_events() {
    let config = Config::test_default();
    let clock = Clock::fixed(common::test_now(), config.tz_offset_minutes);
    let store = std::sync::Arc::new(FlakyOutboxStore {
        inner: MemoryLedger::new(),
        fail_next_append: AtomicBool::new(true),
    });
    let state = std::sync::Arc::new(runner_league::AppState::new(config, clock, store));
    seed_february(&state).await;

    // First run dies after the winners record is frozen but before the
    // notifications are durable.
    let first = state.rollover.run_if_due().await;
    assert!(first.is_err());
    let record = state
        .store
        .winners_record("2026-02")
        .await
        .unwrap()
        .expect("winners record survives the failed run");
    assert_eq!(record.winners.len(), 3);
    assert!(!state.store.rollover_marker("2026-02").await.unwrap());

    // The retry resumes from the frozen record and the payout events
    // reach the outbox even though standings are gone by now.
    let second = state.rollover.run_if_due().await.unwrap();
    assert!(matches!(second, RolloverOutcome::Closed { winners: 3, .. }));
    assert!(state.store.rollover_marker("2026-02").await.unwrap());

    let events = state.store.pending_events(100).await.unwrap();
    let winner_events: Vec<_> = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::WinnerDecided))
        .collect();
    assert_eq!(winner_events.len(), 3);
    assert_eq!(winner_events[0].payload["payout_minor"], 1_600);
}

#[tokio::test]
async fn empty_month_still_closes() {
    let (app, state) = common::create_test_app();

    let response = app.oneshot(rollover_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["outcome"], "closed");
    assert_eq!(json["winners"], 0);
    assert_eq!(json["pool_minor"], 0);

    let record = state.store.winners_record("2026-02").await.unwrap().unwrap();
    assert!(record.winners.is_empty());
    assert!(state.store.rollover_marker("2026-02").await.unwrap());
}
