// SPDX-License-Identifier: MIT

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use runner_league::clock::Clock;
use runner_league::config::Config;
use runner_league::middleware::auth::create_session_jwt;
use runner_league::models::{
    EventKind, OutboxEvent, Payment, PaymentKind, PaymentStatus, Player, Score, Subscription,
    SubscriptionStatus,
};
use runner_league::routes::create_router;
use runner_league::store::MemoryLedger;
use runner_league::AppState;

/// Check if the Firestore emulator is reachable via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// The frozen "now" all HTTP-level tests run at: 2026-03-15 12:00 UTC,
/// competition zone +02:00, so the open month is 2026-03.
#[allow(dead_code)]
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
}

/// Create a test app over the in-memory ledger at the frozen test time.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with(Config::test_default())
}

/// Same, with a caller-tweaked config.
#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> (axum::Router, Arc<AppState>) {
    let clock = Clock::fixed(test_now(), config.tz_offset_minutes);
    let store = Arc::new(MemoryLedger::new());
    let state = Arc::new(AppState::new(config, clock, store));
    (create_router(state.clone()), state)
}

/// Create a session JWT with the test signing key.
#[allow(dead_code)]
pub fn test_jwt(state: &AppState, player_id: u64) -> String {
    create_session_jwt(player_id, &state.config.jwt_signing_key).unwrap()
}

/// Hex HMAC-SHA256 signature over a webhook body.
#[allow(dead_code)]
pub fn sign_webhook(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[allow(dead_code)]
pub async fn seed_player(state: &AppState, player_id: u64, name: &str) {
    let player = Player::new(player_id, name.to_string(), state.clock.now());
    state.store.upsert_player(&player).await.unwrap();
}

/// Record a completed one-off payment granting access for `month_key`.
#[allow(dead_code)]
pub async fn seed_payment(state: &AppState, player_id: u64, month_key: &str) {
    let now = state.clock.now();
    let payment = Payment {
        player_id,
        amount_minor: state.config.entry_fee_minor,
        currency: state.config.currency.clone(),
        kind: PaymentKind::OneOff,
        month_key: month_key.to_string(),
        status: PaymentStatus::Completed,
        external_ref: format!("seed-pay-{player_id}-{month_key}"),
        recorded_at: now,
    };
    let event = OutboxEvent::new(EventKind::PaymentRecorded, serde_json::json!({}), now);
    state.store.record_payment(payment, event).await.unwrap();
}

#[allow(dead_code)]
pub async fn seed_subscription(state: &AppState, player_id: u64, external_ref: &str) {
    let now = state.clock.now();
    let sub = Subscription {
        player_id,
        external_ref: external_ref.to_string(),
        status: SubscriptionStatus::Active,
        amount_minor: state.config.entry_fee_minor,
        next_billing: None,
        created_at: now,
        cancelled_at: None,
    };
    state.store.upsert_subscription(&sub).await.unwrap();
}

/// Insert a score row directly, bypassing the submission workflow.
/// Useful for building historic months.
#[allow(dead_code)]
pub async fn seed_score(
    state: &AppState,
    player_id: u64,
    value: u32,
    month_key: &str,
    day_key: &str,
    recorded_at: DateTime<Utc>,
) {
    let score = Score {
        score_id: uuid::Uuid::new_v4().to_string(),
        player_id,
        value,
        recorded_at,
        month_key: month_key.to_string(),
        day_key: day_key.to_string(),
    };
    let event = OutboxEvent::new(EventKind::ScoreRecorded, serde_json::json!({}), recorded_at);
    state
        .store
        .record_score_atomic(score, u32::MAX, event)
        .await
        .unwrap();
}

/// Shorthand for a paid-up player with a profile.
#[allow(dead_code)]
pub async fn seed_paid_player(state: &AppState, player_id: u64, name: &str) {
    seed_player(state, player_id, name).await;
    let month_key = state.clock.month_key();
    seed_payment(state, player_id, &month_key).await;
}
