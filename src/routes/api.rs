// SPDX-License-Identifier: MIT

//! API routes for the game client.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthPlayer;
use crate::services::{LeaderboardEntry, Position, PrizeBreakdown, SubmitOutcome};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::resolve_month;

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Routes that require a session JWT.
/// The auth middleware is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/score", post(submit_score))
        .route("/api/position", get(get_position))
        .route("/api/me", get(get_me))
        .route("/api/me", put(update_me))
        .route("/api/account", delete(delete_account))
}

/// Read-only routes open to the frontend without a session.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/prize-pool", get(get_prize_pool))
}

// ─── Score submission ────────────────────────────────────────

#[derive(Deserialize)]
struct SubmitScoreRequest {
    value: u32,
}

/// Submit a score for the current month.
async fn submit_score(
    State(state): State<Arc<AppState>>,
    Extension(player): Extension<AuthPlayer>,
    Json(payload): Json<SubmitScoreRequest>,
) -> Result<Json<SubmitOutcome>> {
    let outcome = state
        .recorder
        .submit_score(player.player_id, payload.value)
        .await?;
    Ok(Json(outcome))
}

// ─── Leaderboard ─────────────────────────────────────────────

#[derive(Deserialize)]
struct MonthQuery {
    month: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct LeaderboardResponse {
    month_key: String,
    entries: Vec<LeaderboardEntry>,
}

/// Current standings for a month (defaults to the current one).
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MonthQuery>,
) -> Result<Json<LeaderboardResponse>> {
    let month_key = resolve_month(params.month, &state.clock)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .min(MAX_LEADERBOARD_LIMIT);

    let entries = state.leaderboard.leaderboard(&month_key, limit).await?;
    Ok(Json(LeaderboardResponse { month_key, entries }))
}

#[derive(Serialize)]
struct PositionResponse {
    month_key: String,
    #[serde(flatten)]
    position: Position,
}

/// The caller's rank for a month.
async fn get_position(
    State(state): State<Arc<AppState>>,
    Extension(player): Extension<AuthPlayer>,
    Query(params): Query<MonthQuery>,
) -> Result<Json<PositionResponse>> {
    let month_key = resolve_month(params.month, &state.clock)?;
    let position = state
        .leaderboard
        .user_position(player.player_id, &month_key)
        .await?;
    Ok(Json(PositionResponse { month_key, position }))
}

/// Pool total and per-rank payouts for a month.
async fn get_prize_pool(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MonthQuery>,
) -> Result<Json<PrizeBreakdown>> {
    let month_key = resolve_month(params.month, &state.clock)?;
    let breakdown = state.prizes.prize_pool(&month_key).await?;
    Ok(Json(breakdown))
}

// ─── Player profile ──────────────────────────────────────────

#[derive(Serialize)]
struct MeResponse {
    player_id: u64,
    display_name: String,
    payout_email: Option<String>,
    has_access: bool,
    month_key: String,
    monthly_best: Option<u32>,
    attempts_used: u32,
    attempts_remaining: u32,
}

/// Current player profile with usage counters.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(player): Extension<AuthPlayer>,
) -> Result<Json<MeResponse>> {
    let profile = state
        .store
        .get_player(player.player_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Player {} not found", player.player_id)))?;

    let month_key = state.clock.month_key();
    let has_access = state.access.has_access(player.player_id, &month_key).await?;
    let attempts_used = state
        .store
        .attempts_today(player.player_id, &state.clock.day_key())
        .await?;
    let monthly_best = state
        .store
        .scores_for_player_month(player.player_id, &month_key)
        .await?
        .iter()
        .map(|s| s.value)
        .max();

    Ok(Json(MeResponse {
        player_id: profile.player_id,
        display_name: profile.display_name,
        payout_email: profile.payout_email,
        has_access,
        month_key,
        monthly_best,
        attempts_used,
        attempts_remaining: state.config.daily_attempt_quota.saturating_sub(attempts_used),
    }))
}

#[derive(Deserialize, Validate)]
struct UpdateMeRequest {
    /// Where any prize money should be sent
    #[validate(email)]
    payout_email: Option<String>,
    #[validate(length(min = 1, max = 64))]
    display_name: Option<String>,
}

#[derive(Serialize)]
struct UpdateMeResponse {
    player_id: u64,
    display_name: String,
    payout_email: Option<String>,
}

/// Update payout email or display name.
async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(player): Extension<AuthPlayer>,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<UpdateMeResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut profile = state
        .store
        .get_player(player.player_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Player {} not found", player.player_id)))?;

    if let Some(email) = payload.payout_email {
        profile.payout_email = Some(email);
    }
    if let Some(name) = payload.display_name {
        profile.display_name = name;
    }
    profile.last_active = state.clock.now();
    state.store.upsert_player(&profile).await?;

    Ok(Json(UpdateMeResponse {
        player_id: profile.player_id,
        display_name: profile.display_name,
        payout_email: profile.payout_email,
    }))
}

// ─── Account deletion ────────────────────────────────────────

#[derive(Serialize)]
struct DeleteAccountResponse {
    success: bool,
    documents_removed: usize,
}

/// Delete the player's account and all associated data.
///
/// Cascades over scores, payments and subscriptions. Closed-month winners
/// records are kept; they are the payout audit trail.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(player): Extension<AuthPlayer>,
) -> Result<Json<DeleteAccountResponse>> {
    tracing::info!(
        player_id = player.player_id,
        "User-initiated account deletion"
    );

    let documents_removed = state.store.delete_player_data(player.player_id).await?;

    Ok(Json(DeleteAccountResponse {
        success: true,
        documents_removed,
    }))
}
