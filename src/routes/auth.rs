// SPDX-License-Identifier: MIT

//! Session issuance for the bot layer.
//!
//! The bot authenticates with a shared API key and asks for a game-session
//! JWT on behalf of a player. Access is gated here: an unpaid player gets a
//! 402 with the required action instead of a token, so the game client is
//! never launched for someone who cannot submit.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::middleware::auth::create_session_jwt;
use crate::models::Player;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/session", post(create_session))
}

#[derive(Deserialize)]
pub struct SessionRequest {
    /// Shared key identifying the bot layer
    pub api_key: String,
    pub player_id: u64,
    pub display_name: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub month_key: String,
    pub remaining_attempts: u32,
}

/// Issue a game-session JWT for a paid-up player.
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<SessionResponse>> {
    // Constant-time compare; the key is the only thing standing between
    // the internet and token issuance.
    let key_ok: bool = payload
        .api_key
        .as_bytes()
        .ct_eq(state.config.bot_api_key.as_bytes())
        .into();
    if !key_ok {
        tracing::warn!(player_id = payload.player_id, "Session request with bad API key");
        return Err(AppError::Unauthorized);
    }

    let now = state.clock.now();
    let month_key = state.clock.month_key_of(now);

    // Upsert the player profile on first contact, refresh it afterwards.
    match state.store.get_player(payload.player_id).await? {
        Some(mut player) => {
            player.display_name = payload.display_name;
            player.last_active = now;
            state.store.upsert_player(&player).await?;
        }
        None => {
            let player = Player::new(payload.player_id, payload.display_name, now);
            state.store.upsert_player(&player).await?;
            tracing::info!(player_id = payload.player_id, "New player registered");
        }
    }

    if !state.access.has_access(payload.player_id, &month_key).await? {
        return Err(AppError::AccessDenied { month_key });
    }

    let token = create_session_jwt(payload.player_id, &state.config.jwt_signing_key)?;
    let remaining_attempts = state.recorder.remaining_attempts(payload.player_id).await?;

    Ok(Json(SessionResponse {
        token,
        month_key,
        remaining_attempts,
    }))
}
