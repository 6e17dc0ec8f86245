// SPDX-License-Identifier: MIT

//! JWT session authentication middleware.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session tokens expire after one day; the bot mints a fresh one per game
/// launch, so longer lifetimes buy nothing.
const SESSION_TTL_SECS: usize = 24 * 60 * 60;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (player ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated player extracted from JWT.
#[derive(Debug, Clone)]
pub struct AuthPlayer {
    pub player_id: u64,
}

/// Middleware that requires a valid session JWT in the Authorization header.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    let key = DecodingKey::from_secret(&state.config.jwt_signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let token_data =
        decode::<Claims>(token, &key, &validation).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let player_id: u64 = token_data
        .claims
        .sub
        .parse()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(AuthPlayer { player_id });

    Ok(next.run(request).await)
}

/// Create a session JWT for a player.
pub fn create_session_jwt(player_id: u64, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: player_id.to_string(),
        iat: now,
        exp: now + SESSION_TTL_SECS,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_round_trip() {
        let key = b"test_jwt_key_32_bytes_minimum!!";
        let token = create_session_jwt(42, key).unwrap();

        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(key),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();

        assert_eq!(decoded.claims.sub, "42");
        assert_eq!(decoded.claims.exp - decoded.claims.iat, SESSION_TTL_SECS);
    }

    #[test]
    fn jwt_rejects_wrong_key() {
        let token = create_session_jwt(42, b"correct_key_aaaaaaaaaaaaaaaaaaa").unwrap();

        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"different_key_bbbbbbbbbbbbbbbbb"),
            &Validation::new(Algorithm::HS256),
        );

        assert!(result.is_err());
    }
}
