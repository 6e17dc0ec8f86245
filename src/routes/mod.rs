// SPDX-License-Identifier: MIT

//! HTTP route handlers.

pub mod api;
pub mod auth;
pub mod tasks;
pub mod webhook;

use crate::middleware::auth::require_auth;
use crate::middleware::tasks_auth::require_tasks_auth;
use crate::AppState;
use axum::http::{header, Method};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
}

/// Health check response
async fn health_check() -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
    })
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer - allow requests from the game frontend and localhost (for dev)
    let frontend_url = state.config.frontend_url.clone();
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _request_parts: &axum::http::request::Parts| {
                let origin_str = origin.to_str().unwrap_or("");
                origin_str == frontend_url
                    || origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1")
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .merge(auth::routes())
        .merge(api::public_routes())
        .merge(webhook::routes());

    // Task handler routes (called by the maintenance scheduler)
    let task_routes = tasks::routes().route_layer(middleware::from_fn(require_tasks_auth));

    // Protected routes (session JWT required)
    let protected_routes =
        api::routes().route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(task_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(
            crate::middleware::security::add_security_headers,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Parse and validate a `?month=` query value, falling back to the
/// current competition month.
pub(crate) fn resolve_month(
    month: Option<String>,
    clock: &crate::clock::Clock,
) -> Result<String, crate::error::AppError> {
    match month {
        None => Ok(clock.month_key()),
        Some(m) => {
            // chrono parses unpadded forms like "2026-3"; those never match
            // stored keys, so only the canonical zero-padded form passes.
            let canonical = chrono::NaiveDate::parse_from_str(&format!("{m}-01"), "%Y-%m-%d")
                .map(|d| d.format("%Y-%m").to_string())
                .ok();
            if canonical.as_deref() != Some(m.as_str()) {
                return Err(crate::error::AppError::BadRequest(format!(
                    "invalid month '{m}', expected YYYY-MM"
                )));
            }
            Ok(m)
        }
    }
}
