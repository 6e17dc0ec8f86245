// SPDX-License-Identifier: MIT

//! Task handler routes for the maintenance scheduler.
//!
//! These endpoints are called by the scheduler, not directly by users; the
//! queue-header middleware in routes/mod.rs gates them. Both are idempotent,
//! so the scheduler can fire them at any frequency, and both surface
//! failures as 5xx so the scheduler retries.

use crate::config::OUTBOX_BATCH_SIZE;
use crate::error::Result;
use crate::services::{DeliveryReport, RolloverOutcome};
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;

/// Task handler routes (called by the scheduler).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/monthly-rollover", post(monthly_rollover))
        .route("/tasks/deliver-events", post(deliver_events))
}

/// Close the previous competition month if it is still open.
async fn monthly_rollover(State(state): State<Arc<AppState>>) -> Result<Json<RolloverOutcome>> {
    let outcome = state.rollover.run_if_due().await?;
    match &outcome {
        RolloverOutcome::Closed {
            month_key,
            winners,
            pool_minor,
        } => {
            tracing::info!(
                month_key = %month_key,
                winners = *winners,
                pool_minor = *pool_minor,
                "Monthly rollover completed"
            );
        }
        RolloverOutcome::AlreadyClosed { month_key } => {
            tracing::debug!(month_key = %month_key, "Rollover already done, no-op");
        }
    }
    Ok(Json(outcome))
}

/// Push pending outbox events to the notification sink.
async fn deliver_events(State(state): State<Arc<AppState>>) -> Result<Json<DeliveryReport>> {
    let report = state.outbox.deliver_pending(OUTBOX_BATCH_SIZE).await?;
    Ok(Json(report))
}
