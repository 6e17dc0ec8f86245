// SPDX-License-Identifier: MIT

//! Webhook routes for payment gateway events.
//!
//! The gateway signs each delivery with HMAC-SHA256 over the raw body; the
//! path carries an unguessable UUID as a second factor. Deliveries are
//! at-least-once and can arrive out of order, so every mutation behind this
//! endpoint is idempotent. Response codes steer the gateway's retries:
//! 200 acknowledges (including payloads we cannot parse, retrying those is
//! pointless), 503 asks for a retry after a storage failure.

use crate::error::AppError;
use crate::models::{
    EventKind, OutboxEvent, Payment, PaymentKind, PaymentStatus, Player, Subscription,
    SubscriptionStatus,
};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/{uuid}", post(handle_event))
}

/// Gateway event payload. Fields beyond `event_type` are per-event.
#[derive(Deserialize, Debug)]
struct GatewayEvent {
    event_type: String,
    /// Gateway's ID for the charge or subscription
    external_ref: String,
    #[serde(default)]
    player_id: Option<u64>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    amount_minor: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    /// Parent subscription for billing-cycle charges
    #[serde(default)]
    subscription_ref: Option<String>,
    #[serde(default)]
    next_billing: Option<DateTime<Utc>>,
}

fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Handle incoming gateway events (POST).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if uuid != state.config.webhook_path_uuid {
        tracing::warn!(
            received_uuid = %uuid,
            "Security Alert: Webhook path UUID mismatch"
        );
        return StatusCode::NOT_FOUND;
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    if !verify_signature(&state.config.webhook_secret, &body, signature) {
        tracing::warn!("Security Alert: Webhook signature verification failed");
        return StatusCode::FORBIDDEN;
    }

    let event: GatewayEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse webhook event");
            return StatusCode::OK; // Acknowledge; a retry would fail the same way
        }
    };

    tracing::info!(
        event_type = %event.event_type,
        external_ref = %event.external_ref,
        "Webhook event received"
    );

    let result = match event.event_type.as_str() {
        "payment.completed" => payment_completed(&state, &event).await,
        "subscription.activated" => subscription_activated(&state, &event).await,
        "subscription.payment.completed" => subscription_charge(&state, &event).await,
        "subscription.cancelled" => subscription_cancelled(&state, &event).await,
        other => {
            tracing::debug!(event_type = %other, "Ignoring unhandled gateway event type");
            Ok(())
        }
    };

    match result {
        Ok(()) => StatusCode::OK,
        Err(AppError::BadRequest(reason)) => {
            tracing::warn!(reason = %reason, "Webhook event missing required fields");
            StatusCode::OK // Acknowledge; the payload will not improve on retry
        }
        Err(e) => {
            tracing::error!(error = %e, "Webhook processing failed, requesting retry");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Make sure a profile row exists for a player we only know from the gateway.
async fn ensure_player(state: &AppState, player_id: u64, display_name: Option<&str>) -> Result<(), AppError> {
    if state.store.get_player(player_id).await?.is_none() {
        let name = display_name
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("Player {player_id}"));
        let player = Player::new(player_id, name, state.clock.now());
        state.store.upsert_player(&player).await?;
    }
    Ok(())
}

/// One-off entry fee paid: grants access for the current month.
async fn payment_completed(state: &AppState, event: &GatewayEvent) -> Result<(), AppError> {
    let player_id = event
        .player_id
        .ok_or_else(|| AppError::BadRequest("payment.completed without player_id".into()))?;
    let amount_minor = event
        .amount_minor
        .ok_or_else(|| AppError::BadRequest("payment.completed without amount_minor".into()))?;

    ensure_player(state, player_id, event.display_name.as_deref()).await?;

    let now = state.clock.now();
    let month_key = state.clock.month_key_of(now);
    let payment = Payment {
        player_id,
        amount_minor,
        currency: event
            .currency
            .clone()
            .unwrap_or_else(|| state.config.currency.clone()),
        kind: PaymentKind::OneOff,
        month_key: month_key.clone(),
        status: PaymentStatus::Completed,
        external_ref: event.external_ref.clone(),
        recorded_at: now,
    };
    let outbox = OutboxEvent::new(
        EventKind::PaymentRecorded,
        serde_json::json!({
            "player_id": player_id,
            "amount_minor": amount_minor,
            "month_key": month_key,
            "kind": "one_off",
        }),
        now,
    );

    let inserted = state.store.record_payment(payment, outbox).await?;
    if !inserted {
        tracing::info!(
            external_ref = %event.external_ref,
            "Duplicate payment delivery skipped"
        );
    }
    Ok(())
}

/// New subscription: access for every month while it stays active.
///
/// Redeliveries never resurrect a subscription: once a reference is known,
/// its status is owned by the cancel path and cancellation is terminal.
async fn subscription_activated(state: &AppState, event: &GatewayEvent) -> Result<(), AppError> {
    let player_id = event
        .player_id
        .ok_or_else(|| AppError::BadRequest("subscription.activated without player_id".into()))?;

    ensure_player(state, player_id, event.display_name.as_deref()).await?;

    if let Some(existing) = state.store.subscription_by_ref(&event.external_ref).await? {
        tracing::info!(
            external_ref = %event.external_ref,
            status = ?existing.status,
            "Duplicate activation delivery skipped"
        );
        if existing.is_active() {
            if let Some(next_billing) = event.next_billing {
                let mut updated = existing;
                updated.next_billing = Some(next_billing);
                state.store.upsert_subscription(&updated).await?;
            }
        }
        return Ok(());
    }

    let now = state.clock.now();
    let sub = Subscription {
        player_id,
        external_ref: event.external_ref.clone(),
        status: SubscriptionStatus::Active,
        amount_minor: event.amount_minor.unwrap_or(state.config.entry_fee_minor),
        next_billing: event.next_billing,
        created_at: now,
        cancelled_at: None,
    };
    state.store.upsert_subscription(&sub).await?;
    tracing::info!(player_id, external_ref = %event.external_ref, "Subscription activated");
    Ok(())
}

/// Billing-cycle charge on a subscription: recorded as a Payment row so the
/// prize pool accounts for subscribers too.
async fn subscription_charge(state: &AppState, event: &GatewayEvent) -> Result<(), AppError> {
    let subscription_ref = event.subscription_ref.as_deref().ok_or_else(|| {
        AppError::BadRequest("subscription.payment.completed without subscription_ref".into())
    })?;

    let Some(sub) = state.store.subscription_by_ref(subscription_ref).await? else {
        // Activation may still be in flight; a retry will find it.
        return Err(AppError::Storage(format!(
            "charge for unknown subscription {subscription_ref}"
        )));
    };

    let now = state.clock.now();
    let month_key = state.clock.month_key_of(now);
    let amount_minor = event.amount_minor.unwrap_or(sub.amount_minor);
    let payment = Payment {
        player_id: sub.player_id,
        amount_minor,
        currency: event
            .currency
            .clone()
            .unwrap_or_else(|| state.config.currency.clone()),
        kind: PaymentKind::SubscriptionCharge,
        month_key: month_key.clone(),
        status: PaymentStatus::Completed,
        external_ref: event.external_ref.clone(),
        recorded_at: now,
    };
    let outbox = OutboxEvent::new(
        EventKind::PaymentRecorded,
        serde_json::json!({
            "player_id": sub.player_id,
            "amount_minor": amount_minor,
            "month_key": month_key,
            "kind": "subscription_charge",
        }),
        now,
    );

    state.store.record_payment(payment, outbox).await?;

    if let Some(next_billing) = event.next_billing {
        let mut updated = sub;
        updated.next_billing = Some(next_billing);
        state.store.upsert_subscription(&updated).await?;
    }
    Ok(())
}

/// Subscription cancelled: access lapses at the next rollover.
async fn subscription_cancelled(state: &AppState, event: &GatewayEvent) -> Result<(), AppError> {
    let existed = state
        .store
        .cancel_subscription(&event.external_ref, state.clock.now())
        .await?;
    if !existed {
        tracing::warn!(
            external_ref = %event.external_ref,
            "Cancellation for unknown subscription"
        );
    }
    Ok(())
}
