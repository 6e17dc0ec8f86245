// SPDX-License-Identifier: MIT

//! Payment gateway webhook tests: signatures, idempotency, event handling.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

mod common;

fn webhook_request(uuid: &str, body: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/webhook/{uuid}"))
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-gateway-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn signed_request(state: &runner_league::AppState, body: &str) -> Request<Body> {
    let signature = common::sign_webhook(&state.config.webhook_secret, body.as_bytes());
    webhook_request(&state.config.webhook_path_uuid, body, &signature)
}

#[tokio::test]
async fn wrong_path_uuid_is_404() {
    let (app, state) = common::create_test_app();
    let body = r#"{"event_type":"payment.completed","external_ref":"x"}"#;
    let signature = common::sign_webhook(&state.config.webhook_secret, body.as_bytes());

    let response = app
        .oneshot(webhook_request("wrong-uuid", body, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_signature_is_403() {
    let (app, state) = common::create_test_app();
    let body = r#"{"event_type":"payment.completed","external_ref":"x"}"#;

    let response = app
        .oneshot(webhook_request(
            &state.config.webhook_path_uuid,
            body,
            "deadbeef",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_payload_is_acknowledged() {
    let (app, state) = common::create_test_app();
    let body = r#"{"not":"an event"}"#;

    let response = app.oneshot(signed_request(&state, body)).await.unwrap();
    // 200 so the gateway does not retry a payload that can never parse.
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn completed_payment_grants_access() {
    let (app, state) = common::create_test_app();

    let body = serde_json::json!({
        "event_type": "payment.completed",
        "external_ref": "pay-abc",
        "player_id": 7,
        "display_name": "Grace",
        "amount_minor": 1_000,
        "currency": "CHF",
    })
    .to_string();

    let response = app.oneshot(signed_request(&state, &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(state.access.has_access(7, "2026-03").await.unwrap());

    // The profile was created from the gateway data.
    let player = state.store.get_player(7).await.unwrap().unwrap();
    assert_eq!(player.display_name, "Grace");
}

#[tokio::test]
async fn duplicate_payment_delivery_counts_once() {
    let (app, state) = common::create_test_app();

    let body = serde_json::json!({
        "event_type": "payment.completed",
        "external_ref": "pay-dup",
        "player_id": 7,
        "amount_minor": 1_000,
    })
    .to_string();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(signed_request(&state, &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let payments = state.store.payments_for_month("2026-03").await.unwrap();
    assert_eq!(payments.len(), 1);
}

#[tokio::test]
async fn subscription_lifecycle() {
    let (app, state) = common::create_test_app();

    // Activation grants access with no payment row yet.
    let activated = serde_json::json!({
        "event_type": "subscription.activated",
        "external_ref": "sub-1",
        "player_id": 9,
        "display_name": "Heidi",
        "amount_minor": 1_000,
    })
    .to_string();
    let response = app
        .clone()
        .oneshot(signed_request(&state, &activated))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.access.has_access(9, "2026-03").await.unwrap());

    // A billing-cycle charge lands as a Payment row for pool accounting.
    let charged = serde_json::json!({
        "event_type": "subscription.payment.completed",
        "external_ref": "charge-1",
        "subscription_ref": "sub-1",
        "amount_minor": 1_000,
    })
    .to_string();
    let response = app
        .clone()
        .oneshot(signed_request(&state, &charged))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payments = state.store.payments_for_month("2026-03").await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].player_id, 9);

    // Cancellation ends the subscription, but the month already charged
    // stays paid for.
    let cancelled = serde_json::json!({
        "event_type": "subscription.cancelled",
        "external_ref": "sub-1",
    })
    .to_string();
    let response = app
        .oneshot(signed_request(&state, &cancelled))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(state
        .store
        .active_subscription(9)
        .await
        .unwrap()
        .is_none());
    assert!(state.access.has_access(9, "2026-03").await.unwrap());
}

#[tokio::test]
async fn redelivered_activation_cannot_resurrect_cancelled_subscription() {
    let (app, state) = common::create_test_app();

    let activated = serde_json::json!({
        "event_type": "subscription.activated",
        "external_ref": "sub-3",
        "player_id": 11,
        "display_name": "Ivan",
        "amount_minor": 1_000,
    })
    .to_string();
    let cancelled = serde_json::json!({
        "event_type": "subscription.cancelled",
        "external_ref": "sub-3",
    })
    .to_string();

    for body in [&activated, &cancelled] {
        let response = app
            .clone()
            .oneshot(signed_request(&state, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Gateways redeliver at-least-once; a stale activation arriving after
    // the cancellation must not bring the subscription back.
    let response = app
        .oneshot(signed_request(&state, &activated))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(state
        .store
        .active_subscription(11)
        .await
        .unwrap()
        .is_none());
    assert!(!state.access.has_access(11, "2026-03").await.unwrap());
}

#[tokio::test]
async fn charge_for_unknown_subscription_asks_for_retry() {
    let (app, state) = common::create_test_app();

    // The gateway can deliver the first charge before the activation event.
    let charged = serde_json::json!({
        "event_type": "subscription.payment.completed",
        "external_ref": "charge-1",
        "subscription_ref": "sub-unseen",
        "amount_minor": 1_000,
    })
    .to_string();

    let response = app.oneshot(signed_request(&state, &charged)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
