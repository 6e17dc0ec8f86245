// SPDX-License-Identifier: MIT

//! Profile endpoint and account erasure tests.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

mod common;

fn authed(method: &str, uri: &str, token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn me_reports_usage_and_monthly_best() {
    let (app, state) = common::create_test_app();
    common::seed_paid_player(&state, 1, "Alice").await;
    let token = common::test_jwt(&state, 1);

    state.recorder.submit_score(1, 150).await.unwrap();
    state.recorder.submit_score(1, 320).await.unwrap();

    let response = app
        .oneshot(authed("GET", "/api/me", &token, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["player_id"], 1);
    assert_eq!(json["display_name"], "Alice");
    assert_eq!(json["has_access"], true);
    assert_eq!(json["monthly_best"], 320);
    assert_eq!(json["attempts_used"], 2);
    assert_eq!(json["attempts_remaining"], 3);
}

#[tokio::test]
async fn payout_email_is_validated_and_stored() {
    let (app, state) = common::create_test_app();
    common::seed_paid_player(&state, 1, "Alice").await;
    let token = common::test_jwt(&state, 1);

    let response = app
        .clone()
        .oneshot(authed(
            "PUT",
            "/api/me",
            &token,
            Body::from(r#"{"payout_email":"not-an-email"}"#),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(authed(
            "PUT",
            "/api/me",
            &token,
            Body::from(r#"{"payout_email":"alice@example.com"}"#),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let player = state.store.get_player(1).await.unwrap().unwrap();
    assert_eq!(player.payout_email.as_deref(), Some("alice@example.com"));
}

#[tokio::test]
async fn account_deletion_cascades() {
    let (app, state) = common::create_test_app();
    common::seed_paid_player(&state, 1, "Alice").await;
    common::seed_subscription(&state, 1, "sub-1").await;
    state.recorder.submit_score(1, 150).await.unwrap();

    let token = common::test_jwt(&state, 1);
    let response = app
        .oneshot(authed("DELETE", "/api/account", &token, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);

    assert!(state.store.get_player(1).await.unwrap().is_none());
    assert!(state
        .store
        .scores_for_player_month(1, "2026-03")
        .await
        .unwrap()
        .is_empty());
    assert!(!state.store.has_completed_payment(1, "2026-03").await.unwrap());
    assert!(state.store.active_subscription(1).await.unwrap().is_none());
}
