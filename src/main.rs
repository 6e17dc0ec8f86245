// SPDX-License-Identifier: MIT

//! Runner-League API Server
//!
//! Competition ledger backend: payment-gated score submission, daily
//! attempt quotas, monthly leaderboard and prize pool, idempotent
//! month-end rollover.

use std::sync::Arc;
use std::time::Duration;

use runner_league::{
    clock::Clock,
    config::Config,
    store::{FirestoreLedger, LedgerStore, MemoryLedger},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Runner-League API");

    let clock = Clock::new(config.tz_offset_minutes);

    let store: Arc<dyn LedgerStore> = match config.store_backend.as_str() {
        "firestore" => {
            let ledger = FirestoreLedger::new(
                &config.gcp_project_id,
                Duration::from_millis(config.store_timeout_ms),
            )
            .await
            .expect("Failed to connect to Firestore");
            tracing::info!(project = %config.gcp_project_id, "Firestore ledger initialized");
            Arc::new(ledger)
        }
        "memory" => {
            tracing::warn!("Using in-memory ledger; all data is lost on restart");
            Arc::new(MemoryLedger::new())
        }
        other => panic!("Unknown STORE_BACKEND '{other}', expected 'memory' or 'firestore'"),
    };

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), clock, store));

    // Build router
    let app = runner_league::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runner_league=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
