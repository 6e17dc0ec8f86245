// SPDX-License-Identifier: MIT

//! Runner-League: competition ledger for a monthly pay-to-compete game.
//!
//! This crate provides the backend API that gates score submission on
//! payment, enforces the daily attempt quota, ranks the monthly
//! leaderboard and closes each month with a prize payout record.

pub mod clock;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use clock::Clock;
use config::Config;
use services::{
    AccessControl, LeaderboardEngine, MonthlyRollover, OutboxDelivery, PrizeCalculator,
    ScoreRecorder,
};
use store::LedgerStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub clock: Clock,
    pub store: Arc<dyn LedgerStore>,
    pub access: AccessControl,
    pub recorder: ScoreRecorder,
    pub leaderboard: LeaderboardEngine,
    pub prizes: PrizeCalculator,
    pub rollover: MonthlyRollover,
    pub outbox: OutboxDelivery,
}

impl AppState {
    /// Wire the service graph over a store backend.
    pub fn new(config: Config, clock: Clock, store: Arc<dyn LedgerStore>) -> Self {
        let access = AccessControl::new(store.clone());
        let recorder = ScoreRecorder::new(
            store.clone(),
            access.clone(),
            clock.clone(),
            config.daily_attempt_quota,
            config.max_score,
        );
        let leaderboard = LeaderboardEngine::new(store.clone(), access.clone());
        let prizes = PrizeCalculator::new(
            store.clone(),
            config.prize_split,
            config.currency.clone(),
        );
        let rollover = MonthlyRollover::new(
            store.clone(),
            clock.clone(),
            leaderboard.clone(),
            prizes.clone(),
        );
        let outbox = OutboxDelivery::new(store.clone(), clock.clone(), config.notify_sink_url.clone());

        Self {
            config,
            clock,
            store,
            access,
            recorder,
            leaderboard,
            prizes,
            rollover,
            outbox,
        }
    }
}
