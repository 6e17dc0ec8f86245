// SPDX-License-Identifier: MIT

//! Access control: may this player submit scores for this month?
//!
//! The canonical truth is the Payment and Subscription rows, never the
//! denormalized per-player flag. Read-only; on storage failure the error
//! propagates and callers treat it as denial (fail closed, never open).

use std::sync::Arc;

use crate::error::AppError;
use crate::store::LedgerStore;

#[derive(Clone)]
pub struct AccessControl {
    store: Arc<dyn LedgerStore>,
}

impl AccessControl {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// True if a completed payment exists for `month_key`, or the player
    /// holds an active subscription (which covers every month while active).
    pub async fn has_access(&self, player_id: u64, month_key: &str) -> Result<bool, AppError> {
        if self.store.has_completed_payment(player_id, month_key).await? {
            return Ok(true);
        }
        Ok(self.store.active_subscription(player_id).await?.is_some())
    }
}
