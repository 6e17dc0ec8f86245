// SPDX-License-Identifier: MIT

//! Prize calculator: monthly pool and per-rank payouts.
//!
//! All amounts are integer minor units of the configured currency. Per-rank
//! payouts round half-up; whatever rounding leaves over stays in the house
//! share, so the four shares always sum exactly to the pool.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::config::PrizeSplit;
use crate::error::AppError;
use crate::models::PaymentStatus;
use crate::store::LedgerStore;

/// Pool breakdown for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrizeBreakdown {
    pub month_key: String,
    pub currency: String,
    /// Sum of completed payments, minor units
    pub total_minor: i64,
    /// Distinct paying players
    pub player_count: u32,
    pub first_minor: i64,
    pub second_minor: i64,
    pub third_minor: i64,
    pub house_minor: i64,
}

impl PrizeBreakdown {
    /// Payout for a 1-based rank; zero beyond the third place.
    pub fn payout_for_rank(&self, rank: u32) -> i64 {
        match rank {
            1 => self.first_minor,
            2 => self.second_minor,
            3 => self.third_minor,
            _ => 0,
        }
    }
}

/// Split `total_minor` by the configured percentages.
///
/// Pure. Returns (first, second, third, house); house absorbs the rounding
/// residual so the pieces sum to the total.
pub fn split_pool(total_minor: i64, split: &PrizeSplit) -> (i64, i64, i64, i64) {
    let share = |pct: u8| -> i64 {
        // Round half-up in integer math; total is non-negative.
        (total_minor * pct as i64 + 50) / 100
    };
    let first = share(split.first_pct);
    let second = share(split.second_pct);
    let third = share(split.third_pct);
    let house = total_minor - first - second - third;
    (first, second, third, house)
}

#[derive(Clone)]
pub struct PrizeCalculator {
    store: Arc<dyn LedgerStore>,
    split: PrizeSplit,
    currency: String,
}

impl PrizeCalculator {
    pub fn new(store: Arc<dyn LedgerStore>, split: PrizeSplit, currency: String) -> Self {
        Self {
            store,
            split,
            currency,
        }
    }

    /// Pool and per-rank payouts for `month_key`, from completed payments
    /// regardless of kind (one-off and subscription charges both count).
    pub async fn prize_pool(&self, month_key: &str) -> Result<PrizeBreakdown, AppError> {
        let payments = self.store.payments_for_month(month_key).await?;

        let mut total_minor = 0i64;
        let mut payers: HashSet<u64> = HashSet::new();
        for payment in payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
        {
            total_minor += payment.amount_minor;
            payers.insert(payment.player_id);
        }

        let (first_minor, second_minor, third_minor, house_minor) =
            split_pool(total_minor, &self.split);

        Ok(PrizeBreakdown {
            month_key: month_key.to_string(),
            currency: self.currency.clone(),
            total_minor,
            player_count: payers.len() as u32,
            first_minor,
            second_minor,
            third_minor,
            house_minor,
        })
    }
}
