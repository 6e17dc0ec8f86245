// SPDX-License-Identifier: MIT

//! Data models for the competition ledger.

pub mod event;
pub mod payment;
pub mod player;
pub mod score;
pub mod subscription;
pub mod winners;

pub use event::{EventKind, OutboxEvent};
pub use payment::{Payment, PaymentKind, PaymentStatus};
pub use player::Player;
pub use score::Score;
pub use subscription::{Subscription, SubscriptionStatus};
pub use winners::{MonthlyWinnersRecord, WinnerEntry};
