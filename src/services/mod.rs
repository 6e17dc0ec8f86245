// SPDX-License-Identifier: MIT

//! Services module - competition ledger business logic.

pub mod access;
pub mod leaderboard;
pub mod outbox;
pub mod prizes;
pub mod recorder;
pub mod rollover;

pub use access::AccessControl;
pub use leaderboard::{LeaderboardEngine, LeaderboardEntry, Position};
pub use outbox::{DeliveryReport, OutboxDelivery};
pub use prizes::{PrizeBreakdown, PrizeCalculator};
pub use recorder::{ScoreRecorder, SubmitOutcome};
pub use rollover::{MonthlyRollover, RolloverOutcome};
