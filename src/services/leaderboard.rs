// SPDX-License-Identifier: MIT

//! Leaderboard engine: ranked monthly standings.
//!
//! Ranking value is the best score per player per month; ties break by who
//! reached that score first, then by player ID for determinism. Players
//! without access for the month never appear, whatever they scored.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;

use crate::error::AppError;
use crate::models::Score;
use crate::services::AccessControl;
use crate::store::LedgerStore;

const ACCESS_CHECK_CONCURRENCY: usize = 16;

/// One leaderboard row.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based position
    pub position: u32,
    pub player_id: u64,
    pub display_name: String,
    pub best_score: u32,
    pub games_played: u32,
    /// When the best score was first reached
    pub achieved_at: DateTime<Utc>,
}

/// A player's standing for a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Position {
    Ranked { rank: u32, best_score: u32 },
    NotRanked,
}

/// Per-player aggregate before access filtering and naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedPlayer {
    pub player_id: u64,
    pub best_score: u32,
    pub games_played: u32,
    pub achieved_at: DateTime<Utc>,
}

/// Collapse score rows into ranked per-player aggregates.
///
/// Pure: best = MAX(value) with the earliest timestamp that value was
/// reached; order is best desc, achieved_at asc, player_id asc.
pub fn rank_scores(scores: &[Score]) -> Vec<RankedPlayer> {
    let mut by_player: HashMap<u64, RankedPlayer> = HashMap::new();

    for score in scores {
        by_player
            .entry(score.player_id)
            .and_modify(|agg| {
                agg.games_played += 1;
                if score.value > agg.best_score
                    || (score.value == agg.best_score && score.recorded_at < agg.achieved_at)
                {
                    agg.best_score = score.value;
                    agg.achieved_at = score.recorded_at;
                }
            })
            .or_insert_with(|| RankedPlayer {
                player_id: score.player_id,
                best_score: score.value,
                games_played: 1,
                achieved_at: score.recorded_at,
            });
    }

    let mut ranked: Vec<RankedPlayer> = by_player.into_values().collect();
    ranked.sort_by(|a, b| {
        b.best_score
            .cmp(&a.best_score)
            .then(a.achieved_at.cmp(&b.achieved_at))
            .then(a.player_id.cmp(&b.player_id))
    });
    ranked
}

#[derive(Clone)]
pub struct LeaderboardEngine {
    store: Arc<dyn LedgerStore>,
    access: AccessControl,
}

impl LeaderboardEngine {
    pub fn new(store: Arc<dyn LedgerStore>, access: AccessControl) -> Self {
        Self { store, access }
    }

    /// Top `limit` standings for `month_key`.
    pub async fn leaderboard(
        &self,
        month_key: &str,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        let qualified = self.qualified_ranking(month_key).await?;

        let mut entries = Vec::with_capacity(limit.min(qualified.len()));
        for (idx, player) in qualified.into_iter().take(limit).enumerate() {
            let display_name = self
                .store
                .get_player(player.player_id)
                .await?
                .map(|p| p.display_name)
                .unwrap_or_else(|| format!("Player {}", player.player_id));

            entries.push(LeaderboardEntry {
                position: idx as u32 + 1,
                player_id: player.player_id,
                display_name,
                best_score: player.best_score,
                games_played: player.games_played,
                achieved_at: player.achieved_at,
            });
        }
        Ok(entries)
    }

    /// The player's rank for the month, derived from the full ranking.
    pub async fn user_position(
        &self,
        player_id: u64,
        month_key: &str,
    ) -> Result<Position, AppError> {
        let qualified = self.qualified_ranking(month_key).await?;
        Ok(qualified
            .iter()
            .position(|p| p.player_id == player_id)
            .map(|idx| Position::Ranked {
                rank: idx as u32 + 1,
                best_score: qualified[idx].best_score,
            })
            .unwrap_or(Position::NotRanked))
    }

    /// Full ranking restricted to players with access for the month.
    async fn qualified_ranking(&self, month_key: &str) -> Result<Vec<RankedPlayer>, AppError> {
        let scores = self.store.scores_for_month(month_key).await?;
        let ranked = rank_scores(&scores);

        // Ordered fan-out so rank positions are preserved.
        let checks = ranked.into_iter().map(|player| {
            let access = self.access.clone();
            let month_key = month_key.to_string();
            async move {
                let allowed = access.has_access(player.player_id, &month_key).await?;
                Ok::<_, AppError>(allowed.then_some(player))
            }
        });

        let results: Vec<Result<Option<RankedPlayer>, AppError>> = stream::iter(checks)
            .buffered(ACCESS_CHECK_CONCURRENCY)
            .collect()
            .await;

        let mut qualified = Vec::new();
        for result in results {
            if let Some(player) = result? {
                qualified.push(player);
            }
        }
        Ok(qualified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn score(player_id: u64, value: u32, minute: u32) -> Score {
        Score {
            score_id: format!("s-{player_id}-{value}-{minute}"),
            player_id,
            value,
            recorded_at: Utc.with_ymd_and_hms(2025, 3, 10, 12, minute, 0).unwrap(),
            month_key: "2025-03".to_string(),
            day_key: "2025-03-10".to_string(),
        }
    }

    #[test]
    fn test_best_score_and_games_played() {
        let scores = vec![score(1, 100, 0), score(1, 250, 5), score(1, 180, 10)];
        let ranked = rank_scores(&scores);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].best_score, 250);
        assert_eq!(ranked[0].games_played, 3);
        assert_eq!(ranked[0].achieved_at, scores[1].recorded_at);
    }

    #[test]
    fn test_ties_break_by_earliest_achieved() {
        // Player 2 reaches 300 before player 1 does.
        let scores = vec![score(1, 300, 30), score(2, 300, 10), score(3, 299, 0)];
        let ranked = rank_scores(&scores);

        let order: Vec<u64> = ranked.iter().map(|p| p.player_id).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn test_repeating_best_keeps_first_timestamp() {
        // Scoring the same best again later must not worsen the tie-break.
        let scores = vec![score(1, 300, 10), score(1, 300, 40), score(2, 300, 20)];
        let ranked = rank_scores(&scores);

        assert_eq!(ranked[0].player_id, 1);
        assert_eq!(ranked[0].achieved_at, scores[0].recorded_at);
    }

    #[test]
    fn test_empty_scores_rank_nobody() {
        assert!(rank_scores(&[]).is_empty());
    }
}
