//! Aggregation Engine - ranked and aggregate views over the directory and mirror.
//!
//! The engine is read-only. Every call works on what the store has committed
//! at the moment of the call; nothing is cached between calls.
//!
//! ## Ranking
//!
//! Ranks are 1-indexed and *contiguous*: after sorting, row `n` gets rank `n`
//! even when its XP (or raw score) equals the row above. Two players on 500 XP
//! get ranks 1 and 2, not a shared 1 followed by 3 as competition ranking
//! would give. The identity key breaks the tie, so the order is total and a
//! page boundary never moves between two reads of the same data.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::directory::PlayerDirectory;
use crate::error::IndexError;
use crate::game::GameType;
use crate::identity::IdentityKey;
use crate::mirror::ScoreMirror;
use crate::store::{ScoreRecord, SharedStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub identity_key: IdentityKey,
    pub display_name: String,
    pub total_xp: u64,
    pub level: u32,
    pub rank: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighScoreEntry {
    pub identity_key: IdentityKey,
    pub display_name: String,
    pub raw_score: u64,
    pub xp_earned: u64,
    pub submitted_at: u64,
    pub rank: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub total_players: u64,
    pub total_games_played: u64,
    pub total_xp_earned: u64,
    pub top_xp: u64,
    pub highest_level: u32,
}

#[derive(Clone)]
pub struct AggregationEngine {
    store: SharedStore,
    directory: PlayerDirectory,
    mirror: ScoreMirror,
}

impl AggregationEngine {
    pub fn new(store: SharedStore, directory: PlayerDirectory, mirror: ScoreMirror) -> Self {
        AggregationEngine {
            store,
            directory,
            mirror,
        }
    }

    pub fn directory(&self) -> &PlayerDirectory {
        &self.directory
    }

    pub fn mirror(&self) -> &ScoreMirror {
        &self.mirror
    }

    /// Top `limit` players by XP with contiguous ranks.
    pub fn global_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, IndexError> {
        let players = self.directory.list_all()?;
        Ok(players
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, p)| LeaderboardEntry {
                level: p.level(),
                rank: i as u64 + 1,
                identity_key: p.identity_key,
                display_name: p.display_name,
                total_xp: p.total_xp,
            })
            .collect())
    }

    /// The player's position in [`global_leaderboard`](Self::global_leaderboard)
    /// order, counted by the store without materializing the board.
    pub fn player_rank(&self, key: &IdentityKey) -> Result<u64, IndexError> {
        self.directory
            .rank_of(key)?
            .ok_or_else(|| IndexError::NotFound(format!("player {} is not registered", key)))
    }

    /// One entry per player (their best), best first, ranked after dedup.
    ///
    /// Scores and display names come from one store read, so a player
    /// removed or renamed mid-call is either fully in or fully out.
    pub fn game_high_scores(
        &self,
        game_type: GameType,
        limit: usize,
    ) -> Result<Vec<HighScoreEntry>, IndexError> {
        let mut best = self.mirror.best_named_scores(game_type)?;
        best.sort_by(|a, b| high_score_order(&a.score, &b.score));
        debug!(game = %game_type, players = best.len(), "high score board built");

        Ok(best
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, named)| HighScoreEntry {
                rank: i as u64 + 1,
                identity_key: named.score.player_key,
                display_name: named.display_name,
                raw_score: named.score.raw_score,
                xp_earned: named.score.xp_earned,
                submitted_at: named.score.submitted_at,
            })
            .collect())
    }

    /// Counters plus the rank-1 player's XP and level, from one snapshot.
    /// An empty index reports top XP 0 at level 1.
    pub fn global_stats(&self) -> Result<GlobalStats, IndexError> {
        let snapshot = self.store.stats_snapshot()?;
        let (top_xp, highest_level) = snapshot
            .leader
            .map_or((0, 1), |leader| (leader.total_xp, leader.level()));
        Ok(GlobalStats {
            total_players: snapshot.counters.total_players,
            total_games_played: snapshot.counters.total_games_played,
            total_xp_earned: snapshot.counters.total_xp_earned,
            top_xp,
            highest_level,
        })
    }
}

fn high_score_order(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.raw_score
        .cmp(&a.raw_score)
        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        .then_with(|| a.player_key.cmp(&b.player_key))
}
