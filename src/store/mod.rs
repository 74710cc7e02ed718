//! Storage - the single interface both backends implement.
//!
//! The directory, mirror, engine and gateway only ever see a [`SharedStore`]
//! (`Arc<dyn Store>`). Which backend sits behind it is decided once, at
//! startup, by [`StoreBackend::open`].
//!
//! Logical layout, identical for every backend:
//!
//! - `players` keyed by identity key
//! - `scores`, append-only, keyed by an increasing id, each row referencing a
//!   player (deleting the player deletes its scores)
//! - `stats`, three named running totals
//!
//! ## Example
//!
//! ```ignore
//! use arcade_index::store::{StoreBackend, Store};
//!
//! let store = StoreBackend::Memory.open()?;
//! let key = IdentityKey::parse("0xabc")?;
//! store.upsert_player(&key, "alice", None, now)?;
//! ```

mod in_memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::GameType;
use crate::identity::IdentityKey;
use crate::level::{level_for_xp, xp_for_level};

pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// A registered player.
///
/// `level` is not settable: every constructor and every XP change derives it
/// from `total_xp` through [`level_for_xp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub identity_key: IdentityKey,
    pub display_name: String,
    pub total_xp: u64,
    level: u32,
    pub games_played: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_ref: Option<String>,
    pub registered_at: u64,
    pub updated_at: u64,
}

impl PlayerRecord {
    /// A freshly registered player with zeroed counters.
    pub fn new(
        identity_key: IdentityKey,
        display_name: String,
        shard_ref: Option<String>,
        now: u64,
    ) -> Self {
        Self::from_parts(identity_key, display_name, 0, 0, shard_ref, now, now)
    }

    /// Rebuild a record from stored columns.
    pub fn from_parts(
        identity_key: IdentityKey,
        display_name: String,
        total_xp: u64,
        games_played: u64,
        shard_ref: Option<String>,
        registered_at: u64,
        updated_at: u64,
    ) -> Self {
        PlayerRecord {
            identity_key,
            display_name,
            total_xp,
            level: level_for_xp(total_xp),
            games_played,
            shard_ref,
            registered_at,
            updated_at,
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// XP still missing before the next level.
    pub fn xp_to_next_level(&self) -> u64 {
        xp_for_level(self.level.saturating_add(1)).saturating_sub(self.total_xp)
    }

    /// Count one accepted game worth `xp`.
    pub(crate) fn credit(&mut self, xp: u64, now: u64) {
        self.total_xp = self.total_xp.saturating_add(xp);
        self.level = level_for_xp(self.total_xp);
        self.games_played = self.games_played.saturating_add(1);
        self.updated_at = now;
    }
}

/// One accepted score submission. Never changes after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: u64,
    pub player_key: IdentityKey,
    pub game_type: GameType,
    pub raw_score: u64,
    pub xp_earned: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus_data: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    pub submitted_at: u64,
}

/// A validated score that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScore {
    pub player_key: IdentityKey,
    pub game_type: GameType,
    pub raw_score: u64,
    pub xp_earned: u64,
    pub bonus_data: Option<i64>,
    /// Client idempotency token, unique per player.
    pub submission_id: Option<String>,
    /// Ledger shard the player reported with this score.
    pub shard_ref: Option<String>,
    pub submitted_at: u64,
}

impl NewScore {
    pub(crate) fn into_record(self, id: u64) -> ScoreRecord {
        ScoreRecord {
            id,
            player_key: self.player_key,
            game_type: self.game_type,
            raw_score: self.raw_score,
            xp_earned: self.xp_earned,
            bonus_data: self.bonus_data,
            submission_id: self.submission_id,
            submitted_at: self.submitted_at,
        }
    }

    /// Whether `existing` records the same game result as this submission.
    pub fn same_payload(&self, existing: &ScoreRecord) -> bool {
        existing.player_key == self.player_key
            && existing.game_type == self.game_type
            && existing.raw_score == self.raw_score
            && existing.xp_earned == self.xp_earned
            && existing.bonus_data == self.bonus_data
    }
}

/// Outcome of `upsert_player`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub player: PlayerRecord,
    /// True only on first registration.
    pub created: bool,
}

/// Outcome of `commit_submission`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub score: ScoreRecord,
    /// The player as of this commit.
    pub player: PlayerRecord,
    /// The submission id had already been applied; nothing changed.
    pub replayed: bool,
}

/// Global running totals. Created at zero, only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatCounters {
    pub total_players: u64,
    pub total_games_played: u64,
    pub total_xp_earned: u64,
}

/// A score paired with the display name its player has right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedScore {
    pub score: ScoreRecord,
    pub display_name: String,
}

/// Global counters together with the player ranked first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub counters: StatCounters,
    /// `None` while nobody is registered.
    pub leader: Option<PlayerRecord>,
}

/// Filter for score range scans. Results come back unordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreQuery {
    pub game_type: Option<GameType>,
    pub player: Option<IdentityKey>,
}

impl ScoreQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn game(game_type: GameType) -> Self {
        ScoreQuery {
            game_type: Some(game_type),
            player: None,
        }
    }

    pub fn matches(&self, score: &ScoreRecord) -> bool {
        self.game_type.map_or(true, |g| g == score.game_type)
            && self.player.as_ref().map_or(true, |p| *p == score.player_key)
    }
}

/// Largest value any stored total may hold. SQLite integers are signed
/// 64-bit, so every backend caps at `i64::MAX`.
pub const MAX_TOTAL: u64 = i64::MAX as u64;

/// `current + delta`, or `Overflow` if that passes [`MAX_TOTAL`].
pub(crate) fn checked_total(
    counter: &'static str,
    current: u64,
    delta: u64,
) -> Result<u64, StoreError> {
    current
        .checked_add(delta)
        .filter(|total| *total <= MAX_TOTAL)
        .ok_or(StoreError::Overflow { counter })
}

/// Backend-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Referential integrity: the player does not exist.
    #[error("unknown player: {0}")]
    UnknownPlayer(String),
    /// The submission id is already bound to a different result.
    #[error("submission {submission_id} for {player} conflicts with the recorded one")]
    SubmissionConflict {
        player: String,
        submission_id: String,
    },
    /// A running total would pass [`MAX_TOTAL`]. Nothing was written.
    #[error("{counter} would exceed {max}", max = MAX_TOTAL)]
    Overflow { counter: &'static str },
    /// Busy, locked, poisoned or unreachable. Retryable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// Anything else the backend reports.
    #[error("storage error: {0}")]
    Backend(String),
}

/// The storage interface.
///
/// Every method is atomic on its own: a reader never sees half of a write.
/// Counter increments happen inside the backend (`value = value + n`), never
/// as a read by the caller followed by a write.
pub trait Store: Send + Sync {
    /// Short backend name for logs and health checks.
    fn backend_name(&self) -> &'static str;

    /// Create the player with zero counters, or update name, shard and
    /// `updated_at` of an existing one. Bumps `total_players` on creation only.
    fn upsert_player(
        &self,
        key: &IdentityKey,
        display_name: &str,
        shard_ref: Option<&str>,
        now: u64,
    ) -> Result<Upserted, StoreError>;

    fn get_player(&self, key: &IdentityKey) -> Result<Option<PlayerRecord>, StoreError>;

    /// Every player, in no particular order.
    fn list_players(&self) -> Result<Vec<PlayerRecord>, StoreError>;

    /// 1-indexed position under `(total_xp desc, identity_key asc)`,
    /// or `None` for an unknown player.
    fn rank_of(&self, key: &IdentityKey) -> Result<Option<u64>, StoreError>;

    /// Add `delta` to the player's XP and count one game. `None` if unknown.
    fn apply_xp_delta(
        &self,
        key: &IdentityKey,
        delta: u64,
        now: u64,
    ) -> Result<Option<PlayerRecord>, StoreError>;

    /// Append a score row. Fails with `UnknownPlayer` if the player is missing.
    fn append_score(&self, score: NewScore) -> Result<ScoreRecord, StoreError>;

    /// Apply a whole submission as one unit: idempotency check, score append,
    /// player XP and game count, global counters. All of it or none of it.
    fn commit_submission(&self, score: NewScore) -> Result<Recorded, StoreError>;

    fn scores(&self, query: &ScoreQuery) -> Result<Vec<ScoreRecord>, StoreError>;

    /// Every score for `game_type` joined with its player's current display
    /// name, read in one snapshot. Scores of removed players are absent.
    fn named_scores(&self, game_type: GameType) -> Result<Vec<NamedScore>, StoreError>;

    /// Delete the player and all of its scores. Counters are left as they are.
    fn remove_player(&self, key: &IdentityKey) -> Result<bool, StoreError>;

    fn stats(&self) -> Result<StatCounters, StoreError>;

    /// Counters and the rank-1 player, read in one snapshot.
    fn stats_snapshot(&self) -> Result<StatsSnapshot, StoreError>;
}

pub type SharedStore = Arc<dyn Store>;

/// Which storage implementation to run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local maps; state is lost on exit.
    Memory,
    /// SQLite database file.
    Sqlite(PathBuf),
}

impl StoreBackend {
    pub fn open(&self) -> Result<SharedStore, StoreError> {
        match self {
            StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
            #[cfg(feature = "sqlite")]
            StoreBackend::Sqlite(path) => Ok(Arc::new(SqliteStore::open(path)?)),
            #[cfg(not(feature = "sqlite"))]
            StoreBackend::Sqlite(_) => Err(StoreError::Backend(
                "built without the `sqlite` feature".into(),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite(_) => "sqlite",
        }
    }
}
