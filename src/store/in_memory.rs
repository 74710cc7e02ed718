//! InMemoryStore - map-backed store for tests, development and ephemeral runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    checked_total, NamedScore, NewScore, PlayerRecord, Recorded, ScoreQuery, ScoreRecord,
    StatCounters, StatsSnapshot, Store, StoreError, Upserted,
};
use crate::directory::rank_order;
use crate::game::GameType;
use crate::identity::IdentityKey;

#[derive(Default)]
struct Tables {
    players: HashMap<IdentityKey, PlayerRecord>,
    scores: BTreeMap<u64, ScoreRecord>,
    /// (player, submission id) -> score id
    submissions: HashMap<(IdentityKey, String), u64>,
    stats: StatCounters,
    last_score_id: u64,
}

impl Tables {
    fn append(&mut self, score: NewScore) -> Result<ScoreRecord, StoreError> {
        if !self.players.contains_key(&score.player_key) {
            return Err(StoreError::UnknownPlayer(score.player_key.to_string()));
        }
        self.last_score_id += 1;
        let record = score.into_record(self.last_score_id);
        if let Some(token) = &record.submission_id {
            self.submissions
                .insert((record.player_key.clone(), token.clone()), record.id);
        }
        self.scores.insert(record.id, record.clone());
        Ok(record)
    }

    fn submission(&self, player: &IdentityKey, token: &str) -> Option<&ScoreRecord> {
        self.submissions
            .get(&(player.clone(), token.to_string()))
            .and_then(|id| self.scores.get(id))
    }
}

/// In-memory store. Clones share the same tables.
///
/// All tables sit behind one `RwLock`: each operation holds the write half
/// only for its own in-memory update, and readers clone what they need under
/// the read half, so a reader sees either all of a write or none of it.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory tables poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory tables poisoned".into()))
    }
}

impl Store for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn upsert_player(
        &self,
        key: &IdentityKey,
        display_name: &str,
        shard_ref: Option<&str>,
        now: u64,
    ) -> Result<Upserted, StoreError> {
        let mut tables = self.write()?;

        if let Some(existing) = tables.players.get_mut(key) {
            existing.display_name = display_name.to_string();
            if let Some(shard) = shard_ref {
                existing.shard_ref = Some(shard.to_string());
            }
            existing.updated_at = now;
            return Ok(Upserted {
                player: existing.clone(),
                created: false,
            });
        }

        let player = PlayerRecord::new(
            key.clone(),
            display_name.to_string(),
            shard_ref.map(str::to_string),
            now,
        );
        tables.players.insert(key.clone(), player.clone());
        tables.stats.total_players += 1;
        Ok(Upserted {
            player,
            created: true,
        })
    }

    fn get_player(&self, key: &IdentityKey) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.read()?.players.get(key).cloned())
    }

    fn list_players(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        Ok(self.read()?.players.values().cloned().collect())
    }

    fn rank_of(&self, key: &IdentityKey) -> Result<Option<u64>, StoreError> {
        let tables = self.read()?;
        let Some(target) = tables.players.get(key) else {
            return Ok(None);
        };
        let ahead = tables
            .players
            .values()
            .filter(|p| {
                p.total_xp > target.total_xp
                    || (p.total_xp == target.total_xp && p.identity_key < target.identity_key)
            })
            .count() as u64;
        Ok(Some(ahead + 1))
    }

    fn apply_xp_delta(
        &self,
        key: &IdentityKey,
        delta: u64,
        now: u64,
    ) -> Result<Option<PlayerRecord>, StoreError> {
        let mut tables = self.write()?;
        let Some(player) = tables.players.get_mut(key) else {
            return Ok(None);
        };
        checked_total("totalXp", player.total_xp, delta)?;
        player.credit(delta, now);
        Ok(Some(player.clone()))
    }

    fn append_score(&self, score: NewScore) -> Result<ScoreRecord, StoreError> {
        self.write()?.append(score)
    }

    fn commit_submission(&self, score: NewScore) -> Result<Recorded, StoreError> {
        let mut tables = self.write()?;
        let key = score.player_key.clone();

        if let Some(token) = score.submission_id.as_deref() {
            if let Some(existing) = tables.submission(&key, token) {
                if !score.same_payload(existing) {
                    return Err(StoreError::SubmissionConflict {
                        player: key.to_string(),
                        submission_id: token.to_string(),
                    });
                }
                let existing = existing.clone();
                let player = tables
                    .players
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| StoreError::UnknownPlayer(key.to_string()))?;
                return Ok(Recorded {
                    score: existing,
                    player,
                    replayed: true,
                });
            }
        }

        // check every total before touching anything
        let player_xp = tables
            .players
            .get(&key)
            .map(|p| p.total_xp)
            .ok_or_else(|| StoreError::UnknownPlayer(key.to_string()))?;
        checked_total("totalXp", player_xp, score.xp_earned)?;
        let xp_earned_total =
            checked_total("totalXpEarned", tables.stats.total_xp_earned, score.xp_earned)?;

        let shard_ref = score.shard_ref.clone();
        let now = score.submitted_at;
        let record = tables.append(score)?;

        let player = {
            let player = tables
                .players
                .get_mut(&key)
                .ok_or_else(|| StoreError::UnknownPlayer(key.to_string()))?;
            player.credit(record.xp_earned, now);
            if shard_ref.is_some() {
                player.shard_ref = shard_ref;
            }
            player.clone()
        };

        tables.stats.total_games_played += 1;
        tables.stats.total_xp_earned = xp_earned_total;

        Ok(Recorded {
            score: record,
            player,
            replayed: false,
        })
    }

    fn scores(&self, query: &ScoreQuery) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(self
            .read()?
            .scores
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect())
    }

    fn named_scores(&self, game_type: GameType) -> Result<Vec<NamedScore>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .scores
            .values()
            .filter(|s| s.game_type == game_type)
            .filter_map(|s| {
                tables.players.get(&s.player_key).map(|p| NamedScore {
                    score: s.clone(),
                    display_name: p.display_name.clone(),
                })
            })
            .collect())
    }

    fn remove_player(&self, key: &IdentityKey) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        if tables.players.remove(key).is_none() {
            return Ok(false);
        }
        tables.scores.retain(|_, s| s.player_key != *key);
        tables.submissions.retain(|(player, _), _| player != key);
        Ok(true)
    }

    fn stats(&self) -> Result<StatCounters, StoreError> {
        Ok(self.read()?.stats)
    }

    fn stats_snapshot(&self) -> Result<StatsSnapshot, StoreError> {
        let tables = self.read()?;
        Ok(StatsSnapshot {
            counters: tables.stats,
            leader: tables.players.values().min_by(|a, b| rank_order(a, b)).cloned(),
        })
    }
}
