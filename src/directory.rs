//! Player Directory - one record per identity.

use std::cmp::Ordering;

use tracing::debug;

use crate::error::IndexError;
use crate::identity::IdentityKey;
use crate::store::{PlayerRecord, SharedStore, Upserted};

/// Total order used by every ranking: XP descending, then identity key ascending.
pub fn rank_order(a: &PlayerRecord, b: &PlayerRecord) -> Ordering {
    b.total_xp
        .cmp(&a.total_xp)
        .then_with(|| a.identity_key.cmp(&b.identity_key))
}

#[derive(Clone)]
pub struct PlayerDirectory {
    store: SharedStore,
}

impl PlayerDirectory {
    pub fn new(store: SharedStore) -> Self {
        PlayerDirectory { store }
    }

    /// Create the player, or refresh name and `updated_at` of an existing one.
    /// XP and games played are never reset here.
    pub fn upsert_player(
        &self,
        key: &IdentityKey,
        display_name: &str,
        shard_ref: Option<&str>,
        now: u64,
    ) -> Result<Upserted, IndexError> {
        let upserted = self.store.upsert_player(key, display_name, shard_ref, now)?;
        debug!(
            identity = %key,
            created = upserted.created,
            "player upserted"
        );
        Ok(upserted)
    }

    pub fn get_player(&self, key: &IdentityKey) -> Result<PlayerRecord, IndexError> {
        self.store
            .get_player(key)?
            .ok_or_else(|| IndexError::NotFound(format!("player {} is not registered", key)))
    }

    /// Every player in leaderboard order.
    pub fn list_all(&self) -> Result<Vec<PlayerRecord>, IndexError> {
        let mut players = self.store.list_players()?;
        players.sort_by(rank_order);
        Ok(players)
    }

    /// Add `xp_delta` and one game to the player in a single storage-side update.
    pub fn apply_xp_delta(
        &self,
        key: &IdentityKey,
        xp_delta: u64,
        now: u64,
    ) -> Result<PlayerRecord, IndexError> {
        self.store
            .apply_xp_delta(key, xp_delta, now)?
            .ok_or_else(|| IndexError::NotFound(format!("player {} is not registered", key)))
    }

    /// 1-indexed leaderboard position without sorting the directory.
    pub fn rank_of(&self, key: &IdentityKey) -> Result<Option<u64>, IndexError> {
        Ok(self.store.rank_of(key)?)
    }

    pub(crate) fn remove_player(&self, key: &IdentityKey) -> Result<bool, IndexError> {
        Ok(self.store.remove_player(key)?)
    }
}
