//! Score Ledger Mirror - append-only copy of every accepted submission.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::IndexError;
use crate::game::GameType;
use crate::identity::IdentityKey;
use crate::store::{NamedScore, NewScore, ScoreQuery, ScoreRecord, SharedStore};

/// Upper bound on any page of scores.
pub const MAX_PAGE_SIZE: usize = 200;

/// Higher raw score first; equal scores go to whoever got there first.
fn best_first(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.raw_score
        .cmp(&a.raw_score)
        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn newest_first(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.submitted_at
        .cmp(&a.submitted_at)
        .then_with(|| b.id.cmp(&a.id))
}

fn keep_best<T>(
    items: impl IntoIterator<Item = T>,
    score_of: impl Fn(&T) -> &ScoreRecord,
) -> HashMap<IdentityKey, T> {
    let mut best: HashMap<IdentityKey, T> = HashMap::new();
    for item in items {
        let score = score_of(&item);
        let beats_current = best
            .get(&score.player_key)
            .map_or(true, |current| best_first(score_of(current), score) == Ordering::Greater);
        if beats_current {
            best.insert(score.player_key.clone(), item);
        }
    }
    best
}

#[derive(Clone)]
pub struct ScoreMirror {
    store: SharedStore,
    max_page: usize,
}

impl ScoreMirror {
    pub fn new(store: SharedStore) -> Self {
        Self::with_max_page(store, MAX_PAGE_SIZE)
    }

    pub fn with_max_page(store: SharedStore, max_page: usize) -> Self {
        ScoreMirror {
            store,
            max_page: max_page.max(1),
        }
    }

    pub fn max_page(&self) -> usize {
        self.max_page
    }

    /// Clamp a caller-supplied page size.
    pub fn clamp(&self, limit: usize) -> usize {
        limit.min(self.max_page)
    }

    /// Append one score. The player must already be in the directory.
    pub fn append_score(&self, score: NewScore) -> Result<ScoreRecord, IndexError> {
        Ok(self.store.append_score(score)?)
    }

    /// Most recent first, at most `limit` (clamped).
    pub fn recent_scores(&self, limit: usize) -> Result<Vec<ScoreRecord>, IndexError> {
        let mut scores = self.store.scores(&ScoreQuery::all())?;
        scores.sort_by(newest_first);
        scores.truncate(self.clamp(limit));
        Ok(scores)
    }

    /// Every submission for one game, highest raw score first, at most `limit` (clamped).
    pub fn scores_for_game(
        &self,
        game_type: GameType,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, IndexError> {
        let mut scores = self.store.scores(&ScoreQuery::game(game_type))?;
        scores.sort_by(best_first);
        scores.truncate(self.clamp(limit));
        Ok(scores)
    }

    /// Each player's single best submission for `game_type`.
    ///
    /// Best means highest raw score; on a tie the earlier submission keeps the
    /// spot, and on an identical timestamp the lower id does.
    pub fn best_score_per_player(
        &self,
        game_type: GameType,
    ) -> Result<HashMap<IdentityKey, ScoreRecord>, IndexError> {
        let scores = self.store.scores(&ScoreQuery::game(game_type))?;
        Ok(keep_best(scores, |score| score))
    }

    /// Same selection as [`best_score_per_player`](Self::best_score_per_player),
    /// with each player's display name read in the same snapshot.
    pub fn best_named_scores(&self, game_type: GameType) -> Result<Vec<NamedScore>, IndexError> {
        let named = self.store.named_scores(game_type)?;
        Ok(keep_best(named, |named| &named.score).into_values().collect())
    }
}
