//! Sync Gateway - the only write entry point.
//!
//! A call goes through the same steps every time:
//!
//! 1. validate the input (identity, display name, game type, numbers,
//!    submission id); nothing is touched if this fails
//! 2. ask the injected [`Confirmations`] whether the ledger backs the fact
//! 3. take the per-identity write lock (for scores and removals, only once
//!    the player is known to exist)
//! 4. apply the write through one atomic store call
//!
//! Writes for different identities hold different locks and run in parallel.

mod confirm;

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::directory::PlayerDirectory;
use crate::error::IndexError;
use crate::game::GameType;
use crate::identity::{validate_display_name, IdentityKey};
use crate::lock::KeyLocks;
use crate::store::{NewScore, PlayerRecord, Recorded, SharedStore};

pub use confirm::{Confirmations, Fact, TrustRelay};

pub const MAX_SUBMISSION_ID_LEN: usize = 64;
pub const MAX_SHARD_REF_LEN: usize = 256;

/// `POST register` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub identity: String,
    pub display_name: String,
    #[serde(default)]
    pub shard_ref: Option<String>,
}

/// `POST submit-score` body.
///
/// Numbers arrive signed so that a negative value is reported as invalid
/// input rather than as a decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    pub identity: String,
    pub game_type: String,
    pub raw_score: i64,
    pub xp_earned: i64,
    #[serde(default)]
    pub bonus_data: Option<i64>,
    #[serde(default)]
    pub shard_ref: Option<String>,
    /// Client idempotency token. Retrying with the same id never counts twice.
    #[serde(default)]
    pub submission_id: Option<String>,
}

pub struct SyncGateway {
    store: SharedStore,
    directory: PlayerDirectory,
    locks: KeyLocks,
    clock: Arc<dyn Clock>,
    confirmations: Arc<dyn Confirmations>,
}

impl SyncGateway {
    /// Gateway on the wall clock that trusts its relay.
    pub fn new(store: SharedStore) -> Self {
        Self::with_parts(store, Arc::new(SystemClock), Arc::new(TrustRelay))
    }

    pub fn with_parts(
        store: SharedStore,
        clock: Arc<dyn Clock>,
        confirmations: Arc<dyn Confirmations>,
    ) -> Self {
        SyncGateway {
            directory: PlayerDirectory::new(store.clone()),
            store,
            locks: KeyLocks::new(),
            clock,
            confirmations,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Register `identity`, or rename it if already registered.
    /// Counters of an existing player are left alone.
    pub fn register_player(&self, input: &Registration) -> Result<PlayerRecord, IndexError> {
        let key = IdentityKey::parse(&input.identity)?;
        validate_display_name(&input.display_name)?;
        let shard_ref = validate_shard_ref(input.shard_ref.as_deref())?;

        self.confirmations.confirm(&Fact::Registration {
            identity: &key,
            display_name: &input.display_name,
            shard_ref,
        })?;

        let _guard = self.locks.acquire(key.as_str())?;
        let upserted = self.directory.upsert_player(
            &key,
            &input.display_name,
            shard_ref,
            self.clock.now_millis(),
        )?;
        if upserted.created {
            info!(identity = %key, display_name = %input.display_name, "player registered");
        } else {
            info!(identity = %key, display_name = %input.display_name, "player re-registered");
        }
        Ok(upserted.player)
    }

    /// Record one game result: append it, credit the XP, bump the counters.
    /// All of it lands or none of it does.
    pub fn submit_score(&self, input: &ScoreSubmission) -> Result<Recorded, IndexError> {
        let score = self.validate_submission(input)?;
        self.confirmations.confirm(&Fact::Score(&score))?;

        let key = score.player_key.clone();
        self.directory.get_player(&key)?;
        let _guard = self.locks.acquire(key.as_str())?;
        let recorded = self.store.commit_submission(score).map_err(|err| {
            warn!(identity = %key, %err, "score submission failed");
            IndexError::from(err)
        })?;

        if recorded.replayed {
            info!(
                identity = %key,
                score_id = recorded.score.id,
                submission_id = recorded.score.submission_id.as_deref().unwrap_or_default(),
                "replayed submission ignored"
            );
        } else {
            info!(
                identity = %key,
                score_id = recorded.score.id,
                game = %recorded.score.game_type,
                raw_score = recorded.score.raw_score,
                xp_earned = recorded.score.xp_earned,
                total_xp = recorded.player.total_xp,
                level = recorded.player.level(),
                "score recorded"
            );
        }
        Ok(recorded)
    }

    /// Delete a player and every score they own. Global counters keep their
    /// values; they count what was ever accepted.
    pub fn remove_player(&self, identity: &str) -> Result<(), IndexError> {
        let key = IdentityKey::parse(identity)?;
        self.confirmations.confirm(&Fact::Removal { identity: &key })?;

        self.directory.get_player(&key)?;
        let _guard = self.locks.acquire(key.as_str())?;
        if !self.directory.remove_player(&key)? {
            return Err(IndexError::NotFound(format!("player {} is not registered", key)));
        }
        info!(identity = %key, "player removed");
        Ok(())
    }

    fn validate_submission(&self, input: &ScoreSubmission) -> Result<NewScore, IndexError> {
        let player_key = IdentityKey::parse(&input.identity)?;
        let game_type: GameType = input.game_type.parse()?;
        let raw_score = non_negative("rawScore", input.raw_score)?;
        let xp_earned = non_negative("xpEarned", input.xp_earned)?;
        let shard_ref = validate_shard_ref(input.shard_ref.as_deref())?.map(str::to_string);
        if let Some(id) = input.submission_id.as_deref() {
            validate_submission_id(id)?;
        }

        Ok(NewScore {
            player_key,
            game_type,
            raw_score,
            xp_earned,
            bonus_data: input.bonus_data,
            submission_id: input.submission_id.clone(),
            shard_ref,
            submitted_at: self.clock.now_millis(),
        })
    }
}

fn non_negative(field: &str, value: i64) -> Result<u64, IndexError> {
    u64::try_from(value)
        .map_err(|_| IndexError::InvalidInput(format!("{} must be non-negative, got {}", field, value)))
}

fn validate_submission_id(id: &str) -> Result<(), IndexError> {
    let valid_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-');
    if id.is_empty() || id.len() > MAX_SUBMISSION_ID_LEN || !id.chars().all(valid_char) {
        return Err(IndexError::InvalidInput(format!(
            "submissionId must be 1-{} characters of [A-Za-z0-9._:-]",
            MAX_SUBMISSION_ID_LEN
        )));
    }
    Ok(())
}

/// Blank shard refs count as absent.
fn validate_shard_ref(shard_ref: Option<&str>) -> Result<Option<&str>, IndexError> {
    match shard_ref.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.len() > MAX_SHARD_REF_LEN => Err(IndexError::InvalidInput(format!(
            "shardRef is longer than {} bytes",
            MAX_SHARD_REF_LEN
        ))),
        Some(s) => Ok(Some(s)),
    }
}
