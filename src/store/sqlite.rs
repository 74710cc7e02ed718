//! SqliteStore - durable transactional store on a SQLite file.
//!
//! One writer connection serializes mutations; every multi-statement write
//! runs in an `IMMEDIATE` transaction. File databases get a second, read-only
//! connection so reads proceed under WAL while a write is in flight.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{
    params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row, TransactionBehavior,
};
use tracing::debug;

use super::{
    checked_total, NamedScore, NewScore, PlayerRecord, Recorded, ScoreQuery, ScoreRecord,
    StatCounters, StatsSnapshot, Store, StoreError, Upserted,
};
use crate::game::GameType;
use crate::identity::IdentityKey;

const SCHEMA_SQL: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS players (
    identity_key  TEXT PRIMARY KEY,
    display_name  TEXT NOT NULL,
    total_xp      INTEGER NOT NULL DEFAULT 0 CHECK (total_xp >= 0),
    games_played  INTEGER NOT NULL DEFAULT 0 CHECK (games_played >= 0),
    shard_ref     TEXT,
    registered_at INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS players_by_rank ON players (total_xp DESC, identity_key ASC);

CREATE TABLE IF NOT EXISTS scores (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    player_key    TEXT NOT NULL REFERENCES players (identity_key) ON DELETE CASCADE,
    game_type     TEXT NOT NULL,
    raw_score     INTEGER NOT NULL CHECK (raw_score >= 0),
    xp_earned     INTEGER NOT NULL CHECK (xp_earned >= 0),
    bonus_data    INTEGER,
    submission_id TEXT,
    submitted_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS scores_by_game ON scores (game_type, raw_score DESC);
CREATE INDEX IF NOT EXISTS scores_by_player ON scores (player_key);
CREATE UNIQUE INDEX IF NOT EXISTS scores_by_submission
    ON scores (player_key, submission_id) WHERE submission_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS stats (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL DEFAULT 0
);
INSERT OR IGNORE INTO stats (name, value) VALUES
    ('total_players', 0),
    ('total_games_played', 0),
    ('total_xp_earned', 0);
";

const PLAYER_COLUMNS: &str =
    "identity_key, display_name, total_xp, games_played, shard_ref, registered_at, updated_at";

const SCORE_COLUMNS: &str =
    "id, player_key, game_type, raw_score, xp_earned, bonus_data, submission_id, submitted_at";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::CannotOpen
                        | ErrorCode::SystemIoFailure
                ) =>
            {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// SQLite-backed store.
pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let writer = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::initialize(&writer)?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(BUSY_TIMEOUT)?;

        debug!(path = %path.display(), "opened sqlite store");
        Ok(SqliteStore {
            writer: Mutex::new(writer),
            reader: Some(Mutex::new(reader)),
        })
    }

    /// Private in-memory database, for tests. Reads share the writer connection.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(SqliteStore {
            writer: Mutex::new(conn),
            reader: None,
        })
    }

    fn initialize(conn: &Connection) -> Result<(), StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite writer poisoned".into()))
    }

    fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match &self.reader {
            Some(reader) => {
                let conn = reader
                    .lock()
                    .map_err(|_| StoreError::Unavailable("sqlite reader poisoned".into()))?;
                f(&conn)
            }
            None => {
                let conn = self.writer()?;
                f(&conn)
            }
        }
    }
}

fn row_to_player(row: &Row<'_>) -> rusqlite::Result<PlayerRecord> {
    Ok(PlayerRecord::from_parts(
        IdentityKey::from_canonical(row.get(0)?),
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn row_to_score(row: &Row<'_>) -> rusqlite::Result<ScoreRecord> {
    let game: String = row.get(2)?;
    let game_type = game.parse::<GameType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ScoreRecord {
        id: row.get(0)?,
        player_key: IdentityKey::from_canonical(row.get(1)?),
        game_type,
        raw_score: row.get(3)?,
        xp_earned: row.get(4)?,
        bonus_data: row.get(5)?,
        submission_id: row.get(6)?,
        submitted_at: row.get(7)?,
    })
}

fn load_player(conn: &Connection, key: &IdentityKey) -> Result<Option<PlayerRecord>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE identity_key = ?1"),
            params![key.as_str()],
            row_to_player,
        )
        .optional()?)
}

fn player_exists(conn: &Connection, key: &IdentityKey) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM players WHERE identity_key = ?1",
            params![key.as_str()],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn player_total_xp(conn: &Connection, key: &IdentityKey) -> Result<Option<u64>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT total_xp FROM players WHERE identity_key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )
        .optional()?)
}

fn stat_value(conn: &Connection, name: &str) -> Result<u64, StoreError> {
    Ok(conn.query_row(
        "SELECT value FROM stats WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?)
}

fn load_stats(conn: &Connection) -> Result<StatCounters, StoreError> {
    let mut stmt = conn.prepare("SELECT name, value FROM stats")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?;
    let mut counters = StatCounters::default();
    for row in rows {
        let (name, value) = row?;
        match name.as_str() {
            "total_players" => counters.total_players = value,
            "total_games_played" => counters.total_games_played = value,
            "total_xp_earned" => counters.total_xp_earned = value,
            _ => {}
        }
    }
    Ok(counters)
}

fn load_submission(
    conn: &Connection,
    player: &IdentityKey,
    submission_id: &str,
) -> Result<Option<ScoreRecord>, StoreError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {SCORE_COLUMNS} FROM scores WHERE player_key = ?1 AND submission_id = ?2"
            ),
            params![player.as_str(), submission_id],
            row_to_score,
        )
        .optional()?)
}

/// Insert a score row. The caller has checked the player exists.
fn insert_score(conn: &Connection, score: NewScore) -> Result<ScoreRecord, StoreError> {
    conn.execute(
        "INSERT INTO scores (player_key, game_type, raw_score, xp_earned, bonus_data, submission_id, submitted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            score.player_key.as_str(),
            score.game_type.key(),
            score.raw_score,
            score.xp_earned,
            score.bonus_data,
            score.submission_id,
            score.submitted_at,
        ],
    )?;
    let id = conn.last_insert_rowid() as u64;
    Ok(score.into_record(id))
}

/// `total_xp = total_xp + delta`, evaluated by SQLite. Returns false if no such player.
fn credit_player(
    conn: &Connection,
    key: &IdentityKey,
    delta: u64,
    now: u64,
    shard_ref: Option<&str>,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE players
            SET total_xp = total_xp + ?2,
                games_played = games_played + 1,
                updated_at = ?3,
                shard_ref = COALESCE(?4, shard_ref)
          WHERE identity_key = ?1",
        params![key.as_str(), delta, now, shard_ref],
    )?;
    Ok(changed > 0)
}

fn bump_stat(conn: &Connection, name: &str, by: u64) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE stats SET value = value + ?2 WHERE name = ?1",
        params![name, by],
    )?;
    Ok(())
}

impl Store for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn upsert_player(
        &self,
        key: &IdentityKey,
        display_name: &str,
        shard_ref: Option<&str>,
        now: u64,
    ) -> Result<Upserted, StoreError> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let created = !player_exists(&tx, key)?;
        tx.execute(
            "INSERT INTO players (identity_key, display_name, total_xp, games_played, shard_ref, registered_at, updated_at)
             VALUES (?1, ?2, 0, 0, ?3, ?4, ?4)
             ON CONFLICT (identity_key) DO UPDATE SET
                 display_name = excluded.display_name,
                 shard_ref = COALESCE(excluded.shard_ref, players.shard_ref),
                 updated_at = excluded.updated_at",
            params![key.as_str(), display_name, shard_ref, now],
        )?;
        if created {
            bump_stat(&tx, "total_players", 1)?;
        }
        let player = load_player(&tx, key)?
            .ok_or_else(|| StoreError::Backend(format!("player {} vanished after upsert", key)))?;

        tx.commit()?;
        Ok(Upserted { player, created })
    }

    fn get_player(&self, key: &IdentityKey) -> Result<Option<PlayerRecord>, StoreError> {
        self.with_reader(|conn| load_player(conn, key))
    }

    fn list_players(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {PLAYER_COLUMNS} FROM players"))?;
            let rows = stmt.query_map([], row_to_player)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn rank_of(&self, key: &IdentityKey) -> Result<Option<u64>, StoreError> {
        self.with_reader(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 + (
                         SELECT COUNT(*) FROM players o
                          WHERE o.total_xp > p.total_xp
                             OR (o.total_xp = p.total_xp AND o.identity_key < p.identity_key)
                     )
                       FROM players p
                      WHERE p.identity_key = ?1",
                    params![key.as_str()],
                    |row| row.get::<_, u64>(0),
                )
                .optional()?)
        })
    }

    fn apply_xp_delta(
        &self,
        key: &IdentityKey,
        delta: u64,
        now: u64,
    ) -> Result<Option<PlayerRecord>, StoreError> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(total_xp) = player_total_xp(&tx, key)? else {
            return Ok(None);
        };
        checked_total("totalXp", total_xp, delta)?;
        credit_player(&tx, key, delta, now, None)?;
        let player = load_player(&tx, key)?;
        tx.commit()?;
        Ok(player)
    }

    fn append_score(&self, score: NewScore) -> Result<ScoreRecord, StoreError> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !player_exists(&tx, &score.player_key)? {
            return Err(StoreError::UnknownPlayer(score.player_key.to_string()));
        }
        let record = insert_score(&tx, score)?;
        tx.commit()?;
        Ok(record)
    }

    fn commit_submission(&self, score: NewScore) -> Result<Recorded, StoreError> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let key = score.player_key.clone();

        if let Some(token) = score.submission_id.as_deref() {
            if let Some(existing) = load_submission(&tx, &key, token)? {
                if !score.same_payload(&existing) {
                    return Err(StoreError::SubmissionConflict {
                        player: key.to_string(),
                        submission_id: token.to_string(),
                    });
                }
                let player = load_player(&tx, &key)?
                    .ok_or_else(|| StoreError::UnknownPlayer(key.to_string()))?;
                return Ok(Recorded {
                    score: existing,
                    player,
                    replayed: true,
                });
            }
        }

        // SQLite would turn an overflowing sum into a REAL, so check first
        let total_xp = player_total_xp(&tx, &key)?
            .ok_or_else(|| StoreError::UnknownPlayer(key.to_string()))?;
        checked_total("totalXp", total_xp, score.xp_earned)?;
        checked_total(
            "totalXpEarned",
            stat_value(&tx, "total_xp_earned")?,
            score.xp_earned,
        )?;

        let shard_ref = score.shard_ref.clone();
        let now = score.submitted_at;
        let record = insert_score(&tx, score)?;
        credit_player(&tx, &key, record.xp_earned, now, shard_ref.as_deref())?;
        bump_stat(&tx, "total_games_played", 1)?;
        bump_stat(&tx, "total_xp_earned", record.xp_earned)?;
        let player = load_player(&tx, &key)?
            .ok_or_else(|| StoreError::UnknownPlayer(key.to_string()))?;

        tx.commit()?;
        Ok(Recorded {
            score: record,
            player,
            replayed: false,
        })
    }

    fn scores(&self, query: &ScoreQuery) -> Result<Vec<ScoreRecord>, StoreError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SCORE_COLUMNS} FROM scores
                  WHERE (?1 IS NULL OR game_type = ?1)
                    AND (?2 IS NULL OR player_key = ?2)"
            ))?;
            let rows = stmt.query_map(
                params![
                    query.game_type.map(|g| g.key()),
                    query.player.as_ref().map(|p| p.as_str()),
                ],
                row_to_score,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn named_scores(&self, game_type: GameType) -> Result<Vec<NamedScore>, StoreError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SCORE_COLUMNS}, players.display_name
                   FROM scores JOIN players ON players.identity_key = scores.player_key
                  WHERE scores.game_type = ?1"
            ))?;
            let rows = stmt.query_map(params![game_type.key()], |row| {
                Ok(NamedScore {
                    score: row_to_score(row)?,
                    display_name: row.get(8)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn remove_player(&self, key: &IdentityKey) -> Result<bool, StoreError> {
        let conn = self.writer()?;
        let removed = conn.execute(
            "DELETE FROM players WHERE identity_key = ?1",
            params![key.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn stats(&self) -> Result<StatCounters, StoreError> {
        self.with_reader(load_stats)
    }

    fn stats_snapshot(&self) -> Result<StatsSnapshot, StoreError> {
        self.with_reader(|conn| {
            // one read transaction, so counters and leader agree
            let tx = conn.unchecked_transaction()?;
            let counters = load_stats(&tx)?;
            let leader = tx
                .query_row(
                    &format!(
                        "SELECT {PLAYER_COLUMNS} FROM players
                          ORDER BY total_xp DESC, identity_key ASC
                          LIMIT 1"
                    ),
                    [],
                    row_to_player,
                )
                .optional()?;
            tx.commit()?;
            Ok(StatsSnapshot { counters, leader })
        })
    }
}
