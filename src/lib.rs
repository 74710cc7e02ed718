//! Aggregation index for per-player arcade ledgers.
//!
//! Players and their score submissions are confirmed one at a time on a
//! per-player ledger. This crate keeps a global, query-friendly copy of those
//! facts and answers what no single ledger shard can: leaderboards, per-game
//! high scores and global statistics.
//!
//! ```ignore
//! use std::sync::Arc;
//! use arcade_index::{AggregationEngine, PlayerDirectory, ScoreMirror, StoreBackend, SyncGateway};
//!
//! let store = StoreBackend::Memory.open()?;
//! let gateway = SyncGateway::new(store.clone());
//! let engine = AggregationEngine::new(
//!     store.clone(),
//!     PlayerDirectory::new(store.clone()),
//!     ScoreMirror::new(store),
//! );
//! ```

pub mod clock;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod game;
pub mod gateway;
#[cfg(feature = "http")]
pub mod http;
pub mod identity;
pub mod level;
pub mod lock;
pub mod mirror;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::IndexConfig;
pub use directory::PlayerDirectory;
pub use engine::{AggregationEngine, GlobalStats, HighScoreEntry, LeaderboardEntry};
pub use error::{ErrorKind, IndexError};
pub use game::GameType;
pub use gateway::{Confirmations, Fact, Registration, ScoreSubmission, SyncGateway, TrustRelay};
pub use identity::IdentityKey;
pub use level::level_for_xp;
pub use mirror::ScoreMirror;
pub use store::{
    PlayerRecord, Recorded, ScoreRecord, SharedStore, StatCounters, Store, StoreBackend,
    StoreError,
};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::InMemoryStore;
