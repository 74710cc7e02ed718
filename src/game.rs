//! The arcade's game catalogue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Numeric game identifier.
pub type GameId = u16;

/// A supported game type. Unknown names are rejected, never mapped to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameType {
    SpeedClicker,
    MemoryMatrix,
    ReactionStrike,
    MathBlitz,
    SnakeSprint,
}

impl GameType {
    pub const ALL: [GameType; 5] = [
        GameType::SpeedClicker,
        GameType::MemoryMatrix,
        GameType::ReactionStrike,
        GameType::MathBlitz,
        GameType::SnakeSprint,
    ];

    /// Wire / storage name, e.g. `SPEED_CLICKER`.
    pub fn key(&self) -> &'static str {
        match self {
            GameType::SpeedClicker => "SPEED_CLICKER",
            GameType::MemoryMatrix => "MEMORY_MATRIX",
            GameType::ReactionStrike => "REACTION_STRIKE",
            GameType::MathBlitz => "MATH_BLITZ",
            GameType::SnakeSprint => "SNAKE_SPRINT",
        }
    }

    pub fn id(&self) -> GameId {
        match self {
            GameType::SpeedClicker => 1,
            GameType::MemoryMatrix => 2,
            GameType::ReactionStrike => 3,
            GameType::MathBlitz => 4,
            GameType::SnakeSprint => 5,
        }
    }

    /// Human-readable title.
    pub fn name(&self) -> &'static str {
        match self {
            GameType::SpeedClicker => "Speed Clicker",
            GameType::MemoryMatrix => "Memory Matrix",
            GameType::ReactionStrike => "Reaction Strike",
            GameType::MathBlitz => "Math Blitz",
            GameType::SnakeSprint => "Snake Sprint",
        }
    }

    /// XP the game client awards for a run.
    ///
    /// The index never calls this: `xpEarned` arrives as an already decided
    /// fact. Relays that need to compute it use the same numbers the games do.
    pub fn reference_xp(&self, score: u64, bonus: Option<u64>) -> u64 {
        let bonus = bonus.unwrap_or(0);
        match self {
            // clicks in 10s
            GameType::SpeedClicker => score.saturating_mul(10),
            // level reached, perfect rounds
            GameType::MemoryMatrix => score
                .saturating_mul(100)
                .saturating_add(bonus.saturating_mul(50)),
            // average reaction in ms (lower is better), targets hit
            GameType::ReactionStrike => 1000u64.saturating_sub(score).saturating_mul(bonus),
            // correct answers, best streak
            GameType::MathBlitz => score
                .saturating_mul(25)
                .saturating_add(bonus.saturating_mul(10)),
            // snake length, apples eaten
            GameType::SnakeSprint => score
                .saturating_mul(15)
                .saturating_add(bonus.saturating_mul(5)),
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for GameType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        GameType::ALL
            .into_iter()
            .find(|game| game.key().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| IndexError::InvalidInput(format!("unknown game type: {}", wanted)))
    }
}

/// Catalogue entry served by `GET games`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub game_type: GameType,
    pub id: GameId,
    pub name: String,
}

impl From<GameType> for GameInfo {
    fn from(game_type: GameType) -> Self {
        GameInfo {
            game_type,
            id: game_type.id(),
            name: game_type.name().to_string(),
        }
    }
}

pub fn catalogue() -> Vec<GameInfo> {
    GameType::ALL.into_iter().map(GameInfo::from).collect()
}
