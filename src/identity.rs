//! Identity keys and display-name rules.
//!
//! Every store, index and lock in the crate is keyed by an [`IdentityKey`],
//! the canonical lower-case form of a player's wallet or account address.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Longest accepted identity, after normalization.
pub const MAX_IDENTITY_LEN: usize = 128;

/// Display name length bounds (inclusive).
pub const MIN_DISPLAY_NAME_LEN: usize = 3;
pub const MAX_DISPLAY_NAME_LEN: usize = 20;

/// Prefix some relays put in front of addresses (`User:0xabc...`).
const OWNER_PREFIX: &str = "User:";

/// Canonical, case-insensitive player identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Normalize a raw identifier into its canonical key.
    ///
    /// Surrounding whitespace and a leading `User:` tag are dropped and ASCII
    /// letters are lower-cased, so `0xABC` and ` User:0xabc ` name the same
    /// player.
    pub fn parse(raw: &str) -> Result<Self, IndexError> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix(OWNER_PREFIX).unwrap_or(trimmed);
        let key = trimmed.to_ascii_lowercase();

        if key.is_empty() {
            return Err(IndexError::InvalidInput("identity must not be empty".into()));
        }
        if key.len() > MAX_IDENTITY_LEN {
            return Err(IndexError::InvalidInput(format!(
                "identity must be at most {} characters",
                MAX_IDENTITY_LEN
            )));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '_' | '-'))
        {
            return Err(IndexError::InvalidInput(format!(
                "identity contains invalid characters: {}",
                raw.trim()
            )));
        }

        Ok(IdentityKey(key))
    }

    /// Wrap a key that is already canonical (read back from storage).
    pub(crate) fn from_canonical(key: String) -> Self {
        IdentityKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check a display name: 3 to 20 characters of `[A-Za-z0-9_-]`.
pub fn validate_display_name(name: &str) -> Result<(), IndexError> {
    let len = name.chars().count();
    if !(MIN_DISPLAY_NAME_LEN..=MAX_DISPLAY_NAME_LEN).contains(&len) {
        return Err(IndexError::InvalidInput(format!(
            "display name must be between {} and {} characters",
            MIN_DISPLAY_NAME_LEN, MAX_DISPLAY_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(IndexError::InvalidInput(
            "display name may only contain letters, digits, '_' and '-'".into(),
        ));
    }
    Ok(())
}
