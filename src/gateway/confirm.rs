//! Ledger confirmation seam.
//!
//! The gateway only applies facts the authoritative ledger has already
//! decided. How that is established (a trusted relay, a light client, a
//! fake in tests) is behind [`Confirmations`], handed to the gateway at
//! construction.

use crate::error::IndexError;
use crate::identity::IdentityKey;
use crate::store::NewScore;

/// A write the gateway is about to apply.
#[derive(Debug, Clone, Copy)]
pub enum Fact<'a> {
    Registration {
        identity: &'a IdentityKey,
        display_name: &'a str,
        shard_ref: Option<&'a str>,
    },
    Score(&'a NewScore),
    Removal {
        identity: &'a IdentityKey,
    },
}

impl Fact<'_> {
    pub fn identity(&self) -> &IdentityKey {
        match self {
            Fact::Registration { identity, .. } => identity,
            Fact::Score(score) => &score.player_key,
            Fact::Removal { identity } => identity,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Fact::Registration { .. } => "registration",
            Fact::Score(_) => "score",
            Fact::Removal { .. } => "removal",
        }
    }
}

pub trait Confirmations: Send + Sync {
    /// `Ok(())` if the ledger stands behind `fact`. Any error aborts the
    /// write before storage is touched.
    fn confirm(&self, fact: &Fact<'_>) -> Result<(), IndexError>;
}

/// Accepts every fact. The relay calling the gateway has already confirmed
/// it against the ledger and authenticated with the write secret.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustRelay;

impl Confirmations for TrustRelay {
    fn confirm(&self, _fact: &Fact<'_>) -> Result<(), IndexError> {
        Ok(())
    }
}
