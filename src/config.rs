//! Runtime configuration.

use std::net::SocketAddr;

use crate::error::IndexError;
use crate::store::StoreBackend;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_PAGE_SIZE: usize = 200;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 100;
pub const DEFAULT_SCORES_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub bind: SocketAddr,
    pub backend: StoreBackend,
    /// Shared secret required on every write endpoint. With `None`, every
    /// write is refused.
    pub write_secret: Option<String>,
    /// Upper bound applied to every `limit` query parameter.
    pub max_page_size: usize,
    pub default_leaderboard_limit: usize,
    pub default_scores_limit: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            backend: StoreBackend::Memory,
            write_secret: None,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            default_leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
            default_scores_limit: DEFAULT_SCORES_LIMIT,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.max_page_size == 0 {
            return Err(IndexError::InvalidInput("max_page_size must be > 0".into()));
        }
        if self.default_leaderboard_limit > self.max_page_size
            || self.default_scores_limit > self.max_page_size
        {
            return Err(IndexError::InvalidInput(
                "default page sizes must not exceed max_page_size".into(),
            ));
        }
        if matches!(&self.write_secret, Some(secret) if secret.is_empty()) {
            return Err(IndexError::InvalidInput("write secret must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve a caller's `limit`: the default when absent, never above the max.
    pub fn page(&self, requested: Option<usize>, default: usize) -> usize {
        requested.unwrap_or(default).min(self.max_page_size)
    }
}
