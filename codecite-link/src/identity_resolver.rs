//! Repository identity resolver
//!
//! Deduplicates repository keys against the store. A hit counts one more reference and
//! returns the stored id; a miss tells the caller to fetch the repository and
//! [`IdentityResolver::register`] the snapshot.
//!
//! An optional reference ceiling caps how often a repository may be resolved. Once its
//! counter reaches the ceiling the resolver reports a miss, exactly as if the repository
//! were unknown.

use codecite_common::db::repositories::{self, RepositoryLookup};
use codecite_common::{RepositoryId, RepositoryKey, RepositorySnapshot, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Result of a counted lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Known(RepositoryId),
    /// Not stored, or stored but over the reference ceiling
    Miss,
}

impl Resolution {
    pub fn id(&self) -> Option<RepositoryId> {
        match self {
            Resolution::Known(id) => Some(*id),
            Resolution::Miss => None,
        }
    }
}

pub struct IdentityResolver {
    pool: SqlitePool,
    ceiling: i64,
}

impl IdentityResolver {
    /// Resolver without a reference ceiling
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_ceiling(pool, None)
    }

    /// Resolver reporting a miss for repositories referenced `ceiling` times or more
    pub fn with_ceiling(pool: SqlitePool, ceiling: Option<u64>) -> Self {
        let ceiling = ceiling
            .map(|c| i64::try_from(c).unwrap_or(i64::MAX))
            .unwrap_or(i64::MAX);
        Self { pool, ceiling }
    }

    pub async fn resolve_key(&self, key: &RepositoryKey) -> Result<Resolution> {
        let claimed = repositories::increment_reference_count_below(
            &self.pool,
            RepositoryLookup::Key(key),
            self.ceiling,
        )
        .await?;

        debug!(key = %key, hit = claimed.is_some(), "Resolved repository key");
        Ok(claimed.map_or(Resolution::Miss, Resolution::Known))
    }

    pub async fn resolve_id(&self, id: RepositoryId) -> Result<Resolution> {
        let claimed = repositories::increment_reference_count_below(
            &self.pool,
            RepositoryLookup::Id(id),
            self.ceiling,
        )
        .await?;

        debug!(repository_id = %id, hit = claimed.is_some(), "Resolved repository id");
        Ok(claimed.map_or(Resolution::Miss, Resolution::Known))
    }

    /// Whether the key is stored at all, ignoring the ceiling and without counting
    pub async fn is_stored(&self, key: &RepositoryKey) -> Result<bool> {
        Ok(repositories::find_by_key(&self.pool, key).await?.is_some())
    }

    /// Store a fetched snapshot keyed by its identity triple.
    ///
    /// Racing registrations of the same key converge on one record; the loser's call
    /// counts as a reference to the winner's record.
    pub async fn register(&self, snapshot: &RepositorySnapshot) -> Result<RepositoryId> {
        let id = repositories::register_snapshot(&self.pool, snapshot).await?;
        debug!(key = %snapshot.key, repository_id = %id, "Registered repository snapshot");
        Ok(id)
    }
}
