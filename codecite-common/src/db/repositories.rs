//! Repository document operations
//!
//! One row per (platform, owner, name). Referencing publications live in the
//! `repository_references` table; the earliest owner is denormalized onto the repository
//! row and recomputed from that table inside the same transaction as each insert.

use crate::models::{
    OwnerRef, RepositoryId, RepositoryKey, RepositoryRecord, RepositorySnapshot, Platform,
};
use crate::time::parse_iso_date;
use crate::{Error, Result};
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// How a repository is addressed by a counted lookup
#[derive(Debug, Clone, Copy)]
pub enum RepositoryLookup<'a> {
    Key(&'a RepositoryKey),
    Id(RepositoryId),
}

/// Owner before and after a recompute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerUpdate {
    pub previous: Option<OwnerRef>,
    pub current: Option<OwnerRef>,
}

impl OwnerUpdate {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Store a freshly fetched snapshot, or count another reference if the key already exists.
///
/// The first stored snapshot wins; later registrations of the same key only bump the
/// reference counter. Returns the repository id either way.
pub async fn register_snapshot(
    pool: &SqlitePool,
    snapshot: &RepositorySnapshot,
) -> Result<RepositoryId> {
    let key = &snapshot.key;
    let guid: String = sqlx::query_scalar(
        r#"
        INSERT INTO repositories (
            guid, platform, owner, name, stats, languages, contributors,
            commit_log, detailed_commits, star_events, reference_count,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(platform, owner, name) DO UPDATE SET
            reference_count = reference_count + 1,
            updated_at = CURRENT_TIMESTAMP
        RETURNING guid
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(key.platform.as_str())
    .bind(&key.owner)
    .bind(&key.name)
    .bind(serde_json::to_string(&snapshot.stats)?)
    .bind(serde_json::to_string(&snapshot.languages)?)
    .bind(serde_json::to_string(&snapshot.contributors)?)
    .bind(
        snapshot
            .commit_log
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(serde_json::to_string(&snapshot.detailed_commits)?)
    .bind(serde_json::to_string(&snapshot.star_events)?)
    .fetch_one(pool)
    .await?;

    parse_guid(&guid)
}

/// Look up a repository id by identity key without counting a reference
pub async fn find_by_key(pool: &SqlitePool, key: &RepositoryKey) -> Result<Option<RepositoryId>> {
    let guid: Option<String> = sqlx::query_scalar(
        "SELECT guid FROM repositories WHERE platform = ? AND owner = ? AND name = ?",
    )
    .bind(key.platform.as_str())
    .bind(&key.owner)
    .bind(&key.name)
    .fetch_optional(pool)
    .await?;

    guid.as_deref().map(parse_guid).transpose()
}

/// Count one more reference to a repository whose counter is still below `ceiling`.
///
/// Returns `None` when the repository does not exist or has reached the ceiling. The
/// check and the increment are one statement, so concurrent claims cannot overshoot.
pub async fn increment_reference_count_below(
    pool: &SqlitePool,
    lookup: RepositoryLookup<'_>,
    ceiling: i64,
) -> Result<Option<RepositoryId>> {
    let guid: Option<String> = match lookup {
        RepositoryLookup::Key(key) => {
            sqlx::query_scalar(
                r#"
                UPDATE repositories
                SET reference_count = reference_count + 1, updated_at = CURRENT_TIMESTAMP
                WHERE platform = ? AND owner = ? AND name = ? AND reference_count < ?
                RETURNING guid
                "#,
            )
            .bind(key.platform.as_str())
            .bind(&key.owner)
            .bind(&key.name)
            .bind(ceiling)
            .fetch_optional(pool)
            .await?
        }
        RepositoryLookup::Id(id) => {
            sqlx::query_scalar(
                r#"
                UPDATE repositories
                SET reference_count = reference_count + 1, updated_at = CURRENT_TIMESTAMP
                WHERE guid = ? AND reference_count < ?
                RETURNING guid
                "#,
            )
            .bind(id.to_string())
            .bind(ceiling)
            .fetch_optional(pool)
            .await?
        }
    };

    guid.as_deref().map(parse_guid).transpose()
}

/// Load the full repository document, including referencing publications in link order
pub async fn load_repository(
    pool: &SqlitePool,
    id: RepositoryId,
) -> Result<Option<RepositoryRecord>> {
    let row = sqlx::query(
        r#"
        SELECT guid, platform, owner, name, stats, languages, contributors, commit_log,
               detailed_commits, star_events, reference_count,
               earliest_owner_id, earliest_owner_date
        FROM repositories
        WHERE guid = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let references: Vec<(String, String)> = sqlx::query_as(
        "SELECT publication_id, publication_date FROM repository_references \
         WHERE repository_id = ? ORDER BY seq",
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    let referencing_publications = references
        .into_iter()
        .filter_map(|(publication_id, date)| owner_ref(Some(publication_id), Some(date)))
        .collect();

    let mut record = repository_from_row(&row)?;
    record.referencing_publications = referencing_publications;
    Ok(Some(record))
}

/// Touch a repository row at the start of a linking transaction.
///
/// The write takes the store's write lock for the rest of the transaction. Returns `false`
/// when no such repository exists.
pub async fn touch_repository(conn: &mut SqliteConnection, id: RepositoryId) -> Result<bool> {
    let result = sqlx::query("UPDATE repositories SET updated_at = CURRENT_TIMESTAMP WHERE guid = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Record a (repository, publication) reference.
///
/// Returns `false` when the pair was already recorded; the existing row is left untouched.
pub async fn insert_reference(
    conn: &mut SqliteConnection,
    id: RepositoryId,
    publication_id: &str,
    publication_date: NaiveDate,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO repository_references (repository_id, publication_id, publication_date)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(publication_id)
    .bind(publication_date.format("%Y-%m-%d").to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Recompute the earliest owner from the reference table and store it on the repository.
///
/// Earliest date wins; among equal dates the reference recorded first wins.
pub async fn recompute_owner(conn: &mut SqliteConnection, id: RepositoryId) -> Result<OwnerUpdate> {
    let previous: Option<(Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT earliest_owner_id, earliest_owner_date FROM repositories WHERE guid = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    let Some((previous_id, previous_date)) = previous else {
        return Err(Error::NotFound(format!("repository {}", id)));
    };
    let previous = owner_ref(previous_id, previous_date);

    let earliest: Option<(String, String)> = sqlx::query_as(
        r#"
        SELECT publication_id, publication_date
        FROM repository_references
        WHERE repository_id = ?
        ORDER BY publication_date ASC, seq ASC
        LIMIT 1
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    let current = earliest.and_then(|(publication_id, date)| owner_ref(Some(publication_id), Some(date)));

    let update = OwnerUpdate { previous, current };
    if update.changed() {
        sqlx::query(
            r#"
            UPDATE repositories
            SET earliest_owner_id = ?, earliest_owner_date = ?, updated_at = CURRENT_TIMESTAMP
            WHERE guid = ?
            "#,
        )
        .bind(update.current.as_ref().map(|o| o.publication_id.clone()))
        .bind(
            update
                .current
                .as_ref()
                .map(|o| o.publication_date.format("%Y-%m-%d").to_string()),
        )
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(update)
}

/// Current earliest owner of a repository
pub async fn earliest_owner(pool: &SqlitePool, id: RepositoryId) -> Result<Option<OwnerRef>> {
    let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT earliest_owner_id, earliest_owner_date FROM repositories WHERE guid = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|(publication_id, date)| owner_ref(publication_id, date)))
}

/// True iff `publication_id` is the current earliest owner of the repository
pub async fn is_owner(pool: &SqlitePool, id: RepositoryId, publication_id: &str) -> Result<bool> {
    let owner = earliest_owner(pool, id).await?;
    Ok(owner.is_some_and(|o| o.publication_id == publication_id))
}

fn owner_ref(publication_id: Option<String>, date: Option<String>) -> Option<OwnerRef> {
    Some(OwnerRef {
        publication_id: publication_id?,
        publication_date: parse_iso_date(&date?)?,
    })
}

fn parse_guid(guid: &str) -> Result<RepositoryId> {
    Uuid::parse_str(guid)
        .map_err(|e| Error::Internal(format!("Corrupt repository guid {}: {}", guid, e)))
}

fn repository_from_row(row: &SqliteRow) -> Result<RepositoryRecord> {
    let guid: String = row.get("guid");
    let platform: String = row.get("platform");
    let platform = Platform::parse(&platform)
        .ok_or_else(|| Error::Internal(format!("Unknown platform in store: {}", platform)))?;
    let owner: String = row.get("owner");
    let name: String = row.get("name");

    let stats: String = row.get("stats");
    let languages: String = row.get("languages");
    let contributors: String = row.get("contributors");
    let commit_log: Option<String> = row.get("commit_log");
    let detailed_commits: String = row.get("detailed_commits");
    let star_events: String = row.get("star_events");

    let snapshot = RepositorySnapshot {
        key: RepositoryKey::new(platform, &owner, &name),
        stats: serde_json::from_str(&stats)?,
        languages: serde_json::from_str(&languages)?,
        contributors: serde_json::from_str(&contributors)?,
        commit_log: commit_log.as_deref().map(serde_json::from_str).transpose()?,
        detailed_commits: serde_json::from_str(&detailed_commits)?,
        star_events: serde_json::from_str(&star_events)?,
    };

    Ok(RepositoryRecord {
        id: parse_guid(&guid)?,
        snapshot,
        reference_count: row.get("reference_count"),
        earliest_owner: owner_ref(row.get("earliest_owner_id"), row.get("earliest_owner_date")),
        referencing_publications: Vec::new(),
    })
}
