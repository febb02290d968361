//! Database initialization
//!
//! Opens (creating if needed) the document store and creates tables idempotently.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Open the document store at `db_path` and create tables if needed
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // WAL lets the exporter read while a linking pass writes
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory store, used by tests and dry runs.
///
/// The pool never recycles its connection, so the database lives as long as the pool.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent - safe to call multiple times)
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    create_publications_table(pool).await?;
    create_repositories_table(pool).await?;
    create_repository_references_table(pool).await?;

    tracing::debug!("Database tables initialized (publications, repositories, repository_references)");

    Ok(())
}

async fn create_publications_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS publications (
            id TEXT PRIMARY KEY,
            title TEXT,
            year INTEGER,
            authors TEXT NOT NULL DEFAULT '[]',
            venue_key TEXT,
            publication_date TEXT,
            source_links TEXT NOT NULL DEFAULT '[]',
            repository_refs TEXT NOT NULL DEFAULT '[]',
            citation_matches TEXT NOT NULL DEFAULT '{}',
            attributes TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_publications_venue ON publications(venue_key)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_repositories_table(pool: &SqlitePool) -> Result<()> {
    // UNIQUE(platform, owner, name): one document per repository identity
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            guid TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            stats TEXT NOT NULL DEFAULT '{}',
            languages TEXT NOT NULL DEFAULT '{}',
            contributors TEXT NOT NULL DEFAULT '[]',
            commit_log TEXT,
            detailed_commits TEXT NOT NULL DEFAULT '[]',
            star_events TEXT NOT NULL DEFAULT '[]',
            reference_count INTEGER NOT NULL DEFAULT 1,
            earliest_owner_id TEXT,
            earliest_owner_date TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(platform, owner, name),
            CHECK (reference_count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_repository_references_table(pool: &SqlitePool) -> Result<()> {
    // seq records link order; ties on publication_date resolve to the lowest seq
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repository_references (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id TEXT NOT NULL REFERENCES repositories(guid),
            publication_id TEXT NOT NULL,
            publication_date TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(repository_id, publication_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_repository_references_repo \
         ON repository_references(repository_id, publication_date, seq)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_tables_is_idempotent() {
        let pool = init_memory_pool().await.unwrap();
        init_tables(&pool).await.unwrap();
        init_tables(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|(name,)| name.as_str()).collect();
        assert_eq!(names, vec!["publications", "repositories", "repository_references"]);
    }

    #[tokio::test]
    async fn test_file_database_created_in_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("codecite.db");

        let pool = init_database_pool(&db_path).await.unwrap();
        assert!(db_path.exists());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM publications")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
