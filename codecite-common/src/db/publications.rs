//! Publication document operations
//!
//! Nested fields (authors, links, references, citation matches, attributes) are stored as
//! JSON text columns; the publication date as `YYYY-MM-DD`.

use crate::models::{PublicationRecord, RepositoryRef};
use crate::time::parse_iso_date;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;

/// Non-empty predicates supported by [`scan_page`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationFilter {
    All,
    /// At least one raw source-code link
    WithSourceLinks,
    /// At least one repository reference (resolved or not)
    WithRepositoryRefs,
    /// Both title and year present
    WithTitleAndYear,
}

impl PublicationFilter {
    fn sql(&self) -> &'static str {
        match self {
            PublicationFilter::All => "1 = 1",
            // Malformed JSON passes the filter so the row is skipped at decode time
            PublicationFilter::WithSourceLinks => {
                "CASE WHEN json_valid(source_links) THEN json_array_length(source_links) > 0 ELSE 1 END"
            }
            PublicationFilter::WithRepositoryRefs => {
                "CASE WHEN json_valid(repository_refs) THEN json_array_length(repository_refs) > 0 ELSE 1 END"
            }
            PublicationFilter::WithTitleAndYear => "title IS NOT NULL AND year IS NOT NULL",
        }
    }
}

const SELECT_COLUMNS: &str = "id, title, year, authors, venue_key, publication_date, \
     source_links, repository_refs, citation_matches, attributes";

/// Insert or replace a publication document
pub async fn save_publication(pool: &SqlitePool, publication: &PublicationRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO publications (
            id, title, year, authors, venue_key, publication_date,
            source_links, repository_refs, citation_matches, attributes,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            year = excluded.year,
            authors = excluded.authors,
            venue_key = excluded.venue_key,
            publication_date = excluded.publication_date,
            source_links = excluded.source_links,
            repository_refs = excluded.repository_refs,
            citation_matches = excluded.citation_matches,
            attributes = excluded.attributes,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&publication.id)
    .bind(&publication.title)
    .bind(publication.year)
    .bind(serde_json::to_string(&publication.authors)?)
    .bind(&publication.venue_key)
    .bind(publication.publication_date.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(serde_json::to_string(&publication.source_links)?)
    .bind(serde_json::to_string(&publication.repository_refs)?)
    .bind(serde_json::to_string(&publication.citation_matches)?)
    .bind(serde_json::to_string(&publication.attributes)?)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load publication by id
pub async fn load_publication(pool: &SqlitePool, id: &str) -> Result<Option<PublicationRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM publications WHERE id = ?",
        SELECT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(publication_from_row).transpose()
}

/// One page of a publication scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublicationPage {
    /// Rows that decoded, in id order
    pub records: Vec<PublicationRecord>,
    /// Ids of rows that failed to decode; logged and left out of `records`
    pub skipped: Vec<String>,
    /// Last id read, decodable or not. `None` means the scan is complete.
    pub last_id: Option<String>,
}

/// Fetch one page of publications matching `filter`, ordered by id.
///
/// Keyset pagination: pass `last_id` of the previous page as `after_id`. Rows whose
/// document columns do not decode are skipped with a warning, so one corrupt row never
/// ends a scan.
pub async fn scan_page(
    pool: &SqlitePool,
    filter: PublicationFilter,
    after_id: Option<&str>,
    limit: i64,
) -> Result<PublicationPage> {
    let sql = format!(
        "SELECT {} FROM publications WHERE {} AND (? IS NULL OR id > ?) ORDER BY id LIMIT ?",
        SELECT_COLUMNS,
        filter.sql()
    );

    let rows = sqlx::query(&sql)
        .bind(after_id)
        .bind(after_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    let mut page = PublicationPage::default();
    for row in &rows {
        let id: String = row.try_get("id")?;
        match publication_from_row(row) {
            Ok(record) => page.records.push(record),
            Err(e) => {
                warn!(publication_id = %id, "Skipping undecodable publication: {}", e);
                page.skipped.push(id.clone());
            }
        }
        page.last_id = Some(id);
    }

    Ok(page)
}

/// Replace the repository reference list of a publication
pub async fn set_repository_refs(
    pool: &SqlitePool,
    id: &str,
    refs: &[RepositoryRef],
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE publications SET repository_refs = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(serde_json::to_string(refs)?)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("publication {}", id)));
    }
    Ok(())
}

/// Set the accepted records for one citation source, leaving other sources untouched
pub async fn set_citation_matches(
    pool: &SqlitePool,
    id: &str,
    source: &str,
    matches: &[Value],
) -> Result<()> {
    let path = format!("$.\"{}\"", source.replace('"', ""));

    let result = sqlx::query(
        r#"
        UPDATE publications
        SET citation_matches = json_set(citation_matches, ?, json(?)),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(path)
    .bind(serde_json::to_string(matches)?)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("publication {}", id)));
    }
    Ok(())
}

/// Set the publication date of every publication whose venue key starts with `venue_prefix`.
///
/// Returns the number of publications updated.
pub async fn assign_venue_date(
    pool: &SqlitePool,
    venue_prefix: &str,
    date: NaiveDate,
) -> Result<u64> {
    if venue_prefix.is_empty() {
        return Err(Error::InvalidInput("venue prefix must not be empty".to_string()));
    }

    let pattern = format!("{}%", escape_like(venue_prefix));
    let result = sqlx::query(
        r#"
        UPDATE publications
        SET publication_date = ?, updated_at = CURRENT_TIMESTAMP
        WHERE venue_key LIKE ? ESCAPE '\'
        "#,
    )
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(pattern)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn publication_from_row(row: &SqliteRow) -> Result<PublicationRecord> {
    let authors: String = row.try_get("authors")?;
    let source_links: String = row.try_get("source_links")?;
    let repository_refs: String = row.try_get("repository_refs")?;
    let citation_matches: String = row.try_get("citation_matches")?;
    let attributes: String = row.try_get("attributes")?;
    let publication_date: Option<String> = row.try_get("publication_date")?;

    Ok(PublicationRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        authors: serde_json::from_str(&authors)?,
        venue_key: row.try_get("venue_key")?,
        publication_date: publication_date.as_deref().and_then(parse_iso_date),
        source_links: serde_json::from_str(&source_links)?,
        repository_refs: serde_json::from_str(&repository_refs)?,
        citation_matches: serde_json::from_str(&citation_matches)?,
        attributes: serde_json::from_str(&attributes)?,
    })
}
