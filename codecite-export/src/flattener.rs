//! Export flattener
//!
//! Joins each eligible publication with the repositories it owns and yields one row per
//! (publication, owned repository). A publication owning none still yields exactly one
//! row, with every repository column null.

use crate::error::Result;
use crate::features::{BucketWidths, ExportSchema};
use async_stream::try_stream;
use codecite_common::config::{EligibilityMode, ExportConfig};
use codecite_common::db::publications::{self, PublicationFilter};
use codecite_common::db::repositories::load_repository;
use codecite_common::db::PAGE_SIZE;
use codecite_common::time::pivot_from_date;
use codecite_common::{PublicationRecord, RepositoryId, RepositoryRecord};
use futures::Stream;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_CITATION_POINTER: &str = "/inline_links/cited_by/total";

/// Which publications make it into an export
#[derive(Clone)]
pub enum Eligibility {
    /// At least one stored match from the named citation source
    CitationMatch(String),
    All,
    Custom(Arc<dyn Fn(&PublicationRecord) -> bool + Send + Sync>),
}

impl Eligibility {
    pub fn admits(&self, publication: &PublicationRecord) -> bool {
        match self {
            Eligibility::CitationMatch(source) => publication.has_citation_match(source),
            Eligibility::All => true,
            Eligibility::Custom(predicate) => predicate(publication),
        }
    }
}

impl fmt::Debug for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::CitationMatch(source) => f.debug_tuple("CitationMatch").field(source).finish(),
            Eligibility::All => f.write_str("All"),
            Eligibility::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Positional values aligned with [`ExportSchema::columns`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub values: Vec<Value>,
}

impl ExportRow {
    pub fn get<'a>(&'a self, schema: &ExportSchema, column: &str) -> Option<&'a Value> {
        let index = schema.columns().iter().position(|c| c == column)?;
        self.values.get(index)
    }
}

#[derive(Debug, Clone)]
pub struct Exporter {
    pool: SqlitePool,
    schema: Arc<ExportSchema>,
    eligibility: Eligibility,
    citation_source: String,
    citation_pointer: String,
    widths: BucketWidths,
    ceiling: i64,
}

impl Exporter {
    pub fn new(pool: SqlitePool, schema: ExportSchema) -> Self {
        let defaults = ExportConfig::default();
        Self {
            pool,
            schema: Arc::new(schema),
            eligibility: Eligibility::CitationMatch(defaults.citation_source.clone()),
            citation_source: defaults.citation_source,
            citation_pointer: DEFAULT_CITATION_POINTER.to_string(),
            widths: BucketWidths::default(),
            ceiling: i64::MAX,
        }
    }

    /// Build an exporter from the `[export]` section.
    ///
    /// `reference_ceiling` is the linking ceiling; repositories that reached it are
    /// exported as misses.
    pub fn from_config(
        pool: SqlitePool,
        config: &ExportConfig,
        reference_ceiling: Option<u64>,
    ) -> Result<Self> {
        let schema = ExportSchema::from_config(config)?;
        let eligibility = match config.eligibility {
            EligibilityMode::CitationMatch => Eligibility::CitationMatch(config.citation_source.clone()),
            EligibilityMode::All => Eligibility::All,
        };

        Ok(Self::new(pool, schema)
            .with_eligibility(eligibility)
            .with_citation_source(&config.citation_source, &config.citation_pointer)
            .with_widths(BucketWidths::from_config(&config.series_widths)?)
            .with_ceiling(reference_ceiling))
    }

    pub fn with_eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = eligibility;
        self
    }

    /// Source and JSON pointer for the `citations` column
    pub fn with_citation_source(mut self, source: &str, pointer: &str) -> Self {
        self.citation_source = source.to_string();
        self.citation_pointer = pointer.to_string();
        self
    }

    pub fn with_widths(mut self, widths: BucketWidths) -> Self {
        self.widths = widths;
        self
    }

    pub fn with_ceiling(mut self, ceiling: Option<u64>) -> Self {
        self.ceiling = ceiling
            .map(|c| i64::try_from(c).unwrap_or(i64::MAX))
            .unwrap_or(i64::MAX);
        self
    }

    pub fn schema(&self) -> &ExportSchema {
        &self.schema
    }

    /// Stream every export row.
    ///
    /// Each call starts a fresh scan of the store. Undecodable publications are logged and
    /// left out; only a failing scan ends the stream with an error.
    pub fn rows(&self) -> impl Stream<Item = Result<ExportRow>> + Send + '_ {
        try_stream! {
            let mut after: Option<String> = None;

            loop {
                let page = publications::scan_page(
                    &self.pool,
                    PublicationFilter::All,
                    after.as_deref(),
                    PAGE_SIZE,
                )
                .await?;

                let Some(last_id) = page.last_id else {
                    break;
                };
                after = Some(last_id);

                for publication in page.records {
                    if !self.eligibility.admits(&publication) {
                        continue;
                    }
                    for row in self.publication_rows(&publication).await {
                        yield row;
                    }
                }
            }
        }
    }

    /// Rows for one publication: one per owned repository, or a single null-filled row
    pub async fn publication_rows(&self, publication: &PublicationRecord) -> Vec<ExportRow> {
        let base = self.base_values(publication);
        let pivot = publication.publication_date.map(pivot_from_date);

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        for reference in &publication.repository_refs {
            let Some(id) = reference.repository_id() else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            let Some(record) = self.owned_repository(id, &publication.id).await else {
                continue;
            };

            let mut values = base.clone();
            for group in self.schema.feature_groups() {
                values.extend(group.fill(&record.snapshot, pivot, &self.widths));
            }
            rows.push(ExportRow { values });
        }

        if rows.is_empty() {
            let mut values = base;
            values.resize(self.schema.columns().len(), Value::Null);
            rows.push(ExportRow { values });
        }
        rows
    }

    fn base_values(&self, publication: &PublicationRecord) -> Vec<Value> {
        let mut values: Vec<Value> = self
            .schema
            .publication_columns()
            .iter()
            .map(|column| column.value(publication))
            .collect();
        values.push(self.citations(publication));
        values
    }

    fn citations(&self, publication: &PublicationRecord) -> Value {
        publication
            .citation_matches
            .get(&self.citation_source)
            .and_then(|matches| matches.first())
            .and_then(|record| record.pointer(&self.citation_pointer))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// The repository, if it exists, is under the ceiling and `publication_id` owns it
    async fn owned_repository(&self, id: RepositoryId, publication_id: &str) -> Option<RepositoryRecord> {
        let record = match load_repository(&self.pool, id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(repository_id = %id, publication_id, "Referenced repository not in store");
                return None;
            }
            Err(e) => {
                warn!(repository_id = %id, publication_id, "Failed to load repository: {}", e);
                return None;
            }
        };

        if record.reference_count >= self.ceiling {
            debug!(repository_id = %id, count = record.reference_count, "Repository over reference ceiling");
            return None;
        }

        let owns = record
            .earliest_owner
            .as_ref()
            .is_some_and(|owner| owner.publication_id == publication_id);
        owns.then_some(record)
    }
}
