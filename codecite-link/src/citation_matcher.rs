//! Citation matching pass
//!
//! Queries a citation provider with each publication's title and year, keeps the
//! candidates that pass the date window (and the optional title-similarity floor), and
//! stores them on the publication under the provider's source name.

use crate::date_window::{validate_candidate, WindowVerdict};
use crate::providers::{normalize_title, CitationProvider, CitationRecord, ProviderError, Throttle};
use codecite_common::db::publications::{self, PublicationFilter};
use codecite_common::db::PAGE_SIZE;
use codecite_common::{PublicationRecord, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A provider record weighed against one publication
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub source: String,
    pub record: Value,
    pub verdict: WindowVerdict,
    /// Normalized Levenshtein similarity of the titles, when the record has one
    pub title_similarity: Option<f64>,
}

impl MatchCandidate {
    /// Date window passed
    pub fn valid(&self) -> bool {
        self.verdict.is_match()
    }

    /// Valid, and similar enough when a floor is set
    pub fn accepted(&self, min_title_similarity: Option<f64>) -> bool {
        if !self.valid() {
            return false;
        }
        match min_title_similarity {
            Some(floor) => self.title_similarity.is_some_and(|s| s >= floor),
            None => true,
        }
    }
}

/// Per-publication outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Results stored (possibly zero accepted records)
    Stored { accepted: usize, rejected: usize },
    /// Publication already has results for this source
    AlreadyMatched,
    /// Title or year missing
    MissingField,
    /// Provider kept failing; nothing stored, retried on the next pass
    ProviderFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub publications_scanned: usize,
    pub stored: usize,
    pub with_matches: usize,
    pub already_matched: usize,
    pub provider_failures: usize,
    /// Stored publications whose document columns could not be decoded
    pub undecodable: usize,
    pub failed: usize,
}

pub struct CitationMatcher {
    pool: SqlitePool,
    provider: Arc<dyn CitationProvider>,
    throttle: Throttle,
    min_title_similarity: Option<f64>,
}

impl CitationMatcher {
    pub fn new(pool: SqlitePool, provider: Arc<dyn CitationProvider>, throttle: Throttle) -> Self {
        Self {
            pool,
            provider,
            throttle,
            min_title_similarity: None,
        }
    }

    pub fn with_min_title_similarity(mut self, floor: Option<f64>) -> Self {
        self.min_title_similarity = floor;
        self
    }

    /// Query the provider and weigh every returned record
    pub async fn candidates(
        &self,
        title: &str,
        year: i32,
    ) -> std::result::Result<Vec<MatchCandidate>, ProviderError> {
        let records = self
            .throttle
            .call(|| self.provider.search(title, year))
            .await?;

        let query = normalize_title(title);
        Ok(records
            .into_iter()
            .map(|record| self.weigh(&query, year, record))
            .collect())
    }

    fn weigh(&self, query: &str, year: i32, record: CitationRecord) -> MatchCandidate {
        let verdict = validate_candidate(&record.date_fields, year);
        let title_similarity = record
            .title
            .as_deref()
            .map(|title| strsim::normalized_levenshtein(query, &normalize_title(title)));

        MatchCandidate {
            source: self.provider.source().to_string(),
            record: record.raw,
            verdict,
            title_similarity,
        }
    }

    pub async fn match_publication(&self, publication: &PublicationRecord) -> Result<MatchOutcome> {
        let source = self.provider.source();
        if publication.citation_matches.contains_key(source) {
            return Ok(MatchOutcome::AlreadyMatched);
        }

        let (Some(title), Some(year)) = (publication.title.as_deref(), publication.year) else {
            return Ok(MatchOutcome::MissingField);
        };

        let candidates = match self.candidates(title, year).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(publication_id = %publication.id, source, "Citation lookup failed: {}", e);
                return Ok(MatchOutcome::ProviderFailed);
            }
        };

        let total = candidates.len();
        let accepted: Vec<Value> = candidates
            .into_iter()
            .filter(|candidate| {
                let keep = candidate.accepted(self.min_title_similarity);
                if !keep {
                    debug!(
                        publication_id = %publication.id,
                        verdict = ?candidate.verdict,
                        similarity = ?candidate.title_similarity,
                        "Rejected citation candidate"
                    );
                }
                keep
            })
            .map(|candidate| candidate.record)
            .collect();

        publications::set_citation_matches(&self.pool, &publication.id, source, &accepted).await?;

        Ok(MatchOutcome::Stored {
            accepted: accepted.len(),
            rejected: total - accepted.len(),
        })
    }

    /// Match every publication that has a title and a year
    pub async fn run_pass(&self) -> Result<MatchReport> {
        let mut report = MatchReport::default();
        let mut after: Option<String> = None;

        loop {
            let page = publications::scan_page(
                &self.pool,
                PublicationFilter::WithTitleAndYear,
                after.as_deref(),
                PAGE_SIZE,
            )
            .await?;

            let Some(last_id) = page.last_id else {
                break;
            };
            after = Some(last_id);
            report.undecodable += page.skipped.len();

            for publication in &page.records {
                report.publications_scanned += 1;
                match self.match_publication(publication).await {
                    Ok(MatchOutcome::Stored { accepted, .. }) => {
                        report.stored += 1;
                        if accepted > 0 {
                            report.with_matches += 1;
                        }
                    }
                    Ok(MatchOutcome::AlreadyMatched) => report.already_matched += 1,
                    Ok(MatchOutcome::MissingField) => {}
                    Ok(MatchOutcome::ProviderFailed) => report.provider_failures += 1,
                    Err(e) => {
                        warn!(publication_id = %publication.id, "Storing citation matches failed: {}", e);
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            source = self.provider.source(),
            scanned = report.publications_scanned,
            stored = report.stored,
            with_matches = report.with_matches,
            already_matched = report.already_matched,
            provider_failures = report.provider_failures,
            undecodable = report.undecodable,
            "Citation matching pass complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(verdict: WindowVerdict, similarity: Option<f64>) -> MatchCandidate {
        MatchCandidate {
            source: "scopus".to_string(),
            record: json!({}),
            verdict,
            title_similarity: similarity,
        }
    }

    #[test]
    fn test_acceptance_requires_window() {
        assert!(candidate(WindowVerdict::Match, None).accepted(None));
        assert!(!candidate(WindowVerdict::OutOfWindow(2010), Some(1.0)).accepted(None));
        assert!(!candidate(WindowVerdict::NoDateFields, Some(1.0)).accepted(None));
    }

    #[test]
    fn test_similarity_floor() {
        assert!(candidate(WindowVerdict::Match, Some(0.95)).accepted(Some(0.9)));
        assert!(!candidate(WindowVerdict::Match, Some(0.5)).accepted(Some(0.9)));
        // No title on the record fails any floor
        assert!(!candidate(WindowVerdict::Match, None).accepted(Some(0.1)));
    }
}
