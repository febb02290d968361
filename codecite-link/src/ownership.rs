//! Ownership assignor
//!
//! Each repository records every publication that references it and the single
//! earliest-dated one, its owner. Linking runs in one transaction: the reference row is
//! inserted if absent, then the owner is recomputed from the reference table and written.
//! Ties on date keep the owner that was recorded first.

use codecite_common::db::publications::{self, PublicationFilter};
use codecite_common::db::repositories;
use codecite_common::db::PAGE_SIZE;
use codecite_common::{PublicationRecord, RepositoryId, Result};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// Outcome of a single `link` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// New reference recorded
    Linked { owner_changed: bool },
    /// Pair already recorded; nothing changed
    AlreadyLinked,
    /// No repository with that id; link dropped
    RepositoryMissing,
}

/// Counters reported by a convergence pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub publications_scanned: usize,
    pub linked: usize,
    pub already_linked: usize,
    pub owner_changes: usize,
    /// Links naming a repository id that does not exist
    pub dropped: usize,
    /// References that never resolved to a repository
    pub unresolved_skipped: usize,
    pub missing_date_skipped: usize,
    /// Stored publications whose document columns could not be decoded
    pub undecodable: usize,
    /// Links abandoned after a store error (write conflicts included)
    pub failed: usize,
}

pub struct OwnershipAssignor {
    pool: SqlitePool,
}

impl OwnershipAssignor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record that `publication_id` (dated `publication_date`) references the repository.
    ///
    /// Re-linking a recorded pair is a no-op, whatever date is passed.
    pub async fn link(
        &self,
        publication_id: &str,
        publication_date: NaiveDate,
        repository_id: RepositoryId,
    ) -> Result<LinkOutcome> {
        let mut tx = self.pool.begin().await?;

        if !repositories::touch_repository(&mut *tx, repository_id).await? {
            warn!(
                repository_id = %repository_id,
                publication_id,
                "Link names unknown repository, dropping"
            );
            return Ok(LinkOutcome::RepositoryMissing);
        }

        let inserted =
            repositories::insert_reference(&mut *tx, repository_id, publication_id, publication_date)
                .await?;
        if !inserted {
            tx.commit().await?;
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let update = repositories::recompute_owner(&mut *tx, repository_id).await?;
        tx.commit().await?;

        if update.changed() {
            debug!(
                repository_id = %repository_id,
                previous = ?update.previous.as_ref().map(|o| &o.publication_id),
                owner = ?update.current.as_ref().map(|o| &o.publication_id),
                "Repository owner reassigned"
            );
        }

        Ok(LinkOutcome::Linked {
            owner_changed: update.changed(),
        })
    }

    /// True iff `publication_id` is the repository's current earliest owner
    pub async fn is_owner(&self, repository_id: RepositoryId, publication_id: &str) -> Result<bool> {
        repositories::is_owner(&self.pool, repository_id, publication_id).await
    }

    /// Link every resolved reference of every dated publication.
    ///
    /// Store errors on a single link are logged and counted; only a failing scan aborts
    /// the pass.
    pub async fn run_pass(&self) -> Result<LinkReport> {
        let mut report = LinkReport::default();
        let mut after: Option<String> = None;

        loop {
            let page = publications::scan_page(
                &self.pool,
                PublicationFilter::WithRepositoryRefs,
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
                self.link_publication(publication, &mut report).await;
            }
        }

        info!(
            scanned = report.publications_scanned,
            linked = report.linked,
            already_linked = report.already_linked,
            owner_changes = report.owner_changes,
            dropped = report.dropped,
            missing_date = report.missing_date_skipped,
            undecodable = report.undecodable,
            failed = report.failed,
            "Ownership pass complete"
        );

        Ok(report)
    }

    async fn link_publication(&self, publication: &PublicationRecord, report: &mut LinkReport) {
        report.publications_scanned += 1;

        let Some(date) = publication.publication_date else {
            debug!(publication_id = %publication.id, "No publication date, skipping");
            report.missing_date_skipped += 1;
            return;
        };

        for reference in &publication.repository_refs {
            let Some(repository_id) = reference.repository_id() else {
                report.unresolved_skipped += 1;
                continue;
            };

            match self.link(&publication.id, date, repository_id).await {
                Ok(LinkOutcome::Linked { owner_changed }) => {
                    report.linked += 1;
                    if owner_changed {
                        report.owner_changes += 1;
                    }
                }
                Ok(LinkOutcome::AlreadyLinked) => report.already_linked += 1,
                Ok(LinkOutcome::RepositoryMissing) => report.dropped += 1,
                Err(e) => {
                    if e.is_write_conflict() {
                        warn!(publication_id = %publication.id, repository_id = %repository_id, "Write conflict, link dropped");
                    } else {
                        warn!(publication_id = %publication.id, repository_id = %repository_id, "Link failed: {}", e);
                    }
                    report.failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecite_common::db::init_memory_pool;
    use codecite_common::{Platform, RepositoryKey, RepositorySnapshot};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn setup() -> (SqlitePool, RepositoryId) {
        let pool = init_memory_pool().await.unwrap();
        let snapshot = RepositorySnapshot::new(RepositoryKey::new(Platform::Github, "o", "r"));
        let id = repositories::register_snapshot(&pool, &snapshot).await.unwrap();
        (pool, id)
    }

    #[tokio::test]
    async fn test_first_link_sets_owner() {
        let (pool, id) = setup().await;
        let assignor = OwnershipAssignor::new(pool);

        let outcome = assignor.link("p1", date(2019, 12, 8), id).await.unwrap();
        assert_eq!(outcome, LinkOutcome::Linked { owner_changed: true });
        assert!(assignor.is_owner(id, "p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_later_publication_does_not_take_ownership() {
        let (pool, id) = setup().await;
        let assignor = OwnershipAssignor::new(pool);

        assignor.link("early", date(2018, 6, 19), id).await.unwrap();
        let outcome = assignor.link("late", date(2019, 6, 9), id).await.unwrap();
        assert_eq!(outcome, LinkOutcome::Linked { owner_changed: false });
        assert!(assignor.is_owner(id, "early").await.unwrap());
        assert!(!assignor.is_owner(id, "late").await.unwrap());
    }

    #[tokio::test]
    async fn test_relink_is_noop() {
        let (pool, id) = setup().await;
        let assignor = OwnershipAssignor::new(pool.clone());

        assignor.link("p1", date(2019, 1, 1), id).await.unwrap();
        let outcome = assignor.link("p1", date(2019, 1, 1), id).await.unwrap();
        assert_eq!(outcome, LinkOutcome::AlreadyLinked);

        let record = repositories::load_repository(&pool, id).await.unwrap().unwrap();
        assert_eq!(record.referencing_publications.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_repository_is_dropped() {
        let (pool, _) = setup().await;
        let assignor = OwnershipAssignor::new(pool);

        let outcome = assignor
            .link("p1", date(2019, 1, 1), Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(outcome, LinkOutcome::RepositoryMissing);
    }
}
