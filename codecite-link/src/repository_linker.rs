//! Repository linking pass
//!
//! Turns each publication's raw source-code links into repository references: known
//! repositories resolve directly, unknown ones are fetched through the platform's
//! provider and registered. Links that cannot be resolved are kept as raw links.

use crate::identity_resolver::{IdentityResolver, Resolution};
use crate::providers::{RepositoryProvider, Throttle};
use codecite_common::db::publications::{self, PublicationFilter};
use codecite_common::db::PAGE_SIZE;
use codecite_common::{Platform, PublicationRecord, RepositoryKey, RepositoryRef, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkingReport {
    pub publications_scanned: usize,
    pub publications_updated: usize,
    pub resolved: usize,
    /// Resolved by fetching and registering a new snapshot
    pub fetched: usize,
    pub unresolved: usize,
    /// Stored publications whose document columns could not be decoded
    pub undecodable: usize,
    pub failed: usize,
}

/// Where a reference came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    /// Already stored
    Stored,
    /// Fetched through a provider and registered
    Fetched,
    Unresolved,
}

/// One resolved (or unresolvable) source link
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedReference {
    pub reference: RepositoryRef,
    pub source: LinkSource,
}

struct PlatformProvider {
    provider: Arc<dyn RepositoryProvider>,
    throttle: Throttle,
}

pub struct RepositoryLinker {
    pool: SqlitePool,
    resolver: IdentityResolver,
    providers: Vec<PlatformProvider>,
    relink: bool,
}

impl RepositoryLinker {
    pub fn new(pool: SqlitePool, resolver: IdentityResolver) -> Self {
        Self {
            pool,
            resolver,
            providers: Vec::new(),
            relink: false,
        }
    }

    /// Register the provider used to fetch repositories of its platform
    pub fn with_provider(mut self, provider: Arc<dyn RepositoryProvider>, throttle: Throttle) -> Self {
        self.providers.push(PlatformProvider { provider, throttle });
        self
    }

    /// Also re-link publications that already carry references
    pub fn relink_existing(mut self, relink: bool) -> Self {
        self.relink = relink;
        self
    }

    fn provider_for(&self, platform: Platform) -> Option<&PlatformProvider> {
        self.providers
            .iter()
            .find(|p| p.provider.platform() == platform)
    }

    /// Resolve one raw link into a repository reference
    pub async fn resolve_link(&self, link: &str) -> Result<LinkedReference> {
        let unresolved = || LinkedReference {
            reference: RepositoryRef::Unresolved {
                link: link.to_string(),
            },
            source: LinkSource::Unresolved,
        };

        let Some(key) = RepositoryKey::from_url(link) else {
            debug!(link, "Not a repository link");
            return Ok(unresolved());
        };

        if let Resolution::Known(id) = self.resolver.resolve_key(&key).await? {
            return Ok(LinkedReference {
                reference: RepositoryRef::Resolved {
                    id,
                    key: key.as_key(),
                },
                source: LinkSource::Stored,
            });
        }

        // Stored but over the reference ceiling: treat as not found, do not refetch
        if self.resolver.is_stored(&key).await? {
            debug!(key = %key, "Repository over reference ceiling");
            return Ok(unresolved());
        }

        let Some(platform) = self.provider_for(key.platform) else {
            debug!(key = %key, "No provider for platform");
            return Ok(unresolved());
        };

        let snapshot = match platform
            .throttle
            .call(|| platform.provider.fetch(&key))
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(key = %key, "Repository fetch failed: {}", e);
                return Ok(unresolved());
            }
        };

        let id = self.resolver.register(&snapshot).await?;
        Ok(LinkedReference {
            reference: RepositoryRef::Resolved {
                id,
                key: key.as_key(),
            },
            source: LinkSource::Fetched,
        })
    }

    /// Resolve every source link of a publication and store the reference list.
    ///
    /// References are stored in link order, one per source link.
    pub async fn link_publication(&self, publication: &PublicationRecord) -> Result<Vec<LinkedReference>> {
        let mut linked = Vec::with_capacity(publication.source_links.len());
        for link in &publication.source_links {
            linked.push(self.resolve_link(link).await?);
        }

        let refs: Vec<RepositoryRef> = linked.iter().map(|l| l.reference.clone()).collect();
        publications::set_repository_refs(&self.pool, &publication.id, &refs).await?;
        Ok(linked)
    }

    /// Link every publication with source links (skipping already-linked ones unless
    /// re-linking is enabled)
    pub async fn run_pass(&self) -> Result<LinkingReport> {
        let mut report = LinkingReport::default();
        let mut after: Option<String> = None;

        loop {
            let page = publications::scan_page(
                &self.pool,
                PublicationFilter::WithSourceLinks,
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
                if !self.relink && !publication.repository_refs.is_empty() {
                    continue;
                }

                match self.link_publication(publication).await {
                    Ok(linked) => {
                        report.publications_updated += 1;
                        for reference in &linked {
                            match reference.source {
                                LinkSource::Stored => report.resolved += 1,
                                LinkSource::Fetched => {
                                    report.resolved += 1;
                                    report.fetched += 1;
                                }
                                LinkSource::Unresolved => report.unresolved += 1,
                            }
                        }
                    }
                    Err(e) => {
                        warn!(publication_id = %publication.id, "Repository linking failed: {}", e);
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            scanned = report.publications_scanned,
            updated = report.publications_updated,
            resolved = report.resolved,
            fetched = report.fetched,
            unresolved = report.unresolved,
            undecodable = report.undecodable,
            failed = report.failed,
            "Repository linking pass complete"
        );

        Ok(report)
    }
}
