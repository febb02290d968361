//! Shared fixtures for linking tests

#![allow(dead_code)]

use async_trait::async_trait;
use codecite_common::db::init_memory_pool;
use codecite_common::db::publications::save_publication;
use codecite_common::{
    Platform, PublicationRecord, RepositoryKey, RepositorySnapshot, RepositoryStats,
};
use codecite_link::providers::{
    CitationProvider, CitationRecord, ProviderError, RepositoryProvider, Throttle,
};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub async fn memory_pool() -> SqlitePool {
    init_memory_pool().await.unwrap()
}

/// Budget generous enough that tests never wait on it
pub fn fast_throttle() -> Throttle {
    Throttle::with_limits(1000, Duration::from_millis(10), 2, Duration::from_millis(1)).unwrap()
}

pub fn publication(id: &str, title: &str, year: i32, links: &[&str]) -> PublicationRecord {
    let mut publication = PublicationRecord::new(id, title, year);
    publication.source_links = links.iter().map(|l| l.to_string()).collect();
    publication
}

pub async fn save_all(pool: &SqlitePool, publications: &[PublicationRecord]) {
    for publication in publications {
        save_publication(pool, publication).await.unwrap();
    }
}

/// Store a row whose author column is not JSON, as a broken ingester would.
///
/// Links and references are valid so the row passes every scan filter.
pub async fn insert_undecodable(pool: &SqlitePool, id: &str) {
    sqlx::query(
        "INSERT INTO publications (id, title, year, authors, publication_date, source_links, repository_refs) \
         VALUES (?, 'Broken', 2019, 'not json', '2019-01-01', '[\"https://github.com/o/r\"]', \
         '[{\"state\":\"unresolved\",\"link\":\"https://github.com/o/r\"}]')",
    )
    .bind(id)
    .execute(pool)
    .await
    .unwrap();
}

/// Repository provider serving canned snapshots, failing transiently a set number of times
pub struct FakeRepositoryProvider {
    platform: Platform,
    snapshots: HashMap<RepositoryKey, RepositorySnapshot>,
    transient_failures: Mutex<usize>,
    pub fetches: AtomicUsize,
}

impl FakeRepositoryProvider {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            snapshots: HashMap::new(),
            transient_failures: Mutex::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_repository(mut self, owner: &str, name: &str, stars: i64) -> Self {
        let key = RepositoryKey::new(self.platform, owner, name);
        let mut snapshot = RepositorySnapshot::new(key.clone());
        snapshot.stats = RepositoryStats {
            stars: Some(stars),
            ..Default::default()
        };
        self.snapshots.insert(key, snapshot);
        self
    }

    pub fn failing_first(self, failures: usize) -> Self {
        *self.transient_failures.lock().unwrap() = failures;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryProvider for FakeRepositoryProvider {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, key: &RepositoryKey) -> Result<RepositorySnapshot, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProviderError::Transient("connection reset".to_string()));
            }
        }
        self.snapshots
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(key.as_key()))
    }
}

/// Citation provider answering every query with the same records
pub struct FakeCitationProvider {
    source: String,
    records: Vec<CitationRecord>,
    pub searches: AtomicUsize,
}

impl FakeCitationProvider {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            records: Vec::new(),
            searches: AtomicUsize::new(0),
        }
    }

    pub fn with_record(mut self, title: &str, date_fields: Vec<Value>, raw: Value) -> Self {
        self.records.push(CitationRecord {
            title: Some(title.to_string()),
            date_fields,
            raw,
        });
        self
    }
}

#[async_trait]
impl CitationProvider for FakeCitationProvider {
    fn source(&self) -> &str {
        &self.source
    }

    async fn search(&self, _title: &str, _year: i32) -> Result<Vec<CitationRecord>, ProviderError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}
