//! Publication and repository document models
//!
//! Publications are keyed by their bibliography id (e.g. a DBLP key), repositories by a
//! generated UUID plus the unique (platform, owner, name) identity triple.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Store-assigned repository identity
pub type RepositoryId = Uuid;

/// Code-hosting platform a repository lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Github,
    Gitlab,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Github => "github",
            Platform::Gitlab => "gitlab",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "github" => Some(Platform::Github),
            "gitlab" => Some(Platform::Gitlab),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository identity key: (platform, owner, name)
///
/// Owner and name are lowercased so that differently-cased links to the same
/// repository resolve to one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryKey {
    pub platform: Platform,
    pub owner: String,
    pub name: String,
}

/// Characters PDF extraction tends to leave glued to the end of a link
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', ')', ']', '}', '>', '"', '\''];

impl RepositoryKey {
    pub fn new(platform: Platform, owner: &str, name: &str) -> Self {
        Self {
            platform,
            owner: owner.to_ascii_lowercase(),
            name: name.to_ascii_lowercase(),
        }
    }

    /// Parse a source-code link such as `https://github.com/owner/name/tree/main`.
    ///
    /// Scheme and `www.` are optional; any two-to-six letter TLD is accepted. Returns
    /// `None` for links to other hosts or links without both owner and name segments.
    pub fn from_url(url: &str) -> Option<Self> {
        let mut rest = url.trim();
        for scheme in ["https://", "http://"] {
            if let Some(stripped) = rest.strip_prefix(scheme) {
                rest = stripped;
                break;
            }
        }
        rest = rest.strip_prefix("www.").unwrap_or(rest);

        let (host, path) = rest.split_once('/')?;
        let (site, tld) = host.split_once('.')?;
        if !(2..=6).contains(&tld.len()) || !tld.chars().all(|c| c.is_ascii_lowercase()) {
            return None;
        }
        let platform = Platform::parse(site)?;

        let path = path.split(['?', '#']).next().unwrap_or_default();
        let mut segments = path.split('/').filter(|segment| !segment.is_empty());
        let owner = segments.next()?;
        let name = segments.next()?.trim_end_matches(TRAILING_PUNCTUATION);
        let name = name.strip_suffix(".git").unwrap_or(name);

        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(platform, owner, name))
    }

    /// Parse the canonical `platform/owner/name` form produced by [`RepositoryKey::as_key`]
    pub fn parse_key(key: &str) -> Option<Self> {
        let mut parts = key.splitn(3, '/');
        let platform = Platform::parse(parts.next()?)?;
        let owner = parts.next().filter(|s| !s.is_empty())?;
        let name = parts.next().filter(|s| !s.is_empty() && !s.contains('/'))?;
        Some(Self::new(platform, owner, name))
    }

    /// Canonical `platform/owner/name` string
    pub fn as_key(&self) -> String {
        format!("{}/{}/{}", self.platform, self.owner, self.name)
    }

    /// `owner/name` slug as used by platform APIs
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.platform, self.owner, self.name)
    }
}

/// A repository reference held by a publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RepositoryRef {
    /// Link resolved to a stored repository
    Resolved { id: RepositoryId, key: String },
    /// Link that could not be resolved (unknown host, fetch failure)
    Unresolved { link: String },
}

impl RepositoryRef {
    pub fn repository_id(&self) -> Option<RepositoryId> {
        match self {
            RepositoryRef::Resolved { id, .. } => Some(*id),
            RepositoryRef::Unresolved { .. } => None,
        }
    }
}

/// Bibliographic record plus the fields the linking passes maintain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub id: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub venue_key: Option<String>,
    /// Assigned after ingestion (typically the first day of the venue)
    pub publication_date: Option<NaiveDate>,
    /// Raw source-code links extracted at ingestion
    #[serde(default)]
    pub source_links: Vec<String>,
    #[serde(default)]
    pub repository_refs: Vec<RepositoryRef>,
    /// Accepted provider records keyed by citation source name
    #[serde(default)]
    pub citation_matches: BTreeMap<String, Vec<Value>>,
    /// Literal attributes carried through to exports verbatim (e.g. `h5_index`)
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl PublicationRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, year: i32) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
            year: Some(year),
            authors: Vec::new(),
            venue_key: None,
            publication_date: None,
            source_links: Vec::new(),
            repository_refs: Vec::new(),
            citation_matches: BTreeMap::new(),
            attributes: Map::new(),
        }
    }

    pub fn has_citation_match(&self, source: &str) -> bool {
        self.citation_matches
            .get(source)
            .is_some_and(|matches| !matches.is_empty())
    }
}

/// Headline repository counters as reported by the platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub stars: Option<i64>,
    pub forks: Option<i64>,
    pub subscribers: Option<i64>,
    pub size: Option<i64>,
    pub open_issues: Option<i64>,
    pub closed_issues: Option<i64>,
}

/// Repository contributor with their commit/contribution total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub login: String,
    #[serde(alias = "commits")]
    pub contributions: Option<i64>,
}

/// One week of coarse platform statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyActivity {
    pub week: DateTime<Utc>,
    pub additions: i64,
    pub deletions: i64,
}

impl WeeklyActivity {
    /// Net change for the week (additions minus deletions)
    pub fn net(&self) -> i64 {
        self.additions - self.deletions
    }
}

/// A single timestamped event (commit or star) with optional size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub size: Option<i64>,
}

impl ActivityEvent {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at, size: None }
    }

    pub fn with_size(at: DateTime<Utc>, size: i64) -> Self {
        Self {
            at,
            size: Some(size),
        }
    }
}

/// Commit log shape, declared when the snapshot is fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum ActivityLog {
    /// Weekly additions/deletions (GitHub code-frequency style)
    Weekly(Vec<WeeklyActivity>),
    /// Per-commit entries with exact timestamps (GitLab style)
    Events(Vec<ActivityEvent>),
}

impl ActivityLog {
    pub fn len(&self) -> usize {
        match self {
            ActivityLog::Weekly(entries) => entries.len(),
            ActivityLog::Events(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw repository data as returned by a repository provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub key: RepositoryKey,
    #[serde(default)]
    pub stats: RepositoryStats,
    /// Bytes of code per language
    #[serde(default)]
    pub languages: BTreeMap<String, u64>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    /// `None` when the platform returned nothing usable
    #[serde(default)]
    pub commit_log: Option<ActivityLog>,
    #[serde(default)]
    pub detailed_commits: Vec<ActivityEvent>,
    #[serde(default)]
    pub star_events: Vec<ActivityEvent>,
}

impl RepositorySnapshot {
    pub fn new(key: RepositoryKey) -> Self {
        Self {
            key,
            stats: RepositoryStats::default(),
            languages: BTreeMap::new(),
            contributors: Vec::new(),
            commit_log: None,
            detailed_commits: Vec::new(),
            star_events: Vec::new(),
        }
    }
}

/// (publication id, publication date) pair held by a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub publication_id: String,
    pub publication_date: NaiveDate,
}

/// Stored repository document
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryRecord {
    pub id: RepositoryId,
    pub snapshot: RepositorySnapshot,
    pub reference_count: i64,
    pub earliest_owner: Option<OwnerRef>,
    /// Referencing publications in link order
    pub referencing_publications: Vec<OwnerRef>,
}

impl RepositoryRecord {
    pub fn key(&self) -> &RepositoryKey {
        &self.snapshot.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_github_url_variants() {
        let expected = RepositoryKey::new(Platform::Github, "facebookresearch", "detectron");

        for url in [
            "https://github.com/facebookresearch/Detectron",
            "http://www.github.com/facebookresearch/detectron/",
            "github.com/facebookresearch/detectron/tree/master/configs",
            "https://github.com/facebookresearch/detectron.git",
            "https://github.com/facebookresearch/detectron).",
            "https://github.com/facebookresearch/detectron#readme",
        ] {
            assert_eq!(RepositoryKey::from_url(url), Some(expected.clone()), "url: {url}");
        }
    }

    #[test]
    fn test_key_from_gitlab_url() {
        let key = RepositoryKey::from_url("https://gitlab.com/inkscape/inkscape").unwrap();
        assert_eq!(key.platform, Platform::Gitlab);
        assert_eq!(key.as_key(), "gitlab/inkscape/inkscape");
    }

    #[test]
    fn test_key_from_url_rejects_other_links() {
        assert_eq!(RepositoryKey::from_url("https://bitbucket.org/a/b"), None);
        assert_eq!(RepositoryKey::from_url("https://github.com/onlyowner"), None);
        assert_eq!(RepositoryKey::from_url("https://github.com/"), None);
        assert_eq!(RepositoryKey::from_url("https://sourceforge.net/projects/x"), None);
        assert_eq!(RepositoryKey::from_url("not a link"), None);
    }

    #[test]
    fn test_parse_key_accepts_canonical_form_only() {
        let key = RepositoryKey::parse_key("github/Owner/Repo").unwrap();
        assert_eq!(key.slug(), "owner/repo");
        assert_eq!(RepositoryKey::parse_key("github/owner"), None);
        assert_eq!(RepositoryKey::parse_key("svn/owner/repo"), None);
        assert_eq!(RepositoryKey::parse_key("github/owner/repo/extra"), None);
    }

    #[test]
    fn test_activity_log_is_tagged() {
        let log = ActivityLog::Events(vec![ActivityEvent::with_size(
            "2019-01-01T00:00:00Z".parse().unwrap(),
            12,
        )]);
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["kind"], "events");
        assert_eq!(json["entries"][0]["size"], 12);

        let back: ActivityLog = serde_json::from_value(json).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_contributor_accepts_gitlab_commits_field() {
        let contributor: Contributor =
            serde_json::from_str(r#"{"login": "alice", "commits": 0}"#).unwrap();
        assert_eq!(contributor.contributions, Some(0));
    }

    #[test]
    fn test_has_citation_match_requires_non_empty_list() {
        let mut publication = PublicationRecord::new("conf/nips/X19", "Paper", 2019);
        assert!(!publication.has_citation_match("scholar"));

        publication.citation_matches.insert("scholar".to_string(), vec![]);
        assert!(!publication.has_citation_match("scholar"));

        publication
            .citation_matches
            .insert("scholar".to_string(), vec![serde_json::json!({"title": "Paper"})]);
        assert!(publication.has_citation_match("scholar"));
    }
}
