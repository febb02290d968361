//! Export schema and repository feature groups
//!
//! A feature group expands to a fixed, ordered list of leaf columns, so the schema of an
//! export is known before the first row is produced. Groups that need a pivot (series,
//! before/after splits) emit nulls for publications without a publication date.

use crate::activity::{self, ActivityBucket, BucketWidth, ValueSelector};
use crate::error::{ExportError, Result};
use chrono::{DateTime, Utc};
use codecite_common::config::{ExportConfig, SeriesWidths};
use codecite_common::{ActivityEvent, PublicationRecord, RepositorySnapshot};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

const COMMIT_STATS: &[&str] = &[
    "activity_range_days",
    "commit_rate",
    "commits_before_publication",
    "commits_after_publication",
    "commits_weekly",
];
const CONTRIBUTOR_STATS: &[&str] = &["contributors_count", "contributors_variance"];
const LANGUAGE_STATS: &[&str] = &["languages_count", "languages", "top_language", "language_variance"];
const DETAILED_COMMITS: &[&str] = &[
    "commits_day",
    "commits_week",
    "commits_month",
    "commit_size_day",
    "commit_size_week",
    "commit_size_month",
];
const DETAILED_STARS: &[&str] = &["stars_day", "stars_week", "stars_month"];
const CUMULATIVE_STARS: &[&str] = &[
    "stars_cumulative_day",
    "stars_cumulative_week",
    "stars_cumulative_month",
];

/// Column holding the extracted citation count; always follows the publication columns
pub const CITATIONS_COLUMN: &str = "citations";

/// Headline repository field exported as a single column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryField {
    Key,
    Stars,
    Forks,
    Subscribers,
    Size,
    OpenIssues,
    ClosedIssues,
}

impl RepositoryField {
    pub fn column(&self) -> &'static str {
        match self {
            RepositoryField::Key => "key",
            RepositoryField::Stars => "stars",
            RepositoryField::Forks => "forks",
            RepositoryField::Subscribers => "subscribers",
            RepositoryField::Size => "size",
            RepositoryField::OpenIssues => "open_issues",
            RepositoryField::ClosedIssues => "closed_issues",
        }
    }

    fn value(&self, repo: &RepositorySnapshot) -> Value {
        let stat = match self {
            RepositoryField::Key => return Value::String(repo.key.as_key()),
            RepositoryField::Stars => repo.stats.stars,
            RepositoryField::Forks => repo.stats.forks,
            RepositoryField::Subscribers => repo.stats.subscribers,
            RepositoryField::Size => repo.stats.size,
            RepositoryField::OpenIssues => repo.stats.open_issues,
            RepositoryField::ClosedIssues => repo.stats.closed_issues,
        };
        stat.map(Value::from).unwrap_or(Value::Null)
    }
}

/// Named bundle of repository columns requested for an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGroup {
    CommitStats,
    ContributorStats,
    LanguageStats,
    DetailedCommits,
    DetailedStars,
    CumulativeStars,
    Literal(RepositoryField),
}

impl FromStr for FeatureGroup {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        let group = match s.trim().replace('_', "-").as_str() {
            "commit-stats" => FeatureGroup::CommitStats,
            "contributor-stats" => FeatureGroup::ContributorStats,
            "language-stats" => FeatureGroup::LanguageStats,
            "detailed-commits" => FeatureGroup::DetailedCommits,
            "detailed-stars" => FeatureGroup::DetailedStars,
            "cumulative-stars" => FeatureGroup::CumulativeStars,
            "key" => FeatureGroup::Literal(RepositoryField::Key),
            "stars" => FeatureGroup::Literal(RepositoryField::Stars),
            "forks" => FeatureGroup::Literal(RepositoryField::Forks),
            "subscribers" => FeatureGroup::Literal(RepositoryField::Subscribers),
            "size" => FeatureGroup::Literal(RepositoryField::Size),
            "open-issues" => FeatureGroup::Literal(RepositoryField::OpenIssues),
            "closed-issues" => FeatureGroup::Literal(RepositoryField::ClosedIssues),
            _ => return Err(ExportError::UnknownFeatureGroup(s.to_string())),
        };
        Ok(group)
    }
}

impl fmt::Display for FeatureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureGroup::CommitStats => "commit-stats",
            FeatureGroup::ContributorStats => "contributor-stats",
            FeatureGroup::LanguageStats => "language-stats",
            FeatureGroup::DetailedCommits => "detailed-commits",
            FeatureGroup::DetailedStars => "detailed-stars",
            FeatureGroup::CumulativeStars => "cumulative-stars",
            FeatureGroup::Literal(field) => return f.write_str(&field.column().replace('_', "-")),
        };
        f.write_str(name)
    }
}

/// Validated day/week/month widths behind the series columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWidths {
    pub day: BucketWidth,
    pub week: BucketWidth,
    pub month: BucketWidth,
}

impl BucketWidths {
    pub fn from_config(widths: &SeriesWidths) -> Result<Self> {
        Ok(Self {
            day: BucketWidth::new(widths.day)?,
            week: BucketWidth::new(widths.week)?,
            month: BucketWidth::new(widths.month)?,
        })
    }

    fn all(&self) -> [BucketWidth; 3] {
        [self.day, self.week, self.month]
    }
}

impl Default for BucketWidths {
    fn default() -> Self {
        Self::from_config(&SeriesWidths::default()).unwrap_or(Self {
            day: BucketWidth::DAY,
            week: BucketWidth::DAY,
            month: BucketWidth::DAY,
        })
    }
}

impl FeatureGroup {
    /// Leaf columns in output order
    pub fn columns(&self) -> Vec<&'static str> {
        match self {
            FeatureGroup::CommitStats => COMMIT_STATS.to_vec(),
            FeatureGroup::ContributorStats => CONTRIBUTOR_STATS.to_vec(),
            FeatureGroup::LanguageStats => LANGUAGE_STATS.to_vec(),
            FeatureGroup::DetailedCommits => DETAILED_COMMITS.to_vec(),
            FeatureGroup::DetailedStars => DETAILED_STARS.to_vec(),
            FeatureGroup::CumulativeStars => CUMULATIVE_STARS.to_vec(),
            FeatureGroup::Literal(field) => vec![field.column()],
        }
    }

    /// Values for `columns()`, in the same order
    pub fn fill(
        &self,
        repo: &RepositorySnapshot,
        pivot: Option<DateTime<Utc>>,
        widths: &BucketWidths,
    ) -> Vec<Value> {
        match self {
            FeatureGroup::CommitStats => {
                let summary = activity::summarize(repo.commit_log.as_ref(), pivot);
                vec![
                    summary.active_span_days.map(Value::from).unwrap_or(Value::Null),
                    number(summary.mean_activity),
                    number(summary.before_pivot),
                    number(summary.after_pivot),
                    summary.weekly.map(|s| series_value(&s)).unwrap_or(Value::Null),
                ]
            }
            FeatureGroup::ContributorStats => {
                let (count, variance) = contributor_stats(repo);
                vec![count.map(Value::from).unwrap_or(Value::Null), number(variance)]
            }
            FeatureGroup::LanguageStats => {
                let stats = language_stats(&repo.languages);
                vec![
                    Value::from(stats.count),
                    Value::String(stats.names),
                    stats.top.map(Value::String).unwrap_or(Value::Null),
                    number(stats.variance),
                ]
            }
            FeatureGroup::DetailedCommits => {
                let mut values = series_columns(&repo.detailed_commits, pivot, widths, ValueSelector::Count, false);
                values.extend(series_columns(&repo.detailed_commits, pivot, widths, ValueSelector::Size, false));
                values
            }
            FeatureGroup::DetailedStars => {
                series_columns(&repo.star_events, pivot, widths, ValueSelector::Count, false)
            }
            FeatureGroup::CumulativeStars => {
                series_columns(&repo.star_events, pivot, widths, ValueSelector::Count, true)
            }
            FeatureGroup::Literal(field) => vec![field.value(repo)],
        }
    }
}

fn series_columns(
    events: &[ActivityEvent],
    pivot: Option<DateTime<Utc>>,
    widths: &BucketWidths,
    selector: ValueSelector,
    cumulative: bool,
) -> Vec<Value> {
    let Some(pivot) = pivot else {
        return vec![Value::Null; 3];
    };

    widths
        .all()
        .into_iter()
        .map(|width| {
            let out = activity::aggregate(events, width, pivot, selector, cumulative);
            let series = if cumulative {
                out.cumulative.unwrap_or_default()
            } else {
                out.series
            };
            series_value(&series)
        })
        .collect()
}

/// JSON array of `[index, value]` pairs
fn series_value(series: &[ActivityBucket]) -> Value {
    serde_json::to_value(series).unwrap_or(Value::Null)
}

/// Integral values become JSON integers
fn number(value: Option<f64>) -> Value {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => json!(v as i64),
        Some(v) => serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn population_variance(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n)
}

/// Number of contributors reporting a contribution count and the population variance of
/// those counts. `(None, None)` when nobody reports a count.
pub fn contributor_stats(repo: &RepositorySnapshot) -> (Option<usize>, Option<f64>) {
    let counts: Vec<f64> = repo
        .contributors
        .iter()
        .filter_map(|c| c.contributions)
        .map(|c| c as f64)
        .collect();

    if counts.is_empty() {
        return (None, None);
    }
    (Some(counts.len()), population_variance(&counts))
}

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageStats {
    pub count: usize,
    /// Language names joined with `,` in name order
    pub names: String,
    /// Language with strictly the most bytes; ties go to the first name
    pub top: Option<String>,
    /// Population variance of the byte counts
    pub variance: Option<f64>,
}

pub fn language_stats(languages: &BTreeMap<String, u64>) -> LanguageStats {
    let mut top: Option<(&String, u64)> = None;
    for (name, bytes) in languages {
        if *bytes > 0 && top.map_or(true, |(_, best)| *bytes > best) {
            top = Some((name, *bytes));
        }
    }

    let values: Vec<f64> = languages.values().map(|b| *b as f64).collect();
    LanguageStats {
        count: languages.len(),
        names: languages.keys().map(String::as_str).collect::<Vec<_>>().join(","),
        top: top.map(|(name, _)| name.clone()),
        variance: population_variance(&values),
    }
}

/// A publication field emitted into the base row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PublicationColumn {
    Id,
    Title,
    Year,
    VenueKey,
    PublicationDate,
    /// Author names joined with `/`
    Authors,
    AuthorCount,
    /// Literal attribute copied verbatim (null when absent)
    Attribute(String),
}

impl PublicationColumn {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "id" => PublicationColumn::Id,
            "title" => PublicationColumn::Title,
            "year" => PublicationColumn::Year,
            "venue_key" => PublicationColumn::VenueKey,
            "publication_date" => PublicationColumn::PublicationDate,
            "authors" => PublicationColumn::Authors,
            "author_count" => PublicationColumn::AuthorCount,
            other => PublicationColumn::Attribute(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PublicationColumn::Id => "id",
            PublicationColumn::Title => "title",
            PublicationColumn::Year => "year",
            PublicationColumn::VenueKey => "venue_key",
            PublicationColumn::PublicationDate => "publication_date",
            PublicationColumn::Authors => "authors",
            PublicationColumn::AuthorCount => "author_count",
            PublicationColumn::Attribute(name) => name,
        }
    }

    pub fn value(&self, publication: &PublicationRecord) -> Value {
        match self {
            PublicationColumn::Id => Value::String(publication.id.clone()),
            PublicationColumn::Title => publication.title.clone().map(Value::String).unwrap_or(Value::Null),
            PublicationColumn::Year => publication.year.map(Value::from).unwrap_or(Value::Null),
            PublicationColumn::VenueKey => {
                publication.venue_key.clone().map(Value::String).unwrap_or(Value::Null)
            }
            PublicationColumn::PublicationDate => publication
                .publication_date
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
            PublicationColumn::Authors => Value::String(publication.authors.join("/")),
            PublicationColumn::AuthorCount => Value::from(publication.authors.len()),
            PublicationColumn::Attribute(name) => {
                publication.attributes.get(name).cloned().unwrap_or(Value::Null)
            }
        }
    }
}

/// Ordered export columns, computed once per export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSchema {
    publication_columns: Vec<PublicationColumn>,
    feature_groups: Vec<FeatureGroup>,
    columns: Vec<String>,
}

impl ExportSchema {
    /// Build the schema from requested column and group names.
    ///
    /// Unknown groups, repeated groups and colliding column names are rejected.
    pub fn build<S: AsRef<str>>(publication_columns: &[S], feature_groups: &[S]) -> Result<Self> {
        let publication_columns: Vec<PublicationColumn> = publication_columns
            .iter()
            .map(|name| PublicationColumn::parse(name.as_ref()))
            .collect();
        let feature_groups = feature_groups
            .iter()
            .map(|name| name.as_ref().parse::<FeatureGroup>())
            .collect::<Result<Vec<_>>>()?;

        let mut seen_groups = HashSet::new();
        for group in &feature_groups {
            if !seen_groups.insert(*group) {
                return Err(ExportError::InvalidSchema(format!("feature group {} requested twice", group)));
            }
        }

        let mut columns: Vec<String> = publication_columns.iter().map(|c| c.name().to_string()).collect();
        columns.push(CITATIONS_COLUMN.to_string());
        for group in &feature_groups {
            columns.extend(group.columns().into_iter().map(str::to_string));
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if column.is_empty() {
                return Err(ExportError::InvalidSchema("empty column name".to_string()));
            }
            if !seen.insert(column.as_str()) {
                return Err(ExportError::InvalidSchema(format!("duplicate column {}", column)));
            }
        }

        Ok(Self {
            publication_columns,
            feature_groups,
            columns,
        })
    }

    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        Self::build(&config.publication_columns, &config.feature_groups)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn publication_columns(&self) -> &[PublicationColumn] {
        &self.publication_columns
    }

    pub fn feature_groups(&self) -> &[FeatureGroup] {
        &self.feature_groups
    }

    /// Number of leading columns filled from the publication (citations included)
    pub fn base_width(&self) -> usize {
        self.publication_columns.len() + 1
    }

    pub fn repository_width(&self) -> usize {
        self.columns.len() - self.base_width()
    }
}
