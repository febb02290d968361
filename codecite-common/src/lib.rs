//! # codecite common library
//!
//! Shared code for the codecite pipeline binaries:
//! - Publication and repository document models
//! - SQLite-backed document store (publications, repositories, references)
//! - Configuration loading
//! - Date helpers used by the matching and aggregation stages

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    ActivityEvent, ActivityLog, Contributor, OwnerRef, Platform, PublicationRecord,
    RepositoryId, RepositoryKey, RepositoryRecord, RepositoryRef, RepositorySnapshot,
    RepositoryStats, WeeklyActivity,
};
