//! SQLite document store
//!
//! Three tables back the pipeline:
//! - `publications`: bibliographic documents with JSON-encoded nested fields
//! - `repositories`: one row per (platform, owner, name) identity triple
//! - `repository_references`: (repository, publication) link rows behind ownership

pub mod init;
pub mod publications;
pub mod repositories;

pub use init::{init_database_pool, init_memory_pool, init_tables};

/// Rows fetched per page by scanning passes
pub const PAGE_SIZE: i64 = 100;
