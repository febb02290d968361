//! codecite-export library - analysis table export
//!
//! Flattens publications and the repositories they own into rows with a fixed column
//! schema, aggregating repository activity logs into pivot-relative series.

pub mod activity;
pub mod error;
pub mod features;
pub mod flattener;
pub mod sink;

pub use activity::{aggregate, summarize, ActivityBucket, AggregatedSeries, BucketWidth, ValueSelector};
pub use error::{ExportError, Result};
pub use features::{BucketWidths, ExportSchema, FeatureGroup, PublicationColumn, RepositoryField};
pub use flattener::{Eligibility, ExportRow, Exporter};
pub use sink::{write_csv, write_json, ExportFormat};
