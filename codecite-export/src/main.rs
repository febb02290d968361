//! codecite-export - write analysis tables from the document store
//!
//! One row per (publication, owned repository), or one null-filled row for a publication
//! owning none. CSV output streams; JSON output is written as one array.

use anyhow::{bail, Context, Result};
use clap::Parser;
use codecite_common::config::{ConfigResolver, EligibilityMode};
use codecite_common::db::init_database_pool;
use codecite_export::{write_csv, write_json, ExportFormat, Exporter};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "codecite-export")]
#[command(about = "Export publication/repository analysis tables")]
#[command(version)]
struct Args {
    /// Config file (overrides CODECITE_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite document store (overrides database_path from config)
    #[arg(short, long, env = "CODECITE_DATABASE")]
    database: Option<PathBuf>,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// csv or json; inferred from the output extension when omitted
    #[arg(short, long)]
    format: Option<ExportFormat>,

    /// Publication columns, comma separated (overrides config)
    #[arg(long, value_delimiter = ',')]
    columns: Option<Vec<String>>,

    /// Feature groups, comma separated (overrides config)
    #[arg(long, value_delimiter = ',')]
    groups: Option<Vec<String>>,

    /// Export every publication, not only those with a citation match
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_source) = ConfigResolver::new(args.config.as_deref())
        .resolve()
        .context("Loading configuration failed")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Starting codecite-export v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(source) = &config_source {
        info!("Config file: {}", source.display());
    }

    let format = match args.format.or_else(|| ExportFormat::from_path(&args.output)) {
        Some(format) => format,
        None => bail!(
            "Cannot infer export format from {}; pass --format",
            args.output.display()
        ),
    };

    if let Some(columns) = args.columns {
        config.export.publication_columns = columns;
    }
    if let Some(groups) = args.groups {
        config.export.feature_groups = groups;
    }
    if args.all {
        config.export.eligibility = EligibilityMode::All;
    }

    let db_path = args.database.clone().unwrap_or_else(|| config.database_path());
    info!("Database path: {}", db_path.display());
    let pool = init_database_pool(&db_path).await?;

    let exporter = Exporter::from_config(pool, &config.export, config.linking.reference_ceiling)?;
    info!(columns = exporter.schema().columns().len(), "Export schema built");

    let file = File::create(&args.output)
        .with_context(|| format!("Creating {} failed", args.output.display()))?;
    let writer = BufWriter::new(file);

    let written = match format {
        ExportFormat::Csv => write_csv(exporter.schema(), exporter.rows(), writer).await?,
        ExportFormat::Json => write_json(exporter.schema(), exporter.rows(), writer).await?,
    };

    info!(rows = written, output = %args.output.display(), "Export complete");
    Ok(())
}
