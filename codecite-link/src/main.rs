//! codecite-link - publication/repository linking passes
//!
//! Runs one pass per invocation against the document store:
//! repository linking, citation matching, ownership convergence or venue dating.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use codecite_common::config::{CodeciteConfig, ConfigResolver};
use codecite_common::db::{init_database_pool, publications};
use codecite_common::Platform;
use codecite_link::providers::{CitationDumpProvider, SnapshotDirProvider, Throttle};
use codecite_link::{CitationMatcher, IdentityResolver, OwnershipAssignor, RepositoryLinker};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "codecite-link")]
#[command(about = "Link publications to repositories and citation records")]
#[command(version)]
struct Args {
    /// Config file (overrides CODECITE_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite document store (overrides database_path from config)
    #[arg(short, long, env = "CODECITE_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve raw source-code links into repository references
    Repositories {
        /// Directory of crawled snapshots laid out as <platform>/<owner>/<name>.json
        #[arg(long)]
        snapshots: PathBuf,

        /// Re-link publications that already carry references
        #[arg(long)]
        relink: bool,
    },
    /// Match publications against a dump of citation provider records
    Citations {
        /// Source name the accepted records are stored under
        #[arg(long)]
        source: String,

        /// JSON array of raw provider records
        #[arg(long)]
        records: PathBuf,

        /// JSON pointers of the date fields on each record (repeatable)
        #[arg(long = "date-pointer")]
        date_pointers: Vec<String>,
    },
    /// Recompute repository ownership from publication references
    Owners,
    /// Set the publication date of every publication of a venue
    VenueDate {
        /// Venue key prefix, e.g. conf/nips/2019
        #[arg(long)]
        prefix: String,

        /// Date in YYYY-MM-DD form
        #[arg(long)]
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_source) = ConfigResolver::new(args.config.as_deref())
        .resolve()
        .context("Loading configuration failed")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Starting codecite-link v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(source) = &config_source {
        info!("Config file: {}", source.display());
    }

    let db_path = args.database.clone().unwrap_or_else(|| config.database_path());
    info!("Database path: {}", db_path.display());
    let pool = init_database_pool(&db_path).await?;

    match args.command {
        Command::Repositories { snapshots, relink } => {
            run_repositories(&config, pool, snapshots, relink).await?;
        }
        Command::Citations {
            source,
            records,
            date_pointers,
        } => {
            let mut provider = CitationDumpProvider::from_file(source, &records)?;
            if !date_pointers.is_empty() {
                provider = provider.with_date_pointers(date_pointers);
            }
            let matcher = CitationMatcher::new(pool, Arc::new(provider), Throttle::new(&config.providers)?)
                .with_min_title_similarity(config.linking.min_title_similarity);
            matcher.run_pass().await?;
        }
        Command::Owners => {
            OwnershipAssignor::new(pool).run_pass().await?;
        }
        Command::VenueDate { prefix, date } => {
            let updated = publications::assign_venue_date(&pool, &prefix, date).await?;
            info!(prefix = %prefix, %date, updated, "Assigned venue publication date");
        }
    }

    Ok(())
}

async fn run_repositories(
    config: &CodeciteConfig,
    pool: sqlx::SqlitePool,
    snapshots: PathBuf,
    relink: bool,
) -> Result<()> {
    let resolver = IdentityResolver::with_ceiling(pool.clone(), config.linking.reference_ceiling);

    // Each platform gets its own call budget
    let mut linker = RepositoryLinker::new(pool, resolver).relink_existing(relink);
    for platform in [Platform::Github, Platform::Gitlab] {
        linker = linker.with_provider(
            Arc::new(SnapshotDirProvider::new(&snapshots, platform)),
            Throttle::new(&config.providers)?,
        );
    }

    linker.run_pass().await?;
    Ok(())
}
