//! Configuration loading and resolution
//!
//! Resolution priority for the config file:
//! 1. Command-line argument (highest priority)
//! 2. `CODECITE_CONFIG` environment variable
//! 3. `<config dir>/codecite/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing file at the default location is not an error; an explicitly requested
//! file that is missing or malformed is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CODECITE_CONFIG";

/// Top-level configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeciteConfig {
    /// SQLite document store; defaults to the platform data directory
    pub database_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub linking: LinkingConfig,
    pub providers: ProviderConfig,
    pub export: ExportConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Linking-pass configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    /// Reference ceiling; `None` means unbounded
    pub reference_ceiling: Option<u64>,
    /// Minimum normalized title similarity (0.0-1.0) for citation candidates
    pub min_title_similarity: Option<f64>,
}

/// Per-provider call budget and retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub calls_per_window: u32,
    pub window_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            calls_per_window: 4,
            window_secs: 3,
            max_retries: 10,
            retry_backoff_ms: 6000,
        }
    }
}

/// Which publications the exporter emits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EligibilityMode {
    /// At least one match from the configured citation source
    #[default]
    CitationMatch,
    /// Every publication
    All,
}

/// Bucket widths (in days) behind the day/week/month series columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesWidths {
    pub day: u32,
    pub week: u32,
    pub month: u32,
}

impl Default for SeriesWidths {
    fn default() -> Self {
        Self {
            day: 1,
            week: 7,
            month: 30,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub publication_columns: Vec<String>,
    pub feature_groups: Vec<String>,
    pub eligibility: EligibilityMode,
    /// Citation source whose first match supplies the citation count
    pub citation_source: String,
    /// JSON pointer to the citation count inside a match record
    pub citation_pointer: String,
    pub series_widths: SeriesWidths,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            publication_columns: vec![
                "title".to_string(),
                "year".to_string(),
                "authors".to_string(),
                "author_count".to_string(),
                "publication_date".to_string(),
            ],
            feature_groups: vec![
                "key".to_string(),
                "stars".to_string(),
                "forks".to_string(),
                "commit-stats".to_string(),
                "contributor-stats".to_string(),
                "language-stats".to_string(),
            ],
            eligibility: EligibilityMode::CitationMatch,
            citation_source: "scholar".to_string(),
            citation_pointer: "/inline_links/cited_by/total".to_string(),
            series_widths: SeriesWidths::default(),
        }
    }
}

impl CodeciteConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CodeciteConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let widths = self.export.series_widths;
        if widths.day == 0 || widths.week == 0 || widths.month == 0 {
            return Err(Error::Config(
                "export.series_widths values must be greater than zero".to_string(),
            ));
        }
        if self.providers.calls_per_window == 0 || self.providers.window_secs == 0 {
            return Err(Error::Config(
                "providers.calls_per_window and providers.window_secs must be greater than zero"
                    .to_string(),
            ));
        }
        if let Some(threshold) = self.linking.min_title_similarity {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(Error::Config(format!(
                    "linking.min_title_similarity out of range: {}",
                    threshold
                )));
            }
        }
        if !self.export.citation_pointer.is_empty() && !self.export.citation_pointer.starts_with('/')
        {
            return Err(Error::Config(format!(
                "export.citation_pointer must be a JSON pointer: {}",
                self.export.citation_pointer
            )));
        }
        Ok(())
    }

    /// Database path, falling back to the platform data directory
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Config file resolver
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<&Path>) -> Self {
        Self {
            cli_path: cli_path.map(Path::to_path_buf),
        }
    }

    /// Resolve and load configuration.
    ///
    /// Returns the loaded config and the file it came from (`None` for defaults).
    pub fn resolve(&self) -> Result<(CodeciteConfig, Option<PathBuf>)> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return load_required(path).map(|config| (config, Some(path.clone())));
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            return load_required(&path).map(|config| (config, Some(path)));
        }

        // Priority 3: Platform config directory
        if let Some(path) = default_config_path() {
            if path.exists() {
                return load_required(&path).map(|config| (config, Some(path)));
            }
        }

        // Priority 4: Compiled defaults
        warn!("No config file found, using compiled defaults");
        Ok((CodeciteConfig::default(), None))
    }
}

fn load_required(path: &Path) -> Result<CodeciteConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config {} failed: {}", path.display(), e)))?;
    let config = CodeciteConfig::from_toml_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// `<config dir>/codecite/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("codecite").join("config.toml"))
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("codecite").join("codecite.db"))
        .unwrap_or_else(|| PathBuf::from("./codecite.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CodeciteConfig::default();
        config.validate().unwrap();
        assert_eq!(config.linking.reference_ceiling, None);
        assert_eq!(config.export.citation_source, "scholar");
        assert_eq!(config.export.series_widths, SeriesWidths { day: 1, week: 7, month: 30 });
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CodeciteConfig::from_toml_str(
            r#"
            [linking]
            reference_ceiling = 100

            [export]
            eligibility = "all"
            "#,
        )
        .unwrap();

        assert_eq!(config.linking.reference_ceiling, Some(100));
        assert_eq!(config.export.eligibility, EligibilityMode::All);
        assert_eq!(config.providers, ProviderConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_bucket_width_rejected() {
        let result = CodeciteConfig::from_toml_str(
            r#"
            [export.series_widths]
            week = 0
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_title_similarity_out_of_range_rejected() {
        let result = CodeciteConfig::from_toml_str(
            r#"
            [linking]
            min_title_similarity = 1.5
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
