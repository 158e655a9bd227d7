//! Pipeline configuration.
//!
//! Settings come from a TOML file (the embedded `config/default.toml` when
//! none is given), then environment overrides.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use safezone_extract::filter::FilterConfig;
use safezone_extract::resolver::ResolverConfig;
use safezone_gazetteer::{Gazetteer, GazetteerError};
use safezone_source::SourceConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Replaces the source with this sheet export URL.
pub const SHEET_URL_ENV: &str = "SAFEZONE_SHEET_URL";

/// Replaces the datastore path.
pub const STORE_PATH_ENV: &str = "SAFEZONE_STORE_PATH";

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`PipelineConfig`].
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Datastore settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON datastore file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/safezone.json"),
        }
    }
}

/// Worker settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Resolution workers; 0 uses the available parallelism.
    pub workers: usize,
}

/// Gazetteer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazetteerConfig {
    /// Gazetteer TOML file. The bundled Malaysia table when unset.
    pub path: Option<PathBuf>,
}

impl GazetteerConfig {
    /// Loads and validates the configured gazetteer.
    ///
    /// # Errors
    ///
    /// Returns [`GazetteerError`] if the file cannot be read or fails
    /// validation.
    pub fn load(&self) -> Result<Gazetteer, GazetteerError> {
        match &self.path {
            Some(path) => {
                log::info!("Loading gazetteer from {}", path.display());
                Gazetteer::from_path(path)
            }
            None => Gazetteer::malaysia(),
        }
    }
}

/// Everything a pipeline run needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub resolver: ResolverConfig,
    pub filter: FilterConfig,
    pub ingest: IngestConfig,
    pub gazetteer: GazetteerConfig,
}

impl PipelineConfig {
    /// Parses a config from TOML. Missing sections take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the text is not a valid config.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Loads `path`, or the embedded defaults when `None`, then applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::from_toml(DEFAULT_CONFIG)?,
        };

        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Applies [`SHEET_URL_ENV`] and [`STORE_PATH_ENV`] as read by `lookup`.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(SHEET_URL_ENV).filter(|v| !v.trim().is_empty()) {
            log::debug!("{SHEET_URL_ENV} set; reading reports from {url}");
            self.source = self.source.with_url(url);
        }
        if let Some(path) = lookup(STORE_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.store.path = PathBuf::from(path);
        }
        self
    }
}

/// Resolves a configured worker count, mapping 0 to the available
/// parallelism.
#[must_use]
pub fn effective_workers(workers: usize) -> usize {
    if workers > 0 {
        return workers;
    }
    std::thread::available_parallelism().map_or(4, NonZeroUsize::get)
}
