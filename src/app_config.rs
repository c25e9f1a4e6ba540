//! Configuration file loading for the CLI.
//!
//! The file is TOML. Every key is optional; a missing file means defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use catalog_relay::catalog::DEFAULT_BASE_URL;
use catalog_relay::catalog::rate_limiter::DEFAULT_REQUESTS_PER_SECOND;
use catalog_relay::crawler::{
    CrawlSettings, DEFAULT_BATCH_LIMIT, DEFAULT_BATCH_SIZE, DEFAULT_MINIMUM_RELEASE_YEAR,
    DEFAULT_QUEUE_LIMIT, DEFAULT_START_ARTIST_ID,
};
use catalog_relay::store::TrackerCode;
use serde::Deserialize;

const APP_DIR: &str = "catalog-relay";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DATABASE_PATH: &str = "catalog-relay.db";
const DEFAULT_DOWNLOAD_FOLDER: &str = "./downloads";
const DEFAULT_TORRENT_CATEGORY: &str = "music";

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database_path: Option<PathBuf>,
    pub download_folder: Option<PathBuf>,
    pub catalog: CatalogSection,
    pub acquisition: AcquisitionSection,
    pub trackers: TrackersSection,
    pub torrent_client: Option<TorrentClientSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogSection {
    pub base_url: Option<String>,
    /// Requests per second.
    pub rate_limit: Option<u32>,
    pub start_artist_id: Option<i64>,
    pub queue_limit: Option<i64>,
    pub batch_size: Option<u32>,
    pub batch_limit: Option<u32>,
    pub minimum_release_year: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionSection {
    pub program: Option<String>,
    /// Arguments; `{album_id}` is substituted.
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackersSection {
    pub red: Option<TrackerSection>,
    pub ops: Option<TrackerSection>,
}

impl TrackersSection {
    /// Configured trackers with their codes.
    pub fn configured(&self) -> impl Iterator<Item = (TrackerCode, &TrackerSection)> {
        [(TrackerCode::Red, &self.red), (TrackerCode::Ops, &self.ops)]
            .into_iter()
            .filter_map(|(code, section)| section.as_ref().map(|s| (code, s)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerSection {
    pub api_url: String,
    pub api_key: String,
    pub announce_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TorrentClientSection {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        let catalog = &self.catalog;
        if let Some(rate_limit) = catalog.rate_limit
            && !(1..=50).contains(&rate_limit)
        {
            bail!("Invalid config value for `catalog.rate_limit`: {rate_limit}. Expected range: 1..=50");
        }
        if let Some(batch_size) = catalog.batch_size
            && !(1..=100).contains(&batch_size)
        {
            bail!("Invalid config value for `catalog.batch_size`: {batch_size}. Expected range: 1..=100");
        }
        if let Some(batch_limit) = catalog.batch_limit
            && batch_limit < 1
        {
            bail!("Invalid config value for `catalog.batch_limit`: {batch_limit}. Expected: >= 1");
        }
        if let Some(queue_limit) = catalog.queue_limit
            && queue_limit < 1
        {
            bail!("Invalid config value for `catalog.queue_limit`: {queue_limit}. Expected: >= 1");
        }
        if let Some(start) = catalog.start_artist_id
            && start < 1
        {
            bail!("Invalid config value for `catalog.start_artist_id`: {start}. Expected: >= 1");
        }
        if let Some(base_url) = &catalog.base_url {
            url::Url::parse(base_url)
                .with_context(|| format!("Invalid config value for `catalog.base_url`: {base_url}"))?;
        }
        for (code, tracker) in self.trackers.configured() {
            let section = code.as_str().to_ascii_lowercase();
            url::Url::parse(&tracker.api_url).with_context(|| {
                format!("Invalid config value for `trackers.{section}.api_url`: {}", tracker.api_url)
            })?;
            if tracker.api_key.trim().is_empty() {
                bail!("Invalid config value for `trackers.{section}.api_key`: must not be empty");
            }
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
    }

    pub fn download_folder(&self) -> PathBuf {
        self.download_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_FOLDER))
    }

    pub fn catalog_base_url(&self) -> &str {
        self.catalog.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn rate_limit(&self) -> u32 {
        self.catalog.rate_limit.unwrap_or(DEFAULT_REQUESTS_PER_SECOND)
    }

    /// Crawl settings from the file, before CLI overrides.
    pub fn crawl_settings(&self) -> CrawlSettings {
        let catalog = &self.catalog;
        CrawlSettings {
            batch_size: catalog.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            batch_limit: catalog.batch_limit.unwrap_or(DEFAULT_BATCH_LIMIT),
            queue_limit: catalog.queue_limit.unwrap_or(DEFAULT_QUEUE_LIMIT),
            start_artist_id: catalog.start_artist_id.unwrap_or(DEFAULT_START_ARTIST_ID),
            minimum_release_year: catalog
                .minimum_release_year
                .unwrap_or(DEFAULT_MINIMUM_RELEASE_YEAR),
        }
    }

    pub fn torrent_category(&self) -> String {
        self.torrent_client
            .as_ref()
            .and_then(|c| c.category.clone())
            .unwrap_or_else(|| DEFAULT_TORRENT_CATEGORY.to_string())
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path, if any.
    pub path: Option<PathBuf>,
    pub config: FileConfig,
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/catalog-relay/config.toml`
/// 2. `$HOME/.config/catalog-relay/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join(CONFIG_FILE));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config from `explicit`, or the default path when present.
///
/// An explicit path must exist; a missing default file yields defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}
