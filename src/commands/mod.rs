//! CLI command handlers.

mod album;
mod artist;
mod crawl;
mod list;
mod progress;
mod search;

use std::sync::Arc;

use anyhow::{Context, Result};
use catalog_relay::db::{Database, DatabaseOptions};
use catalog_relay::store::{Album, Store};
use catalog_relay::upload::{
    GazelleTracker, MetainfoGenerator, QbittorrentClient, TrackerIdentity, TrackerRegistry,
    UploadOrchestrator, UploadSettings,
};
use catalog_relay::verify::{FlacTagReader, FlacTestVerifier, Verifier};
use tracing::debug;

use crate::app_config::FileConfig;

pub use album::run_album_command;
pub use artist::run_artist_command;
pub use crawl::run_crawl_command;
pub use list::run_list_command;
pub use search::run_search_command;

/// Shared state for one CLI invocation.
#[derive(Debug)]
pub struct AppContext {
    pub config: FileConfig,
    pub quiet: bool,
}

impl AppContext {
    #[must_use]
    pub fn new(config: FileConfig, quiet: bool) -> Self {
        Self { config, quiet }
    }

    /// Opens (creating and migrating if needed) the configured database.
    pub async fn open_store(&self) -> Result<Store> {
        let path = self.config.database_path();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory '{}'", parent.display())
            })?;
        }
        let db = Database::with_options(&path, DatabaseOptions::default())
            .await
            .with_context(|| format!("Failed to open database '{}'", path.display()))?;
        debug!(path = %path.display(), "database opened");
        Ok(Store::new(db))
    }

    /// Verifier with the external stream-integrity check enabled.
    #[must_use]
    pub fn verifier(&self) -> Verifier {
        Verifier::new(Arc::new(FlacTagReader::new())).with_integrity(Arc::new(FlacTestVerifier::new()))
    }

    /// Trackers from the `[trackers.*]` sections.
    pub fn tracker_registry(&self) -> Result<TrackerRegistry> {
        let mut registry = TrackerRegistry::new();
        for (code, section) in self.config.trackers.configured() {
            let identity = TrackerIdentity {
                code,
                announce_url: section.announce_url.clone(),
            };
            let tracker = GazelleTracker::new(identity, &section.api_url, section.api_key.clone())
                .with_context(|| format!("Failed to configure tracker {code}"))?;
            registry.register(Arc::new(tracker));
        }
        Ok(registry)
    }

    /// Orchestrator wired to the configured torrent client and trackers.
    pub fn upload_orchestrator(&self, store: Store) -> Result<UploadOrchestrator> {
        let client_config = self.config.torrent_client.as_ref().context(
            "No torrent client configured\n  Suggestion: Add a [torrent_client] section with url, username and password",
        )?;
        let client = QbittorrentClient::new(
            &client_config.url,
            client_config.username.clone(),
            client_config.password.clone(),
        )
        .context("Failed to configure torrent client")?;

        Ok(UploadOrchestrator::new(
            store,
            self.verifier(),
            Arc::new(MetainfoGenerator::new()),
            Arc::new(client),
            self.tracker_registry()?,
            UploadSettings {
                download_folder: self.config.download_folder(),
                category: self.config.torrent_category(),
                tags: client_config.tags.clone(),
            },
        ))
    }
}

/// One-line album summary used by list views.
#[must_use]
pub(crate) fn render_album_row(album: &Album) -> String {
    format!(
        "{:>10}  {:<10}  {:<11}  {}  {}",
        album.id,
        album.status.as_str(),
        album.record_type.as_str(),
        album.year(),
        album.title
    )
}
