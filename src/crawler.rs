//! Bounded catalog crawler.
//!
//! The [`Crawler`] walks the catalog's artist id space in fixed-size batches
//! starting at the highest stored artist id. Ids inside a batch are probed
//! concurrently; batches run one after another. A run stops once the review
//! backlog reaches the queue limit or the per-run batch cap is hit.
//!
//! Per-id failures never abort a run: the id is logged and dropped, and the
//! next scheduled run will probe it again only if the frontier has not passed
//! it. Duplicate discoveries resolve through conditional inserts where the
//! first writer wins.

use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{AlbumDetail, CatalogProvider};
use crate::store::{AlbumStatus, CrawlRepository, InsertOutcome, StoreError};

/// Default number of consecutive ids probed per batch.
pub const DEFAULT_BATCH_SIZE: u32 = 10;
/// Default cap on batches per run.
pub const DEFAULT_BATCH_LIMIT: u32 = 5;
/// Default backlog ceiling.
pub const DEFAULT_QUEUE_LIMIT: i64 = 100;
/// Default first id for an empty store.
pub const DEFAULT_START_ARTIST_ID: i64 = 1;
/// Default release-year floor; older albums are created disabled.
pub const DEFAULT_MINIMUM_RELEASE_YEAR: i32 = 1990;

/// Errors that abort a crawl run.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The frontier or backlog could not be read.
    #[error("crawl aborted: {0}")]
    Store(#[from] StoreError),
}

/// Knobs for a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSettings {
    /// Frontier used when the store holds no artists.
    pub start_artist_id: i64,
    /// Stop once this many tracked albums await review.
    pub queue_limit: i64,
    /// Consecutive ids probed concurrently per batch.
    pub batch_size: u32,
    /// Maximum batches per run.
    pub batch_limit: u32,
    /// Albums released before this year are created disabled.
    pub minimum_release_year: i32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            start_artist_id: DEFAULT_START_ARTIST_ID,
            queue_limit: DEFAULT_QUEUE_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_limit: DEFAULT_BATCH_LIMIT,
            minimum_release_year: DEFAULT_MINIMUM_RELEASE_YEAR,
        }
    }
}

/// Counters for one crawl run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Batches executed.
    pub batches: u32,
    /// Ids probed (including skipped ones).
    pub probed: u64,
    /// Ids skipped because the artist was already stored.
    pub existing: u64,
    /// Ids the catalog does not know.
    pub not_found: u64,
    /// Ids dropped after an error.
    pub failed: u64,
    /// New artists stored.
    pub artists_added: u64,
    /// New albums stored as `added`.
    pub albums_added: u64,
    /// New albums stored directly as `disabled`.
    pub albums_disabled: u64,
    /// Albums already stored through another artist.
    pub albums_duplicate: u64,
    /// Albums skipped after a catalog or store error.
    pub albums_failed: u64,
    /// Backlog size when the run stopped.
    pub backlog: i64,
    /// First id the next batch would probe.
    pub next_frontier: i64,
}

impl CrawlStats {
    fn absorb(&mut self, outcome: ProbeOutcome) {
        self.probed += 1;
        match outcome {
            ProbeOutcome::Existing => self.existing += 1,
            ProbeOutcome::NotFound => self.not_found += 1,
            ProbeOutcome::Failed => self.failed += 1,
            ProbeOutcome::Crawled(albums) => {
                self.artists_added += 1;
                self.albums_added += albums.added;
                self.albums_disabled += albums.disabled;
                self.albums_duplicate += albums.duplicate;
                self.albums_failed += albums.failed;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct AlbumCounts {
    added: u64,
    disabled: u64,
    duplicate: u64,
    failed: u64,
}

#[derive(Debug, Clone, Copy)]
enum ProbeOutcome {
    Existing,
    NotFound,
    Failed,
    Crawled(AlbumCounts),
}

/// Initial status for a newly discovered album.
///
/// Albums without genres or released before `minimum_release_year` start disabled.
#[must_use]
pub fn initial_status(album: &AlbumDetail, minimum_release_year: i32) -> AlbumStatus {
    use chrono::Datelike;

    if album.genres.is_empty() || album.release_date.year() < minimum_release_year {
        AlbumStatus::Disabled
    } else {
        AlbumStatus::Added
    }
}

/// Catalog crawler over a contiguous artist id frontier.
pub struct Crawler {
    repo: Arc<dyn CrawlRepository>,
    catalog: Arc<dyn CatalogProvider>,
    settings: CrawlSettings,
}

impl Crawler {
    /// Creates a crawler.
    #[must_use]
    pub fn new(
        repo: Arc<dyn CrawlRepository>,
        catalog: Arc<dyn CatalogProvider>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            repo,
            catalog,
            settings,
        }
    }

    /// Returns the settings this crawler runs with.
    #[must_use]
    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Runs one bounded crawl.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Store`] if the frontier or backlog cannot be read.
    /// Per-id failures are logged and counted, never returned.
    #[instrument(skip(self), fields(batch_size = self.settings.batch_size, batch_limit = self.settings.batch_limit))]
    pub async fn run(&self) -> Result<CrawlStats, CrawlError> {
        let mut stats = CrawlStats::default();
        let batch_size = i64::from(self.settings.batch_size.max(1));

        let mut frontier = self
            .repo
            .max_artist_id()
            .await?
            .unwrap_or(self.settings.start_artist_id);
        let mut backlog = self.repo.count_backlog().await?;
        info!(frontier, backlog, "crawl starting");

        while backlog < self.settings.queue_limit && stats.batches < self.settings.batch_limit {
            let ids = frontier..frontier + batch_size;
            debug!(start = ids.start, end = ids.end, "probing batch");

            let outcomes = join_all(ids.map(|id| self.probe(id))).await;
            for outcome in outcomes {
                stats.absorb(outcome);
            }

            backlog = self.repo.count_backlog().await?;
            stats.batches += 1;
            frontier += batch_size;
            info!(
                batch = stats.batches,
                backlog,
                artists_added = stats.artists_added,
                albums_added = stats.albums_added,
                "crawl batch finished"
            );
        }

        stats.backlog = backlog;
        stats.next_frontier = frontier;
        info!(
            batches = stats.batches,
            probed = stats.probed,
            artists_added = stats.artists_added,
            albums_added = stats.albums_added,
            albums_disabled = stats.albums_disabled,
            failed = stats.failed,
            backlog,
            "crawl finished"
        );
        Ok(stats)
    }

    /// Probes one artist id; never fails.
    async fn probe(&self, id: i64) -> ProbeOutcome {
        match self.repo.artist_exists(id).await {
            Ok(true) => {
                debug!(artist_id = id, "artist already stored, skipping");
                return ProbeOutcome::Existing;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(artist_id = id, error = %e, "could not check artist, dropping id");
                return ProbeOutcome::Failed;
            }
        }

        let artist = match self.catalog.fetch_artist(id).await {
            Ok(Some(artist)) => artist,
            Ok(None) => {
                debug!(artist_id = id, "no such artist in catalog");
                return ProbeOutcome::NotFound;
            }
            Err(e) => {
                warn!(artist_id = id, error = %e, "artist fetch failed, dropping id");
                return ProbeOutcome::Failed;
            }
        };

        match self.repo.insert_artist(&artist).await {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::AlreadyExists) => {
                debug!(artist_id = id, "artist stored concurrently, skipping");
                return ProbeOutcome::Existing;
            }
            Err(e) => {
                warn!(artist_id = id, error = %e, "artist insert failed, dropping id");
                return ProbeOutcome::Failed;
            }
        }

        ProbeOutcome::Crawled(self.crawl_albums(id).await)
    }

    async fn crawl_albums(&self, artist_id: i64) -> AlbumCounts {
        let mut counts = AlbumCounts::default();

        let summaries = match self.catalog.fetch_album_list(artist_id).await {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!(artist_id, error = %e, "album list fetch failed");
                counts.failed += 1;
                return counts;
            }
        };

        for summary in summaries {
            let detail = match self.catalog.fetch_album_details(summary.id).await {
                Ok(detail) => detail,
                Err(e) => {
                    if e.is_malformed() || e.is_not_found() {
                        debug!(album_id = summary.id, error = %e, "skipping album");
                    } else {
                        warn!(album_id = summary.id, error = %e, "album fetch failed");
                    }
                    counts.failed += 1;
                    continue;
                }
            };

            let status = initial_status(&detail, self.settings.minimum_release_year);
            let album = detail.into_new_album(artist_id, status);
            match self.repo.insert_album(&album).await {
                Ok(InsertOutcome::Inserted) if status == AlbumStatus::Disabled => {
                    counts.disabled += 1;
                }
                Ok(InsertOutcome::Inserted) => counts.added += 1,
                Ok(InsertOutcome::AlreadyExists) => {
                    debug!(album_id = album.id, artist_id, "album already stored via another artist");
                    counts.duplicate += 1;
                }
                Err(e) => {
                    warn!(album_id = album.id, error = %e, "album insert failed");
                    counts.failed += 1;
                }
            }
        }

        counts
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::store::RecordType;

    fn detail(genres: &[&str], year: i32) -> AlbumDetail {
        AlbumDetail {
            id: 1,
            catalog_artist_id: 1,
            title: "T".to_string(),
            image_url: "https://img".to_string(),
            digital_release_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            release_date: NaiveDate::from_ymd_opt(year, 6, 1).unwrap(),
            record_type: RecordType::Album,
            genres: genres.iter().map(ToString::to_string).collect(),
            label: String::new(),
            tracks: Vec::new(),
            contributors: Vec::new(),
            upc: String::new(),
        }
    }

    #[test]
    fn test_initial_status_empty_genres_is_disabled() {
        assert_eq!(initial_status(&detail(&[], 2020), 1990), AlbumStatus::Disabled);
    }

    #[test]
    fn test_initial_status_old_release_is_disabled() {
        assert_eq!(initial_status(&detail(&["Rock"], 1989), 1990), AlbumStatus::Disabled);
    }

    #[test]
    fn test_initial_status_floor_year_is_added() {
        assert_eq!(initial_status(&detail(&["Rock"], 1990), 1990), AlbumStatus::Added);
    }

    #[test]
    fn test_crawl_settings_defaults() {
        let settings = CrawlSettings::default();
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.batch_limit, 5);
        assert_eq!(settings.queue_limit, 100);
    }

    #[test]
    fn test_stats_absorb_counts_each_outcome() {
        let mut stats = CrawlStats::default();
        stats.absorb(ProbeOutcome::Existing);
        stats.absorb(ProbeOutcome::NotFound);
        stats.absorb(ProbeOutcome::Failed);
        stats.absorb(ProbeOutcome::Crawled(AlbumCounts {
            added: 2,
            disabled: 1,
            duplicate: 1,
            failed: 0,
        }));

        assert_eq!(stats.probed, 4);
        assert_eq!(stats.existing, 1);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.artists_added, 1);
        assert_eq!(stats.albums_added, 2);
        assert_eq!(stats.albums_disabled, 1);
        assert_eq!(stats.albums_duplicate, 1);
    }
}
