//! Upload orchestration.
//!
//! An upload runs as one logical unit:
//!
//! 1. verify the acquired album folder
//! 2. build the tracker upload parameters
//! 3. generate a private torrent for the tracker
//! 4. persist the [`Upload`] record
//! 5. add the torrent to the local torrent client
//! 6. submit parameters and torrent to the tracker
//! 7. record the tracker's ids and mark the album uploaded
//!
//! Verification failure stops before any torrent or record exists. Local
//! persistence happens before the first external call; when an external call
//! fails the stored record is left with null tracker ids so the submission can
//! be retried with the same torrent.

pub mod params;
pub mod torrent;
pub mod torrent_client;
pub mod tracker;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::acquire::download_dir_for;
use crate::store::{
    Album, AlbumStatus, NewUpload, Store, StoreError, TrackerCode, TrackerIds, Upload,
};
use crate::verify::{VerificationReport, Verifier, VerifyError};

pub use params::UploadParameters;
pub use torrent::{
    GeneratedTorrent, MetainfoGenerator, TorrentError, TorrentGenerator, TrackerIdentity,
};
pub use torrent_client::{QbittorrentClient, TorrentClient, TorrentClientError};
pub use tracker::{
    GazelleTracker, SearchResult, TrackerApi, TrackerError, TrackerRegistry, rank_matches,
};

/// Errors from the upload flow.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Verification could not run (folder missing, count mismatch, unreadable file, ...).
    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Torrent(#[from] TorrentError),

    #[error(
        "tracker {0} is not configured\n  Suggestion: Add a [trackers.{lower}] section with api_url, api_key and announce_url",
        lower = .0.as_str().to_ascii_lowercase()
    )]
    TrackerNotConfigured(TrackerCode),

    #[error("album {album_id} is {status}, expected downloaded")]
    AlbumNotReady { album_id: i64, status: AlbumStatus },

    /// At least one file failed a rule; nothing was generated or stored.
    #[error("album {album_id} failed verification ({failed} of {total} files)")]
    VerificationFailed {
        album_id: i64,
        failed: usize,
        total: usize,
        report: VerificationReport,
    },

    #[error("upload {upload_id} was already accepted by the tracker")]
    AlreadySubmitted { upload_id: i64 },

    #[error("stored parameters of upload {upload_id} are unreadable: {reason}")]
    InvalidParameters { upload_id: i64, reason: String },

    #[error(
        "torrent client submission of upload {upload_id} failed: {source}\n  Suggestion: Run `catalog-relay album retry-upload {upload_id}` once the client is reachable"
    )]
    TorrentClientSubmit {
        upload_id: i64,
        #[source]
        source: TorrentClientError,
    },

    #[error(
        "tracker submission of upload {upload_id} failed: {source}\n  Suggestion: Run `catalog-relay album retry-upload {upload_id}` to resubmit the stored torrent"
    )]
    TrackerSubmit {
        upload_id: i64,
        #[source]
        source: TrackerError,
    },
}

/// Where torrents are seeded from and how they are labelled in the client.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub download_folder: PathBuf,
    pub category: String,
    pub tags: Vec<String>,
}

/// A completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub upload_id: i64,
    pub infohash: String,
    pub ids: TrackerIds,
    /// True when a stored, previously unacknowledged torrent was resubmitted.
    pub resubmitted: bool,
}

/// Drives verification, torrent generation and submission for one album.
pub struct UploadOrchestrator {
    store: Store,
    verifier: Verifier,
    generator: Arc<dyn TorrentGenerator>,
    torrent_client: Arc<dyn TorrentClient>,
    trackers: TrackerRegistry,
    settings: UploadSettings,
}

impl UploadOrchestrator {
    #[must_use]
    pub fn new(
        store: Store,
        verifier: Verifier,
        generator: Arc<dyn TorrentGenerator>,
        torrent_client: Arc<dyn TorrentClient>,
        trackers: TrackerRegistry,
        settings: UploadSettings,
    ) -> Self {
        Self {
            store,
            verifier,
            generator,
            torrent_client,
            trackers,
            settings,
        }
    }

    /// Folder the album's files are expected in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ArtistNotFound`] if the album's artist is missing.
    pub async fn album_dir(&self, album: &Album) -> Result<PathBuf, UploadError> {
        let artist = self
            .store
            .get_artist(album.artist_id)
            .await?
            .ok_or(StoreError::ArtistNotFound(album.artist_id))?;
        Ok(download_dir_for(
            &self.settings.download_folder,
            &artist.name,
            &album.title,
            album.year(),
        ))
    }

    /// Verifies, generates, persists and submits `album_id` to `tracker`.
    ///
    /// A pending upload for the same album and tracker is resubmitted instead
    /// of generating a new torrent.
    ///
    /// # Errors
    ///
    /// See [`UploadError`]. After [`UploadError::TorrentClientSubmit`] or
    /// [`UploadError::TrackerSubmit`] the upload record exists and can be
    /// retried with [`Self::retry_submission`].
    #[instrument(skip(self), fields(tracker = %tracker_code))]
    pub async fn upload(
        &self,
        album_id: i64,
        tracker_code: TrackerCode,
    ) -> Result<UploadOutcome, UploadError> {
        let tracker = self
            .trackers
            .get(tracker_code)
            .ok_or(UploadError::TrackerNotConfigured(tracker_code))?;

        let album = self.ready_album(album_id).await?;
        let artist = self
            .store
            .get_artist(album.artist_id)
            .await?
            .ok_or(StoreError::ArtistNotFound(album.artist_id))?;
        let dir = download_dir_for(
            &self.settings.download_folder,
            &artist.name,
            &album.title,
            album.year(),
        );

        let report = self.verifier.verify(&album, &dir).await?;
        if !report.is_passed() {
            return Err(UploadError::VerificationFailed {
                album_id,
                failed: report.failures().count(),
                total: report.files.len(),
                report,
            });
        }

        if let Some(pending) = self.store.find_pending_upload(album_id, tracker_code).await? {
            info!(upload_id = pending.id, "resubmitting pending upload");
            let params = stored_parameters(&pending)?;
            return self.submit(&pending, &params, tracker.as_ref(), true).await;
        }

        let params = UploadParameters::from_album(&album, &artist.name);
        let generator = Arc::clone(&self.generator);
        let identity = tracker.identity().clone();
        let content = dir.clone();
        let generated = tokio::task::spawn_blocking(move || generator.generate(&content, &identity))
            .await
            .map_err(|e| TorrentError::Task(e.to_string()))??;

        let upload_parameters =
            serde_json::to_value(&params).map_err(|e| UploadError::InvalidParameters {
                upload_id: 0,
                reason: e.to_string(),
            })?;
        let upload = self
            .store
            .insert_upload(&NewUpload {
                album_id,
                infohash: generated.infohash,
                tracker_code,
                upload_parameters,
                torrent_file: generated.bytes,
            })
            .await?;
        info!(upload_id = upload.id, infohash = %upload.infohash, "upload recorded");

        self.submit(&upload, &params, tracker.as_ref(), false).await
    }

    /// Resubmits a stored upload the tracker never acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::AlreadySubmitted`] for an acknowledged upload and
    /// the same submission errors as [`Self::upload`].
    #[instrument(skip(self))]
    pub async fn retry_submission(&self, upload_id: i64) -> Result<UploadOutcome, UploadError> {
        let upload = self
            .store
            .get_upload(upload_id)
            .await?
            .ok_or(StoreError::UploadNotFound(upload_id))?;
        if upload.is_submitted() {
            return Err(UploadError::AlreadySubmitted { upload_id });
        }

        let tracker_code = upload.tracker_code()?;
        let tracker = self
            .trackers
            .get(tracker_code)
            .ok_or(UploadError::TrackerNotConfigured(tracker_code))?;
        self.ready_album(upload.album_id).await?;

        let params = stored_parameters(&upload)?;
        self.submit(&upload, &params, tracker.as_ref(), true).await
    }

    async fn ready_album(&self, album_id: i64) -> Result<Album, UploadError> {
        let album = self.store.require_album(album_id).await?;
        if album.status != AlbumStatus::Downloaded {
            return Err(UploadError::AlbumNotReady {
                album_id,
                status: album.status,
            });
        }
        Ok(album)
    }

    async fn submit(
        &self,
        upload: &Upload,
        params: &UploadParameters,
        tracker: &dyn TrackerApi,
        resubmitted: bool,
    ) -> Result<UploadOutcome, UploadError> {
        let added = self
            .torrent_client
            .submit(&upload.torrent_file, &self.settings.category, &self.settings.tags)
            .await;
        match added {
            Ok(()) => {}
            // A resubmitted torrent may already be seeding from the first attempt.
            Err(TorrentClientError::Rejected { status, body }) if resubmitted => {
                warn!(
                    upload_id = upload.id,
                    status,
                    body = %body,
                    "torrent client rejected resubmitted torrent; continuing"
                );
            }
            Err(source) => {
                return Err(UploadError::TorrentClientSubmit {
                    upload_id: upload.id,
                    source,
                });
            }
        }

        let ids = tracker
            .upload(params, &upload.torrent_file)
            .await
            .map_err(|source| UploadError::TrackerSubmit {
                upload_id: upload.id,
                source,
            })?;

        self.store.complete_upload(upload.id, ids).await?;
        info!(
            upload_id = upload.id,
            torrent_id = ids.torrent_id,
            group_id = ids.group_id,
            "album uploaded"
        );
        Ok(UploadOutcome {
            upload_id: upload.id,
            infohash: upload.infohash.clone(),
            ids,
            resubmitted,
        })
    }
}

impl std::fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("trackers", &self.trackers)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn stored_parameters(upload: &Upload) -> Result<UploadParameters, UploadError> {
    serde_json::from_str(&upload.upload_parameters).map_err(|e| UploadError::InvalidParameters {
        upload_id: upload.id,
        reason: e.to_string(),
    })
}
