//! Store module for artist, album and upload persistence.
//!
//! This module provides `SQLite`-backed storage for everything the crawler
//! discovers and everything the upload pipeline produces, and owns the album
//! lifecycle (added → reviewed → downloaded → uploaded, or disabled).
//!
//! # Overview
//!
//! - [`Store`] - Main interface for store operations
//! - [`Artist`], [`Album`], [`Upload`] - Stored records
//! - [`AlbumStatus`] - Album lifecycle states and their legal transitions
//! - [`InsertOutcome`] - Result of a conditional (first-writer-wins) insert
//! - [`StoreError`] - Operation error types
//!
//! # Example
//!
//! ```ignore
//! use catalog_relay::store::{AlbumStatus, Store};
//! use catalog_relay::Database;
//!
//! let store = Store::new(Database::new_in_memory().await?);
//! store.transition_album(302127, AlbumStatus::Reviewed).await?;
//! ```

mod error;
mod models;
mod repository;

pub use error::{DbErrorKind, StoreError};
pub use models::{
    Album, AlbumStatus, Artist, Contributor, NewAlbum, NewArtist, NewUpload, RecordType, Track,
    TrackerCode, TrackerIds, Upload,
};
pub use repository::CrawlRepository;

use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use crate::db::Database;
use models::AlbumRow;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Which albums count as tracked: the artist is active and the release is not a single.
///
/// Every listing view and the crawler backlog count go through this predicate.
/// Expects `album` and `artist` to be joined under those names.
pub const TRACKED_ALBUM_PREDICATE: &str =
    "artist.disabled = 0 AND album.record_type <> 'single'";

/// Default page size for listing views.
const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Outcome of a conditional insert keyed on a catalog id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// This call created the row.
    Inserted,
    /// A row with the same id already existed; nothing was written.
    AlreadyExists,
}

/// Limit/offset pagination for listing views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// Returns `Ok(())` if at least one row was affected; otherwise the given error.
fn check_affected(rows_affected: u64, not_found: StoreError) -> Result<()> {
    if rows_affected == 0 {
        Err(not_found)
    } else {
        Ok(())
    }
}

fn tracked_albums_sql(extra_condition: &str) -> String {
    format!(
        r"SELECT album.* FROM album
          JOIN artist ON artist.id = album.artist_id
          WHERE {TRACKED_ALBUM_PREDICATE} AND {extra_condition}
          ORDER BY album.created_at DESC, album.id DESC
          LIMIT ? OFFSET ?"
    )
}

/// Persistent artist/album/upload store.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    /// Creates a store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    // ==================== Artists ====================

    /// Inserts an artist unless one with the same id already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, artist), fields(artist_id = artist.id))]
    pub async fn insert_artist(&self, artist: &NewArtist) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r"INSERT INTO artist (id, name, image_url, nb_album, nb_fan)
              VALUES (?, ?, ?, ?, ?)
              ON CONFLICT(id) DO NOTHING",
        )
        .bind(artist.id)
        .bind(&artist.name)
        .bind(&artist.image_url)
        .bind(artist.nb_album)
        .bind(artist.nb_fan)
        .execute(self.db.pool())
        .await?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        })
    }

    /// Returns true if an artist with the given id is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn artist_exists(&self, id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM artist WHERE id = ?)")
            .bind(id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(exists)
    }

    /// Gets an artist by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_artist(&self, id: i64) -> Result<Option<Artist>> {
        let artist = sqlx::query_as::<_, Artist>("SELECT * FROM artist WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(artist)
    }

    /// Highest stored artist id, or `None` for an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn max_artist_id(&self) -> Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM artist")
            .fetch_one(self.db.pool())
            .await?;
        Ok(max)
    }

    /// Excludes an artist (and with it all of its albums) from tracked views.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ArtistNotFound`] if no artist exists with the given id.
    #[instrument(skip(self))]
    pub async fn disable_artist(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE artist SET disabled = 1 WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        check_affected(result.rows_affected(), StoreError::ArtistNotFound(id))
    }

    // ==================== Albums ====================

    /// Inserts an album unless one with the same id already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails (including a
    /// missing artist row).
    #[instrument(skip(self, album), fields(album_id = album.id, status = %album.status))]
    pub async fn insert_album(&self, album: &NewAlbum) -> Result<InsertOutcome> {
        let encode = |field: &str, value: serde_json::Result<String>| {
            value.map_err(|e| StoreError::CorruptRecord {
                table: "album",
                id: album.id,
                reason: format!("{field}: {e}"),
            })
        };
        let genres = encode("genres", serde_json::to_string(&album.genres))?;
        let tracks = encode("tracks", serde_json::to_string(&album.tracks))?;
        let contributors = encode("contributors", serde_json::to_string(&album.contributors))?;

        let result = sqlx::query(
            r"INSERT INTO album (
                id,
                artist_id,
                title,
                image_url,
                digital_release_date,
                release_date,
                record_type,
                genres,
                label,
                tracks,
                contributors,
                upc,
                status
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(id) DO NOTHING",
        )
        .bind(album.id)
        .bind(album.artist_id)
        .bind(&album.title)
        .bind(&album.image_url)
        .bind(album.digital_release_date)
        .bind(album.release_date)
        .bind(album.record_type.as_str())
        .bind(genres)
        .bind(&album.label)
        .bind(tracks)
        .bind(contributors)
        .bind(&album.upc)
        .bind(album.status.as_str())
        .execute(self.db.pool())
        .await?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        })
    }

    /// Gets an album by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails, or
    /// [`StoreError::CorruptRecord`] if a JSON column cannot be decoded.
    #[instrument(skip(self))]
    pub async fn get_album(&self, id: i64) -> Result<Option<Album>> {
        let row = sqlx::query_as::<_, AlbumRow>("SELECT * FROM album WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(Album::try_from).transpose()
    }

    /// Gets an album by id, treating absence as an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlbumNotFound`] if no album exists with the given id.
    pub async fn require_album(&self, id: i64) -> Result<Album> {
        self.get_album(id)
            .await?
            .ok_or(StoreError::AlbumNotFound(id))
    }

    /// Lists every album stored under an artist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn albums_for_artist(&self, artist_id: i64) -> Result<Vec<Album>> {
        let rows = sqlx::query_as::<_, AlbumRow>(
            "SELECT * FROM album WHERE artist_id = ? ORDER BY release_date DESC, id DESC",
        )
        .bind(artist_id)
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(Album::try_from).collect()
    }

    /// Counts tracked albums still waiting for review.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_backlog(&self) -> Result<i64> {
        let sql = format!(
            r"SELECT COUNT(*) FROM album
              JOIN artist ON artist.id = album.artist_id
              WHERE {TRACKED_ALBUM_PREDICATE} AND album.status = ?"
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(AlbumStatus::Added.as_str())
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Tracked albums waiting for review, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_backlog(&self, page: Page) -> Result<Vec<Album>> {
        self.list_tracked_where("album.status = 'added'", page).await
    }

    /// Tracked albums acquired locally and not yet accepted by any tracker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_ready_for_upload(&self, page: Page) -> Result<Vec<Album>> {
        self.list_tracked_where(
            r"album.status = 'downloaded'
              AND NOT EXISTS (
                  SELECT 1 FROM upload
                  WHERE upload.album_id = album.id AND upload.tracker_group_id IS NOT NULL
              )",
            page,
        )
        .await
    }

    /// Every tracked album that has not been disabled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_tracked(&self, page: Page) -> Result<Vec<Album>> {
        self.list_tracked_where("album.status <> 'disabled'", page)
            .await
    }

    async fn list_tracked_where(&self, condition: &str, page: Page) -> Result<Vec<Album>> {
        let sql = tracked_albums_sql(condition);
        let rows = sqlx::query_as::<_, AlbumRow>(&sql)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.db.pool())
            .await?;
        rows.into_iter().map(Album::try_from).collect()
    }

    /// Moves an album to `to` if the lifecycle allows it.
    ///
    /// The update is a compare-and-set on the status read, so two concurrent
    /// callers cannot both apply a transition from the same state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlbumNotFound`] if the album does not exist, or
    /// [`StoreError::InvalidTransition`] if the move is not legal.
    #[instrument(skip(self), fields(to = %to))]
    pub async fn transition_album(&self, id: i64, to: AlbumStatus) -> Result<AlbumStatus> {
        let mut conn = self.db.pool().acquire().await?;
        transition_album_on(&mut conn, id, to).await
    }

    // ==================== Uploads ====================

    /// Persists a generated torrent before anything is sent to external systems.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateInfohash`] if the torrent was already
    /// recorded, or [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, upload), fields(album_id = upload.album_id, infohash = %upload.infohash))]
    pub async fn insert_upload(&self, upload: &NewUpload) -> Result<Upload> {
        let mut tx = self.db.pool().begin().await?;

        let result = sqlx::query_as::<_, Upload>(
            r"INSERT INTO upload (album_id, infohash, tracker_code, upload_parameters, torrent_file)
              VALUES (?, ?, ?, ?, ?)
              RETURNING *",
        )
        .bind(upload.album_id)
        .bind(&upload.infohash)
        .bind(upload.tracker_code.as_str())
        .bind(upload.upload_parameters.to_string())
        .bind(&upload.torrent_file)
        .fetch_one(&mut *tx)
        .await;

        let stored = match result {
            Ok(stored) => stored,
            Err(err) => {
                let err = StoreError::from(err);
                if err.is_unique_violation() {
                    return Err(StoreError::DuplicateInfohash(upload.infohash.clone()));
                }
                return Err(err);
            }
        };

        tx.commit().await?;
        debug!(upload_id = stored.id, "upload recorded");
        Ok(stored)
    }

    /// Gets an upload by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_upload(&self, id: i64) -> Result<Option<Upload>> {
        let upload = sqlx::query_as::<_, Upload>("SELECT * FROM upload WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(upload)
    }

    /// Most recent upload of an album to a tracker that the tracker never acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(tracker = %tracker))]
    pub async fn find_pending_upload(
        &self,
        album_id: i64,
        tracker: TrackerCode,
    ) -> Result<Option<Upload>> {
        let upload = sqlx::query_as::<_, Upload>(
            r"SELECT * FROM upload
              WHERE album_id = ? AND tracker_code = ?
                AND (tracker_torrent_id IS NULL OR tracker_group_id IS NULL)
              ORDER BY id DESC
              LIMIT 1",
        )
        .bind(album_id)
        .bind(tracker.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(upload)
    }

    /// Lists all uploads recorded for an album, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn uploads_for_album(&self, album_id: i64) -> Result<Vec<Upload>> {
        let uploads =
            sqlx::query_as::<_, Upload>("SELECT * FROM upload WHERE album_id = ? ORDER BY id")
                .bind(album_id)
                .fetch_all(self.db.pool())
                .await?;
        Ok(uploads)
    }

    /// Records the tracker's identifiers and marks the album uploaded, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UploadNotFound`] if the upload does not exist, or
    /// [`StoreError::InvalidTransition`] if the album is no longer `downloaded`.
    #[instrument(skip(self))]
    pub async fn complete_upload(&self, upload_id: i64, ids: TrackerIds) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        let album_id: Option<i64> = sqlx::query_scalar(
            r"UPDATE upload
              SET tracker_torrent_id = ?, tracker_group_id = ?, updated_at = datetime('now')
              WHERE id = ?
              RETURNING album_id",
        )
        .bind(ids.torrent_id)
        .bind(ids.group_id)
        .bind(upload_id)
        .fetch_optional(&mut *tx)
        .await?;

        let album_id = album_id.ok_or(StoreError::UploadNotFound(upload_id))?;
        transition_album_on(&mut tx, album_id, AlbumStatus::Uploaded).await?;

        tx.commit().await?;
        debug!(album_id, torrent_id = ids.torrent_id, "upload completed");
        Ok(())
    }
}

async fn transition_album_on(
    conn: &mut SqliteConnection,
    id: i64,
    to: AlbumStatus,
) -> Result<AlbumStatus> {
    let current: Option<String> = sqlx::query_scalar("SELECT status FROM album WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let current = current.ok_or(StoreError::AlbumNotFound(id))?;
    let from: AlbumStatus = current.parse().map_err(|reason| StoreError::CorruptRecord {
        table: "album",
        id,
        reason,
    })?;

    if !from.can_transition_to(to) {
        return Err(StoreError::InvalidTransition { id, from, to });
    }

    let result = sqlx::query(
        r"UPDATE album
          SET status = ?, updated_at = datetime('now')
          WHERE id = ? AND status = ?",
    )
    .bind(to.as_str())
    .bind(id)
    .bind(from.as_str())
    .execute(&mut *conn)
    .await?;

    // Lost a race with another transition; report against the state that won.
    if result.rows_affected() == 0 {
        let now: String = sqlx::query_scalar("SELECT status FROM album WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        let now = now.parse().unwrap_or(from);
        return Err(StoreError::InvalidTransition { id, from: now, to });
    }

    debug!(album_id = id, from = %from, to = %to, "album status changed");
    Ok(from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn sample_artist(id: i64) -> NewArtist {
        NewArtist {
            id,
            name: format!("Artist {id}"),
            image_url: format!("https://img.example/artist/{id}.jpg"),
            nb_album: 2,
            nb_fan: 10,
        }
    }

    pub(crate) fn sample_album(id: i64, artist_id: i64) -> NewAlbum {
        NewAlbum {
            id,
            artist_id,
            title: format!("Album {id}"),
            image_url: format!("https://img.example/album/{id}.jpg"),
            digital_release_date: NaiveDate::from_ymd_opt(2021, 5, 7).unwrap(),
            release_date: NaiveDate::from_ymd_opt(2021, 5, 7).unwrap(),
            record_type: RecordType::Album,
            genres: vec!["Pop".to_string()],
            label: "Label".to_string(),
            tracks: vec![
                Track {
                    id: id * 10 + 1,
                    title: "One".to_string(),
                    position: 1,
                    duration_seconds: 200,
                },
                Track {
                    id: id * 10 + 2,
                    title: "Two".to_string(),
                    position: 2,
                    duration_seconds: 185,
                },
            ],
            contributors: vec![Contributor {
                name: format!("Artist {artist_id}"),
                role: "Main".to_string(),
            }],
            upc: "0123456789012".to_string(),
            status: AlbumStatus::Added,
        }
    }

    async fn store_with_album(status: AlbumStatus) -> Store {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        store.insert_artist(&sample_artist(1)).await.unwrap();
        let mut album = sample_album(10, 1);
        album.status = status;
        store.insert_album(&album).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_artist_second_insert_is_already_exists() {
        let store = Store::new(Database::new_in_memory().await.unwrap());

        let first = store.insert_artist(&sample_artist(5)).await.unwrap();
        let mut renamed = sample_artist(5);
        renamed.name = "Someone Else".to_string();
        let second = store.insert_artist(&renamed).await.unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyExists);
        let stored = store.get_artist(5).await.unwrap().unwrap();
        assert_eq!(stored.name, "Artist 5", "first writer must win");
    }

    #[tokio::test]
    async fn test_album_round_trips_json_columns() {
        let store = store_with_album(AlbumStatus::Added).await;
        let album = store.get_album(10).await.unwrap().unwrap();

        assert_eq!(album.tracks.len(), 2);
        assert_eq!(album.tracks[1].position, 2);
        assert_eq!(album.genres, vec!["Pop".to_string()]);
        assert_eq!(album.contributors[0].role, "Main");
        assert_eq!(album.year(), 2021);
        assert_eq!(album.total_duration_seconds(), 385);
    }

    #[tokio::test]
    async fn test_insert_album_duplicate_is_already_exists() {
        let store = store_with_album(AlbumStatus::Added).await;
        store.insert_artist(&sample_artist(2)).await.unwrap();

        let outcome = store.insert_album(&sample_album(10, 2)).await.unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyExists);
        assert_eq!(store.get_album(10).await.unwrap().unwrap().artist_id, 1);
    }

    #[tokio::test]
    async fn test_transition_follows_lifecycle() {
        let store = store_with_album(AlbumStatus::Added).await;

        store
            .transition_album(10, AlbumStatus::Reviewed)
            .await
            .unwrap();
        store
            .transition_album(10, AlbumStatus::Downloaded)
            .await
            .unwrap();

        let album = store.require_album(10).await.unwrap();
        assert_eq!(album.status, AlbumStatus::Downloaded);
    }

    #[tokio::test]
    async fn test_transition_rejects_leaving_disabled() {
        let store = store_with_album(AlbumStatus::Disabled).await;

        let err = store
            .transition_album(10, AlbumStatus::Reviewed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: AlbumStatus::Disabled,
                to: AlbumStatus::Reviewed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_transition_unknown_album_is_not_found() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        let err = store
            .transition_album(404, AlbumStatus::Reviewed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlbumNotFound(404)));
    }

    #[tokio::test]
    async fn test_backlog_excludes_singles_and_disabled_artists() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        store.insert_artist(&sample_artist(1)).await.unwrap();
        store.insert_artist(&sample_artist(2)).await.unwrap();

        store.insert_album(&sample_album(10, 1)).await.unwrap();
        let mut single = sample_album(11, 1);
        single.record_type = RecordType::Single;
        store.insert_album(&single).await.unwrap();
        let mut disabled = sample_album(12, 1);
        disabled.status = AlbumStatus::Disabled;
        store.insert_album(&disabled).await.unwrap();
        store.insert_album(&sample_album(20, 2)).await.unwrap();

        assert_eq!(store.count_backlog().await.unwrap(), 2);

        store.disable_artist(2).await.unwrap();
        assert_eq!(store.count_backlog().await.unwrap(), 1);

        let backlog = store.list_backlog(Page::default()).await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, 10);

        let tracked = store.list_tracked(Page::default()).await.unwrap();
        assert_eq!(tracked.iter().map(|a| a.id).collect::<Vec<_>>(), vec![10]);
    }

    #[tokio::test]
    async fn test_max_artist_id_empty_and_populated() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        assert_eq!(store.max_artist_id().await.unwrap(), None);

        store.insert_artist(&sample_artist(7)).await.unwrap();
        store.insert_artist(&sample_artist(3)).await.unwrap();
        assert_eq!(store.max_artist_id().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_upload_lifecycle_and_ready_view() {
        let store = store_with_album(AlbumStatus::Downloaded).await;
        assert_eq!(
            store.list_ready_for_upload(Page::default()).await.unwrap().len(),
            1
        );

        let upload = store
            .insert_upload(&NewUpload {
                album_id: 10,
                infohash: "a".repeat(40),
                tracker_code: TrackerCode::Red,
                upload_parameters: serde_json::json!({"title": "Album 10"}),
                torrent_file: vec![1, 2, 3],
            })
            .await
            .unwrap();
        assert!(!upload.is_submitted());

        let pending = store
            .find_pending_upload(10, TrackerCode::Red)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.id, upload.id);

        store
            .complete_upload(
                upload.id,
                TrackerIds {
                    torrent_id: 55,
                    group_id: 66,
                },
            )
            .await
            .unwrap();

        let album = store.require_album(10).await.unwrap();
        assert_eq!(album.status, AlbumStatus::Uploaded);
        assert!(
            store
                .find_pending_upload(10, TrackerCode::Red)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .list_ready_for_upload(Page::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_insert_upload_duplicate_infohash_is_rejected() {
        let store = store_with_album(AlbumStatus::Downloaded).await;
        let upload = NewUpload {
            album_id: 10,
            infohash: "b".repeat(40),
            tracker_code: TrackerCode::Red,
            upload_parameters: serde_json::json!({}),
            torrent_file: vec![0],
        };

        store.insert_upload(&upload).await.unwrap();
        let err = store.insert_upload(&upload).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateInfohash(_)));
        assert_eq!(store.uploads_for_album(10).await.unwrap().len(), 1);
    }
}
