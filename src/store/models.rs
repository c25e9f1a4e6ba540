//! Artist, album and upload records plus the album status state machine.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::StoreError;

/// Lifecycle state of an album.
///
/// ```text
/// added -> reviewed -> downloaded -> uploaded
///   \________\____________\____________\______> disabled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumStatus {
    /// Discovered by the crawler, awaiting operator review.
    Added,
    /// Approved for acquisition.
    Reviewed,
    /// Audio acquired locally.
    Downloaded,
    /// Published to a tracker.
    Uploaded,
    /// Excluded from further consideration.
    Disabled,
}

impl AlbumStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Reviewed => "reviewed",
            Self::Downloaded => "downloaded",
            Self::Uploaded => "uploaded",
            Self::Disabled => "disabled",
        }
    }

    /// Returns true if `next` is a legal move from `self`.
    ///
    /// Leaving `Disabled` and moving backwards are not supported.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Added, Self::Reviewed)
                | (Self::Reviewed, Self::Downloaded)
                | (Self::Downloaded, Self::Uploaded)
                | (
                    Self::Added | Self::Reviewed | Self::Downloaded | Self::Uploaded,
                    Self::Disabled
                )
        )
    }
}

impl fmt::Display for AlbumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlbumStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "reviewed" => Ok(Self::Reviewed),
            "downloaded" => Ok(Self::Downloaded),
            "uploaded" => Ok(Self::Uploaded),
            "disabled" => Ok(Self::Disabled),
            _ => Err(format!("invalid album status: {s}")),
        }
    }
}

/// Catalog release type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Album,
    Ep,
    Single,
    Compilation,
}

impl RecordType {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Ep => "ep",
            Self::Single => "single",
            Self::Compilation => "compilation",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    /// Accepts the catalog spelling `compile` as well as `compilation`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "album" => Ok(Self::Album),
            "ep" => Ok(Self::Ep),
            "single" => Ok(Self::Single),
            "compile" | "compilation" => Ok(Self::Compilation),
            other => Err(format!("invalid record type: {other}")),
        }
    }
}

/// Private trackers an album can be published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerCode {
    #[serde(rename = "RED")]
    Red,
    #[serde(rename = "OPS")]
    Ops,
}

impl TrackerCode {
    /// Returns the code used in the database and in the torrent `source` field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Ops => "OPS",
        }
    }
}

impl fmt::Display for TrackerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TrackerCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RED" => Ok(Self::Red),
            "OPS" => Ok(Self::Ops),
            other => Err(format!("unknown tracker code: {other}")),
        }
    }
}

/// One catalog track. Positions are 1-based and follow catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub title: String,
    pub position: u32,
    pub duration_seconds: u32,
}

/// A credited contributor and their catalog role (e.g. `Main`, `Featured`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub role: String,
}

/// Artist fields as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtist {
    pub id: i64,
    pub name: String,
    pub image_url: String,
    pub nb_album: i64,
    pub nb_fan: i64,
}

/// A stored artist.
#[derive(Debug, Clone, FromRow)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub image_url: String,
    pub nb_album: i64,
    pub nb_fan: i64,
    /// Operator exclusion flag; disabled artists drop out of every tracked view.
    pub disabled: bool,
    pub created_at: String,
}

/// Album fields written on first discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlbum {
    pub id: i64,
    pub artist_id: i64,
    pub title: String,
    pub image_url: String,
    pub digital_release_date: NaiveDate,
    pub release_date: NaiveDate,
    pub record_type: RecordType,
    pub genres: Vec<String>,
    pub label: String,
    pub tracks: Vec<Track>,
    pub contributors: Vec<Contributor>,
    pub upc: String,
    pub status: AlbumStatus,
}

/// A stored album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub id: i64,
    pub artist_id: i64,
    pub title: String,
    pub image_url: String,
    pub digital_release_date: NaiveDate,
    /// Physical release date; drives the release year everywhere.
    pub release_date: NaiveDate,
    pub record_type: RecordType,
    pub genres: Vec<String>,
    pub label: String,
    pub tracks: Vec<Track>,
    pub contributors: Vec<Contributor>,
    pub upc: String,
    pub status: AlbumStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Album {
    /// Release year of the physical release.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.release_date.year()
    }

    /// Sum of catalog track durations in seconds.
    #[must_use]
    pub fn total_duration_seconds(&self) -> u64 {
        self.tracks
            .iter()
            .map(|t| u64::from(t.duration_seconds))
            .sum()
    }
}

/// Raw album row; JSON columns are decoded in [`TryFrom`].
#[derive(Debug, FromRow)]
pub(crate) struct AlbumRow {
    id: i64,
    artist_id: i64,
    title: String,
    image_url: String,
    digital_release_date: NaiveDate,
    release_date: NaiveDate,
    record_type: String,
    genres: String,
    label: String,
    tracks: String,
    contributors: String,
    upc: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AlbumRow> for Album {
    type Error = StoreError;

    fn try_from(row: AlbumRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |reason: String| StoreError::CorruptRecord {
            table: "album",
            id,
            reason,
        };

        Ok(Self {
            id: row.id,
            artist_id: row.artist_id,
            title: row.title,
            image_url: row.image_url,
            digital_release_date: row.digital_release_date,
            release_date: row.release_date,
            record_type: row.record_type.parse().map_err(corrupt)?,
            genres: serde_json::from_str(&row.genres)
                .map_err(|e| corrupt(format!("genres: {e}")))?,
            label: row.label,
            tracks: serde_json::from_str(&row.tracks)
                .map_err(|e| corrupt(format!("tracks: {e}")))?,
            contributors: serde_json::from_str(&row.contributors)
                .map_err(|e| corrupt(format!("contributors: {e}")))?,
            upc: row.upc,
            status: row.status.parse().map_err(corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Upload fields written before any external submission.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub album_id: i64,
    pub infohash: String,
    pub tracker_code: TrackerCode,
    /// Exact parameter payload sent to the tracker, as JSON.
    pub upload_parameters: serde_json::Value,
    pub torrent_file: Vec<u8>,
}

/// A stored upload.
#[derive(Debug, Clone, FromRow)]
pub struct Upload {
    pub id: i64,
    pub album_id: i64,
    pub infohash: String,
    /// Tracker code as stored (parsed via `tracker_code()`).
    #[sqlx(rename = "tracker_code")]
    pub tracker_code_str: String,
    /// Parameter payload as JSON text.
    pub upload_parameters: String,
    pub torrent_file: Vec<u8>,
    pub tracker_torrent_id: Option<i64>,
    pub tracker_group_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Upload {
    /// Returns the parsed tracker code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptRecord`] for an unknown code.
    pub fn tracker_code(&self) -> Result<TrackerCode, StoreError> {
        self.tracker_code_str
            .parse()
            .map_err(|reason| StoreError::CorruptRecord {
                table: "upload",
                id: self.id,
                reason,
            })
    }

    /// True once the tracker has acknowledged the submission.
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.tracker_torrent_id.is_some() && self.tracker_group_id.is_some()
    }
}

/// Identifiers assigned by a tracker after a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerIds {
    pub torrent_id: i64,
    pub group_id: i64,
}
