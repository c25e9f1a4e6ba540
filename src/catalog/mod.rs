//! Catalog provider access: typed records, the provider seam and its rate limit.
//!
//! # Overview
//!
//! - [`CatalogProvider`] - Async trait the crawler depends on
//! - [`CatalogClient`] - HTTP/JSON implementation against the public catalog API
//! - [`RateLimiter`] - Process-wide request gate shared by every client
//! - [`AlbumSummary`], [`AlbumDetail`] - Provider-side album records
//! - [`CatalogError`] - Failure taxonomy (not-found, malformed, transport)

mod client;
mod error;
pub mod rate_limiter;

pub use client::{CatalogClient, DEFAULT_BASE_URL};
pub use error::{CatalogError, NOT_FOUND_CODE};
pub use rate_limiter::RateLimiter;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::store::{AlbumStatus, Contributor, NewAlbum, NewArtist, RecordType, Track};

/// Entry of an artist's album listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumSummary {
    pub id: i64,
    pub title: String,
}

/// Full album metadata as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumDetail {
    pub id: i64,
    /// Main artist according to the catalog; may differ from the artist being crawled.
    pub catalog_artist_id: i64,
    pub title: String,
    pub image_url: String,
    pub digital_release_date: NaiveDate,
    pub release_date: NaiveDate,
    pub record_type: RecordType,
    pub genres: Vec<String>,
    pub label: String,
    /// Tracks in catalog order with positions 1..N.
    pub tracks: Vec<Track>,
    pub contributors: Vec<Contributor>,
    pub upc: String,
}

impl AlbumDetail {
    /// Converts into a store record owned by `artist_id` with the given initial status.
    #[must_use]
    pub fn into_new_album(self, artist_id: i64, status: AlbumStatus) -> NewAlbum {
        NewAlbum {
            id: self.id,
            artist_id,
            title: self.title,
            image_url: self.image_url,
            digital_release_date: self.digital_release_date,
            release_date: self.release_date,
            record_type: self.record_type,
            genres: self.genres,
            label: self.label,
            tracks: self.tracks,
            contributors: self.contributors,
            upc: self.upc,
            status,
        }
    }
}

/// Read-only view of the external music catalog.
///
/// Implementations must route every network call through the shared
/// [`RateLimiter`].
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetches an artist; `Ok(None)` when the id does not exist.
    async fn fetch_artist(&self, id: i64) -> Result<Option<NewArtist>, CatalogError>;

    /// Lists every album credited to an artist.
    async fn fetch_album_list(&self, artist_id: i64) -> Result<Vec<AlbumSummary>, CatalogError>;

    /// Fetches complete album metadata including the ordered track list.
    async fn fetch_album_details(&self, album_id: i64) -> Result<AlbumDetail, CatalogError>;
}
