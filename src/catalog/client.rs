//! HTTP/JSON catalog provider client.
//!
//! The [`CatalogClient`] maps the public catalog REST API onto typed
//! [`NewArtist`] and [`AlbumDetail`] records. The provider answers HTTP 200
//! with an `error` object for unknown ids, so every payload is checked for that
//! envelope before being decoded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::http::build_http_client;
use crate::store::{Contributor, NewArtist, RecordType, Track};

use super::{AlbumDetail, AlbumSummary, CatalogError, CatalogProvider, NOT_FOUND_CODE, RateLimiter};

/// Default catalog API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.deezer.com";

/// Upper bound on album-list pages followed for a single artist.
const MAX_LIST_PAGES: usize = 50;

// ==================== Provider Response Types ====================

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawArtist {
    pub id: i64,
    pub name: String,
    pub picture: Option<String>,
    pub nb_album: i64,
    pub nb_fan: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAlbumPage {
    pub data: Vec<RawAlbumSummary>,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAlbumSummary {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAlbum {
    pub id: i64,
    pub title: String,
    pub upc: String,
    pub cover_medium: Option<String>,
    pub genres: RawList<RawGenre>,
    pub label: String,
    pub release_date: String,
    pub record_type: String,
    #[serde(default)]
    pub contributors: Vec<RawContributor>,
    pub artist: RawArtistRef,
    pub tracks: RawList<RawTrack>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawList<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawGenre {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawContributor {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawArtistRef {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTrack {
    pub id: i64,
    pub title: String,
    pub duration: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTrackDetail {
    pub album: Option<RawTrackAlbum>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTrackAlbum {
    pub release_date: Option<String>,
}

// ==================== CatalogClient ====================

/// Catalog provider backed by the public REST API.
pub struct CatalogClient {
    client: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl CatalogClient {
    /// Creates a client for the public catalog API.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if HTTP client construction fails.
    pub fn new(limiter: Arc<RateLimiter>) -> Result<Self, CatalogError> {
        Self::with_base_url(DEFAULT_BASE_URL, limiter)
    }

    /// Creates a client against a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidUrl`] if `base_url` is not an absolute URL,
    /// or [`CatalogError::Network`] if HTTP client construction fails.
    #[tracing::instrument(skip(limiter), fields(base_url = %base_url))]
    pub fn with_base_url(base_url: &str, limiter: Arc<RateLimiter>) -> Result<Self, CatalogError> {
        url::Url::parse(base_url).map_err(|e| CatalogError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let client = build_http_client("catalog", false)
            .map_err(|e| CatalogError::network(base_url, e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    /// Rate-limited GET returning the raw JSON payload.
    ///
    /// Provider error envelopes are mapped to [`CatalogError::NotFound`] (code
    /// 800) or [`CatalogError::Provider`].
    async fn get_json(
        &self,
        url: &str,
        entity: &'static str,
        id: i64,
    ) -> Result<serde_json::Value, CatalogError> {
        self.limiter.acquire().await;
        debug!(url, "catalog request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::network(url, e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CatalogError::NotFound { entity, id });
        }
        if !status.is_success() {
            return Err(CatalogError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CatalogError::malformed(entity, id, format!("invalid JSON: {e}")))?;

        if value.get("error").is_some() {
            let envelope: ErrorEnvelope = serde_json::from_value(value)
                .map_err(|e| CatalogError::malformed(entity, id, e.to_string()))?;
            if envelope.error.code == NOT_FOUND_CODE {
                return Err(CatalogError::NotFound { entity, id });
            }
            return Err(CatalogError::Provider {
                code: envelope.error.code,
                message: envelope.error.message,
            });
        }

        Ok(value)
    }

    async fn get_typed<T: DeserializeOwned>(
        &self,
        url: &str,
        entity: &'static str,
        id: i64,
    ) -> Result<T, CatalogError> {
        let value = self.get_json(url, entity, id).await?;
        serde_json::from_value(value).map_err(|e| CatalogError::malformed(entity, id, e.to_string()))
    }

    /// Physical release date from the first track whose detail carries one.
    async fn fetch_physical_release_date(
        &self,
        album_id: i64,
        tracks: &[RawTrack],
    ) -> Result<NaiveDate, CatalogError> {
        for track in tracks {
            let url = format!("{}/track/{}", self.base_url, track.id);
            let detail: RawTrackDetail = self.get_typed(&url, "track", track.id).await?;
            let Some(date) = detail.album.and_then(|a| a.release_date) else {
                continue;
            };
            return parse_date(&date).ok_or_else(|| {
                CatalogError::malformed("album", album_id, format!("invalid release date {date:?}"))
            });
        }
        Err(CatalogError::malformed(
            "album",
            album_id,
            "no track reports a physical release date",
        ))
    }
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CatalogProvider for CatalogClient {
    #[instrument(skip(self))]
    async fn fetch_artist(&self, id: i64) -> Result<Option<NewArtist>, CatalogError> {
        let url = format!("{}/artist/{id}", self.base_url);
        let raw: RawArtist = match self.get_typed(&url, "artist", id).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        parse_artist(raw).map(Some)
    }

    #[instrument(skip(self))]
    async fn fetch_album_list(&self, artist_id: i64) -> Result<Vec<AlbumSummary>, CatalogError> {
        let mut url = format!("{}/artist/{artist_id}/albums", self.base_url);
        let mut albums = Vec::new();

        for _ in 0..MAX_LIST_PAGES {
            let page: RawAlbumPage = self.get_typed(&url, "artist", artist_id).await?;
            albums.extend(page.data.into_iter().map(|a| AlbumSummary {
                id: a.id,
                title: a.title,
            }));
            match page.next {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        debug!(count = albums.len(), "album list fetched");
        Ok(albums)
    }

    #[instrument(skip(self))]
    async fn fetch_album_details(&self, album_id: i64) -> Result<AlbumDetail, CatalogError> {
        let url = format!("{}/album/{album_id}", self.base_url);
        let raw: RawAlbum = self.get_typed(&url, "album", album_id).await?;
        if raw.tracks.data.is_empty() {
            return Err(CatalogError::malformed("album", album_id, "empty track list"));
        }
        let release_date = self
            .fetch_physical_release_date(album_id, &raw.tracks.data)
            .await?;
        parse_album(raw, release_date)
    }
}

// ==================== Mapping ====================

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn non_empty_url(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn parse_artist(raw: RawArtist) -> Result<NewArtist, CatalogError> {
    let image_url = non_empty_url(raw.picture)
        .ok_or_else(|| CatalogError::malformed("artist", raw.id, "missing picture"))?;
    Ok(NewArtist {
        id: raw.id,
        name: raw.name,
        image_url,
        nb_album: raw.nb_album,
        nb_fan: raw.nb_fan,
    })
}

pub(crate) fn parse_album(raw: RawAlbum, release_date: NaiveDate) -> Result<AlbumDetail, CatalogError> {
    let id = raw.id;
    let image_url = non_empty_url(raw.cover_medium)
        .ok_or_else(|| CatalogError::malformed("album", id, "missing cover image"))?;
    let digital_release_date = parse_date(&raw.release_date).ok_or_else(|| {
        CatalogError::malformed("album", id, format!("invalid release date {:?}", raw.release_date))
    })?;
    let record_type: RecordType = raw
        .record_type
        .parse()
        .map_err(|reason: String| CatalogError::malformed("album", id, reason))?;

    // The album endpoint does not expose positions; catalog order is track order.
    let mut tracks = Vec::with_capacity(raw.tracks.data.len());
    for (position, track) in (1u32..).zip(raw.tracks.data) {
        tracks.push(Track {
            id: track.id,
            title: track.title,
            position,
            duration_seconds: track.duration,
        });
    }

    // One entry per name; a repeated name keeps its first slot and takes the later role.
    let mut contributors: Vec<Contributor> = Vec::new();
    for contrib in raw.contributors {
        if let Some(existing) = contributors.iter_mut().find(|c| c.name == contrib.name) {
            existing.role = contrib.role;
        } else {
            contributors.push(Contributor {
                name: contrib.name,
                role: contrib.role,
            });
        }
    }

    Ok(AlbumDetail {
        id,
        catalog_artist_id: raw.artist.id,
        title: raw.title,
        image_url,
        digital_release_date,
        release_date,
        record_type,
        genres: raw.genres.data.into_iter().map(|g| g.name).collect(),
        label: raw.label,
        tracks,
        contributors,
        upc: raw.upc,
    })
}
