//! Tracker API seam and the Gazelle JSON API client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::http::build_http_client;
use crate::store::{TrackerCode, TrackerIds};

use super::params::UploadParameters;
use super::torrent::TrackerIdentity;

/// Errors from tracker API calls.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Request could not be sent or the body could not be read.
    #[error("tracker request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status without a tracker error message.
    #[error("tracker returned HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The tracker refused the request.
    #[error("tracker rejected the request: {reason}")]
    Rejected { reason: String },

    /// Response body did not have the expected shape.
    #[error("unexpected tracker response: {reason}")]
    Malformed { reason: String },

    /// Configured API URL is unusable.
    #[error(
        "invalid tracker API URL '{url}': {reason}\n  Suggestion: Set api_url to the tracker's ajax.php endpoint"
    )]
    InvalidUrl { url: String, reason: String },
}

/// One torrent group returned by a tracker search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub group_id: i64,
    pub artist: String,
    pub title: String,
}

/// A private tracker that accepts uploads.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Code and announce URL torrents for this tracker are generated with.
    fn identity(&self) -> &TrackerIdentity;

    /// Publishes a release; returns the identifiers the tracker assigned.
    async fn upload(
        &self,
        params: &UploadParameters,
        torrent: &[u8],
    ) -> Result<TrackerIds, TrackerError>;

    /// Lists torrent groups credited to an artist name.
    async fn search_by_artist_name(&self, name: &str) -> Result<Vec<SearchResult>, TrackerError>;
}

/// Trackers available to the orchestrator, keyed by code.
#[derive(Clone, Default)]
pub struct TrackerRegistry {
    trackers: HashMap<TrackerCode, Arc<dyn TrackerApi>>,
}

impl TrackerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tracker under its own code, replacing any previous entry.
    pub fn register(&mut self, tracker: Arc<dyn TrackerApi>) {
        self.trackers.insert(tracker.identity().code, tracker);
    }

    #[must_use]
    pub fn get(&self, code: TrackerCode) -> Option<Arc<dyn TrackerApi>> {
        self.trackers.get(&code).cloned()
    }

    /// Registered codes, sorted.
    #[must_use]
    pub fn codes(&self) -> Vec<TrackerCode> {
        let mut codes: Vec<_> = self.trackers.keys().copied().collect();
        codes.sort_by_key(TrackerCode::as_str);
        codes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

impl std::fmt::Debug for TrackerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerRegistry")
            .field("codes", &self.codes())
            .finish()
    }
}

/// Search results ranked by title similarity to `album_title`, best first.
///
/// Scores are normalized Levenshtein similarity of the lowercased titles.
#[must_use]
pub fn rank_matches<'a>(results: &'a [SearchResult], album_title: &str) -> Vec<(f64, &'a SearchResult)> {
    let wanted = album_title.to_lowercase();
    let mut ranked: Vec<_> = results
        .iter()
        .map(|r| (strsim::normalized_levenshtein(&wanted, &r.title.to_lowercase()), r))
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    ranked
}

// ==================== Gazelle Response Types ====================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    error: Option<String>,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    torrentid: i64,
    groupid: i64,
}

#[derive(Debug, Deserialize)]
struct BrowseResponse {
    #[serde(default)]
    results: Vec<BrowseGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowseGroup {
    group_id: i64,
    group_name: String,
    #[serde(default)]
    artist: String,
}

// ==================== GazelleTracker ====================

/// Client for a Gazelle `ajax.php` JSON API.
pub struct GazelleTracker {
    client: Client,
    identity: TrackerIdentity,
    api_url: Url,
    api_key: String,
}

impl GazelleTracker {
    /// Creates a client for the tracker at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidUrl`] for an unparseable URL, or
    /// [`TrackerError::Network`] if HTTP client construction fails.
    pub fn new(
        identity: TrackerIdentity,
        api_url: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, TrackerError> {
        let parsed = Url::parse(api_url).map_err(|e| TrackerError::InvalidUrl {
            url: api_url.to_string(),
            reason: e.to_string(),
        })?;
        let client = build_http_client("tracker", false).map_err(|source| TrackerError::Network {
            url: api_url.to_string(),
            source,
        })?;
        Ok(Self {
            client,
            identity,
            api_url: parsed,
            api_key: api_key.into(),
        })
    }

    fn action_url(&self, action: &str, extra: &[(&str, &str)]) -> Url {
        let mut url = self.api_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("action", action);
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }
        url
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        url: &Url,
        response: reqwest::Response,
    ) -> Result<T, TrackerError> {
        let status = response.status();
        let body = response.text().await.map_err(|source| TrackerError::Network {
            url: url.to_string(),
            source,
        })?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TrackerError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            Err(e) => {
                return Err(TrackerError::Malformed {
                    reason: e.to_string(),
                });
            }
        };

        if envelope.status != "success" {
            return Err(TrackerError::Rejected {
                reason: envelope
                    .error
                    .unwrap_or_else(|| format!("status '{}'", envelope.status)),
            });
        }
        envelope.response.ok_or_else(|| TrackerError::Malformed {
            reason: "missing response object".to_string(),
        })
    }
}

impl std::fmt::Debug for GazelleTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GazelleTracker")
            .field("code", &self.identity.code)
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TrackerApi for GazelleTracker {
    fn identity(&self) -> &TrackerIdentity {
        &self.identity
    }

    #[instrument(skip(self, params, torrent), fields(tracker = %self.identity.code, title = %params.title))]
    async fn upload(
        &self,
        params: &UploadParameters,
        torrent: &[u8],
    ) -> Result<TrackerIds, TrackerError> {
        let url = self.action_url("upload", &[]);

        let file = Part::bytes(torrent.to_vec())
            .file_name(format!("{}.torrent", params.title))
            .mime_str("application/x-bittorrent")
            .map_err(|source| TrackerError::Network {
                url: url.to_string(),
                source,
            })?;
        let form = params
            .to_form_fields()
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value))
            .part("file_input", file);

        let response = self
            .client
            .post(url.clone())
            .header(AUTHORIZATION, &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|source| TrackerError::Network {
                url: url.to_string(),
                source,
            })?;

        let uploaded: UploadResponse = Self::read_envelope(&url, response).await?;
        info!(
            torrent_id = uploaded.torrentid,
            group_id = uploaded.groupid,
            "tracker accepted upload"
        );
        Ok(TrackerIds {
            torrent_id: uploaded.torrentid,
            group_id: uploaded.groupid,
        })
    }

    #[instrument(skip(self), fields(tracker = %self.identity.code))]
    async fn search_by_artist_name(&self, name: &str) -> Result<Vec<SearchResult>, TrackerError> {
        let url = self.action_url("browse", &[("artistname", name)]);
        let response = self
            .client
            .get(url.clone())
            .header(AUTHORIZATION, &self.api_key)
            .send()
            .await
            .map_err(|source| TrackerError::Network {
                url: url.to_string(),
                source,
            })?;

        let browse: BrowseResponse = Self::read_envelope(&url, response).await?;
        debug!(results = browse.results.len(), "tracker search finished");
        Ok(browse
            .results
            .into_iter()
            .map(|group| SearchResult {
                group_id: group.group_id,
                artist: group.artist,
                title: group.group_name,
            })
            .collect())
    }
}
