//! Local torrent client seam and the qBittorrent WebUI client.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, REFERER};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::http::build_http_client;

/// Body qBittorrent answers with on success.
const OK_BODY: &str = "Ok.";

/// Errors from the torrent client.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("torrent client request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(
        "torrent client login failed: {reason}\n  Suggestion: Check [torrent_client] username and password"
    )]
    Login { reason: String },

    /// The client refused the torrent (invalid, or already added).
    #[error("torrent client rejected the torrent (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid torrent client URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Seeds generated torrents.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Adds a torrent under `category` with `tags`.
    async fn submit(
        &self,
        torrent: &[u8],
        category: &str,
        tags: &[String],
    ) -> Result<(), TorrentClientError>;
}

/// qBittorrent WebUI API v2 client.
pub struct QbittorrentClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl QbittorrentClient {
    /// Creates a client for the WebUI at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentClientError::InvalidUrl`] or [`TorrentClientError::Network`].
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, TorrentClientError> {
        let invalid = |reason: String| TorrentClientError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let mut parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        let client = build_http_client("torrent-client", true).map_err(|source| {
            TorrentClientError::Network {
                url: base_url.to_string(),
                source,
            }
        })?;

        Ok(Self {
            client,
            base_url: parsed,
            username: username.into(),
            password: password.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TorrentClientError> {
        self.base_url
            .join(path)
            .map_err(|e| TorrentClientError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })
    }

    /// Opens a session; the cookie store keeps the `SID` for later calls.
    async fn login(&self) -> Result<(), TorrentClientError> {
        let url = self.endpoint("api/v2/auth/login")?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("username", &self.username)
            .append_pair("password", &self.password)
            .finish();

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(REFERER, self.base_url.as_str())
            .body(body)
            .send()
            .await
            .map_err(|source| TorrentClientError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| TorrentClientError::Network {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() || text.trim() != OK_BODY {
            return Err(TorrentClientError::Login {
                reason: format!("HTTP {}: {}", status.as_u16(), text.trim()),
            });
        }
        debug!("torrent client session opened");
        Ok(())
    }
}

impl std::fmt::Debug for QbittorrentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QbittorrentClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TorrentClient for QbittorrentClient {
    #[instrument(skip(self, torrent), fields(bytes = torrent.len()))]
    async fn submit(
        &self,
        torrent: &[u8],
        category: &str,
        tags: &[String],
    ) -> Result<(), TorrentClientError> {
        self.login().await?;

        let url = self.endpoint("api/v2/torrents/add")?;
        let file = Part::bytes(torrent.to_vec())
            .file_name("upload.torrent")
            .mime_str("application/x-bittorrent")
            .map_err(|source| TorrentClientError::Network {
                url: url.to_string(),
                source,
            })?;
        let form = Form::new()
            .part("torrents", file)
            .text("category", category.to_string())
            .text("tags", tags.join(","));

        let response = self
            .client
            .post(url.clone())
            .header(REFERER, self.base_url.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(|source| TorrentClientError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| TorrentClientError::Network {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() || body.trim() != OK_BODY {
            return Err(TorrentClientError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        info!(category, "torrent added to client");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[test]
    fn test_base_url_gains_trailing_slash() {
        let client = QbittorrentClient::new("http://localhost:8080/qbt", "u", "p").unwrap();
        assert_eq!(
            client.endpoint("api/v2/auth/login").unwrap().as_str(),
            "http://localhost:8080/qbt/api/v2/auth/login"
        );
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(matches!(
            QbittorrentClient::new("localhost", "u", "p"),
            Err(TorrentClientError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_logs_in_then_adds_torrent() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .and(body_string_contains("username=admin"))
            .and(body_string_contains("password=s%26cret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "SID=abc; path=/")
                    .set_body_string("Ok."),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .and(body_string_contains("name=\"category\"\r\n\r\nmusic"))
            .and(body_string_contains("name=\"tags\"\r\n\r\nred,flac"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ok."))
            .expect(1)
            .mount(&server)
            .await;

        let client = QbittorrentClient::new(&server.uri(), "admin", "s&cret").unwrap();
        client
            .submit(b"d4:infod4:name1:aee", "music", &["red".to_string(), "flac".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_login_is_reported() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
            .mount(&server)
            .await;

        let client = QbittorrentClient::new(&server.uri(), "admin", "wrong").unwrap();
        let err = client.submit(b"x", "music", &[]).await.unwrap_err();
        assert!(matches!(err, TorrentClientError::Login { .. }));
    }

    #[tokio::test]
    async fn test_rejected_torrent_is_reported() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ok."))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
            .mount(&server)
            .await;

        let client = QbittorrentClient::new(&server.uri(), "admin", "p").unwrap();
        let err = client.submit(b"x", "music", &[]).await.unwrap_err();
        assert!(matches!(err, TorrentClientError::Rejected { status: 200, .. }));
    }
}
