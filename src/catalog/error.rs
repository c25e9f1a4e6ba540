//! Error types for catalog provider calls.

use thiserror::Error;

/// Provider error code meaning "no data for this id".
pub const NOT_FOUND_CODE: i64 = 800;

/// Errors that can occur while talking to the catalog provider.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Network-level failure (DNS, connection refused, TLS, timeout).
    #[error("network error calling {url}: {source}")]
    Network {
        /// Request URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The provider answered with an error object other than not-found.
    #[error(
        "catalog provider error {code}: {message}\n  Suggestion: Lower the catalog rate_limit if this is a quota error"
    )]
    Provider {
        /// Provider error code.
        code: i64,
        /// Provider error message.
        message: String,
    },

    /// The requested id does not exist in the catalog.
    #[error("{entity} {id} not found in catalog")]
    NotFound {
        /// `artist`, `album` or `track`.
        entity: &'static str,
        /// Requested id.
        id: i64,
    },

    /// The response was missing or had invalid required fields.
    #[error("malformed catalog metadata for {entity} {id}: {reason}")]
    Malformed {
        /// `artist`, `album` or `track`.
        entity: &'static str,
        /// Requested id.
        id: i64,
        /// What was wrong.
        reason: String,
    },

    /// The configured base URL could not be used to build a request URL.
    #[error("invalid catalog URL {url}: {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parse failure.
        reason: String,
    },
}

impl CatalogError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a malformed-metadata error.
    pub fn malformed(entity: &'static str, id: i64, reason: impl Into<String>) -> Self {
        Self::Malformed {
            entity,
            id,
            reason: reason.into(),
        }
    }

    /// True when the catalog simply has no record for the id.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the record exists but its metadata is unusable.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}
