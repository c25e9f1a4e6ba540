//! catalog-relay core library
//!
//! Crawls a public music catalog for new artists and albums, tracks each
//! album through a review lifecycle, verifies acquired FLAC files against
//! catalog metadata, and publishes verified albums to Gazelle trackers.
//!
//! # Architecture
//!
//! - [`db`] - SQLite connection and schema migrations
//! - [`store`] - Artist, album and upload persistence with the album lifecycle
//! - [`catalog`] - Rate-limited catalog HTTP client
//! - [`crawler`] - Frontier-driven discovery of artists and albums
//! - [`acquire`] - External acquisition tool invocation and folder layout
//! - [`verify`] - Per-file FLAC verification rules
//! - [`upload`] - Torrent generation, torrent client and tracker submission

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acquire;
pub mod catalog;
pub mod crawler;
pub mod db;
pub mod http;
pub mod store;
pub mod upload;
pub mod verify;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use catalog::{CatalogClient, CatalogError, RateLimiter};
pub use crawler::{CrawlSettings, CrawlStats, Crawler};
pub use db::{Database, DatabaseOptions};
pub use store::{Album, AlbumStatus, Artist, Store, StoreError, TrackerCode};
pub use upload::{UploadError, UploadOrchestrator, UploadOutcome};
pub use verify::{VerificationReport, Verifier, VerifyError};
