//! Repository seam for crawler persistence.
//!
//! The crawler only needs a handful of store operations; depending on this
//! trait instead of [`Store`] lets crawl tests inject failures or races.

use async_trait::async_trait;

use super::{InsertOutcome, NewAlbum, NewArtist, Result, Store};

/// Data-access contract used by the crawler.
#[async_trait]
pub trait CrawlRepository: Send + Sync {
    /// Returns true if the artist id is already stored.
    async fn artist_exists(&self, id: i64) -> Result<bool>;

    /// Conditionally inserts an artist (first writer wins).
    async fn insert_artist(&self, artist: &NewArtist) -> Result<InsertOutcome>;

    /// Conditionally inserts an album (first writer wins).
    async fn insert_album(&self, album: &NewAlbum) -> Result<InsertOutcome>;

    /// Count of tracked albums awaiting review.
    async fn count_backlog(&self) -> Result<i64>;

    /// Highest stored artist id.
    async fn max_artist_id(&self) -> Result<Option<i64>>;
}

#[async_trait]
impl CrawlRepository for Store {
    async fn artist_exists(&self, id: i64) -> Result<bool> {
        Store::artist_exists(self, id).await
    }

    async fn insert_artist(&self, artist: &NewArtist) -> Result<InsertOutcome> {
        Store::insert_artist(self, artist).await
    }

    async fn insert_album(&self, album: &NewAlbum) -> Result<InsertOutcome> {
        Store::insert_album(self, album).await
    }

    async fn count_backlog(&self) -> Result<i64> {
        Store::count_backlog(self).await
    }

    async fn max_artist_id(&self) -> Result<Option<i64>> {
        Store::max_artist_id(self).await
    }
}
