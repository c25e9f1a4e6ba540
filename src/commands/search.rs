//! Search command handler: match an artist's stored albums against a
//! tracker's existing torrent groups.

use anyhow::{Context, Result};
use catalog_relay::store::StoreError;
use catalog_relay::upload::rank_matches;

use super::AppContext;
use super::progress::with_spinner;
use crate::cli::SearchArgs;

/// Matches at or above this similarity are reported as likely duplicates.
const LIKELY_DUPLICATE_SCORE: f64 = 0.8;

pub async fn run_search_command(ctx: &AppContext, args: &SearchArgs) -> Result<()> {
    let store = ctx.open_store().await?;
    let artist = store
        .get_artist(args.artist_id)
        .await?
        .ok_or(StoreError::ArtistNotFound(args.artist_id))?;
    let albums = store.albums_for_artist(artist.id).await?;

    let registry = ctx.tracker_registry()?;
    let tracker = registry.get(args.tracker).with_context(|| {
        format!(
            "Tracker {} is not configured\n  Suggestion: Add a [trackers.{}] section to the config file",
            args.tracker,
            args.tracker.as_str().to_lowercase()
        )
    })?;

    let results = with_spinner(
        ctx.quiet,
        format!("Searching {} for {}", args.tracker, artist.name),
        tracker.search_by_artist_name(&artist.name),
    )
    .await
    .with_context(|| format!("Search on {} failed", args.tracker))?;

    println!(
        "{} torrent groups on {} for {}",
        results.len(),
        args.tracker,
        artist.name
    );
    if albums.is_empty() {
        println!("No stored albums for artist {}.", artist.id);
        return Ok(());
    }

    for album in &albums {
        match rank_matches(&results, &album.title).first() {
            Some((score, best)) => {
                let marker = if *score >= LIKELY_DUPLICATE_SCORE {
                    "exists?"
                } else {
                    "new"
                };
                println!(
                    "{:>10}  {:<7}  {:.2}  {} -> group {} ({})",
                    album.id, marker, score, album.title, best.group_id, best.title
                );
            }
            None => println!("{:>10}  {:<7}  {:>4}  {}", album.id, "new", "-", album.title),
        }
    }
    Ok(())
}
