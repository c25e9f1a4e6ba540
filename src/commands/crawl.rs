//! Crawl command handler: one bounded crawl, or a crawl every N minutes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use catalog_relay::catalog::{CatalogClient, RateLimiter};
use catalog_relay::crawler::{CrawlSettings, CrawlStats, Crawler};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::AppContext;
use crate::cli::CrawlArgs;

/// File settings with CLI flags applied on top.
pub(crate) fn effective_settings(base: CrawlSettings, args: &CrawlArgs) -> CrawlSettings {
    CrawlSettings {
        start_artist_id: args.start_id.unwrap_or(base.start_artist_id),
        queue_limit: args.queue_limit.unwrap_or(base.queue_limit),
        batch_size: args.batch_size.unwrap_or(base.batch_size),
        batch_limit: args.batch_limit.unwrap_or(base.batch_limit),
        minimum_release_year: base.minimum_release_year,
    }
}

fn print_summary(stats: &CrawlStats) {
    println!(
        "Crawled {} ids in {} batches: {} artists, {} albums added, {} albums disabled, {} ids failed",
        stats.probed,
        stats.batches,
        stats.artists_added,
        stats.albums_added,
        stats.albums_disabled,
        stats.failed
    );
    println!(
        "Backlog: {} albums; next artist id: {}",
        stats.backlog, stats.next_frontier
    );
}

pub async fn run_crawl_command(ctx: &AppContext, args: &CrawlArgs) -> Result<()> {
    let store = ctx.open_store().await?;
    let settings = effective_settings(ctx.config.crawl_settings(), args);
    let rate_limit = args.rate_limit.unwrap_or_else(|| ctx.config.rate_limit());

    let limiter = Arc::new(RateLimiter::per_second(rate_limit));
    let client = CatalogClient::with_base_url(ctx.config.catalog_base_url(), limiter)
        .context("Failed to create catalog client")?;
    let crawler = Crawler::new(Arc::new(store), Arc::new(client), settings);

    let Some(minutes) = args.every_minutes else {
        let stats = crawler.run().await?;
        print_summary(&stats);
        return Ok(());
    };

    info!(minutes, "crawling on a schedule; press Ctrl-C to stop");
    let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match crawler.run().await {
                    Ok(stats) => print_summary(&stats),
                    Err(e) => warn!(error = %e, "scheduled crawl failed; retrying next interval"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("stopping scheduled crawl");
                return Ok(());
            }
        }
    }
}
