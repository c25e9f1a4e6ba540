//! List command handlers: backlog, ready-for-upload and tracked views.

use anyhow::Result;
use catalog_relay::store::Page;

use super::{AppContext, render_album_row};
use crate::cli::{ListView, PageArgs};

fn page(args: PageArgs) -> Page {
    Page {
        limit: args.limit,
        offset: args.offset,
    }
}

pub async fn run_list_command(ctx: &AppContext, view: ListView) -> Result<()> {
    let store = ctx.open_store().await?;
    let (label, albums) = match view {
        ListView::Backlog(args) => ("backlog", store.list_backlog(page(args)).await?),
        ListView::Ready(args) => ("ready for upload", store.list_ready_for_upload(page(args)).await?),
        ListView::Tracked(args) => ("tracked", store.list_tracked(page(args)).await?),
    };

    if albums.is_empty() {
        println!("No {label} albums.");
        return Ok(());
    }
    for album in &albums {
        println!("{}", render_album_row(album));
    }
    if let ListView::Backlog(_) = view {
        println!("Backlog total: {}", store.count_backlog().await?);
    }
    Ok(())
}
