//! Artist command handlers.

use anyhow::Result;

use super::AppContext;
use crate::cli::ArtistCommand;

pub async fn run_artist_command(ctx: &AppContext, command: &ArtistCommand) -> Result<()> {
    let store = ctx.open_store().await?;
    match command {
        ArtistCommand::Disable { id } => {
            store.disable_artist(*id).await?;
            println!("Artist {id} disabled; its albums are no longer tracked.");
        }
    }
    Ok(())
}
