//! CLI entry point for catalog-relay.

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app_config;
mod cli;
mod commands;

use cli::{Cli, Command};
use commands::{
    AppContext, run_album_command, run_artist_command, run_crawl_command, run_list_command,
    run_search_command,
};

/// Default log level when `RUST_LOG` is unset.
///
/// Priority: `RUST_LOG` > `--quiet` > `-v` count > info.
fn default_log_level(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn init_tracing(default_level: &str) {
    let no_color = std::env::var_os("NO_COLOR").is_some() || !std::io::stderr().is_terminal();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_env_filter(filter)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse before tracing so --help and --version stay clean.
    let cli = Cli::parse();
    init_tracing(default_log_level(cli.quiet, cli.verbose));

    let loaded = app_config::load_config(cli.config.as_deref())?;
    debug!(
        path = ?loaded.path,
        from_file = loaded.loaded_from_file,
        "configuration loaded"
    );
    let ctx = AppContext::new(loaded.config, cli.quiet);

    match &cli.command {
        Command::Crawl(args) => run_crawl_command(&ctx, args).await,
        Command::Artist { command } => run_artist_command(&ctx, command).await,
        Command::Album { command } => run_album_command(&ctx, command).await,
        Command::List { view } => run_list_command(&ctx, *view).await,
        Command::Search(args) => run_search_command(&ctx, args).await,
    }
}
