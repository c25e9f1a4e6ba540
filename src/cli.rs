//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use catalog_relay::store::TrackerCode;

/// Crawl a music catalog, verify acquired releases and publish them to private trackers.
#[derive(Parser, Debug)]
#[command(name = "catalog-relay")]
#[command(author, version, about)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/catalog-relay/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover new artists and albums from the catalog
    Crawl(CrawlArgs),

    /// Artist operations
    Artist {
        #[command(subcommand)]
        command: ArtistCommand,
    },

    /// Album lifecycle operations
    Album {
        #[command(subcommand)]
        command: AlbumCommand,
    },

    /// List albums by lifecycle view
    List {
        #[command(subcommand)]
        view: ListView,
    },

    /// Look up an artist's albums on a tracker
    Search(SearchArgs),
}

/// Crawl knobs. Unset values come from the config file.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CrawlArgs {
    /// Repeat the crawl every N minutes instead of running once
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=10_080))]
    pub every_minutes: Option<u64>,

    /// Catalog requests per second (1-50)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=50))]
    pub rate_limit: Option<u32>,

    /// Artist ids probed concurrently per batch (1-100)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub batch_size: Option<u32>,

    /// Maximum batches per run
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub batch_limit: Option<u32>,

    /// Stop crawling once this many albums await review
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    pub queue_limit: Option<i64>,

    /// First artist id to probe when the store is empty
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    pub start_id: Option<i64>,
}

#[derive(Subcommand, Debug)]
pub enum ArtistCommand {
    /// Exclude an artist's albums from every tracked view
    Disable { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum AlbumCommand {
    /// Print an album with its tracks and uploads
    Show { id: i64 },
    /// Approve an album for acquisition (added -> reviewed)
    Review { id: i64 },
    /// Exclude an album from further processing
    Disable { id: i64 },
    /// Run the acquisition tool for a reviewed album
    Download { id: i64 },
    /// Check the acquired files against the catalog metadata
    Verify { id: i64 },
    /// Verify, generate a torrent and publish to a tracker
    Upload {
        id: i64,
        /// Target tracker
        #[arg(long, default_value = "RED", value_parser = parse_tracker_code)]
        tracker: TrackerCode,
    },
    /// Resubmit a stored upload the tracker never acknowledged
    RetryUpload { upload_id: i64 },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ListView {
    /// Albums awaiting review
    Backlog(PageArgs),
    /// Downloaded albums without a completed upload
    Ready(PageArgs),
    /// Every album that is not disabled
    Tracked(PageArgs),
}

#[derive(ClapArgs, Debug, Clone, Copy)]
pub struct PageArgs {
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(i64).range(1..=1000))]
    pub limit: i64,

    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i64).range(0..))]
    pub offset: i64,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SearchArgs {
    /// Stored artist id
    pub artist_id: i64,

    /// Tracker to search
    #[arg(long, default_value = "RED", value_parser = parse_tracker_code)]
    pub tracker: TrackerCode,
}

fn parse_tracker_code(value: &str) -> Result<TrackerCode, String> {
    value.parse()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_a_command() {
        let err = Cli::try_parse_from(["catalog-relay"]).unwrap_err();
        assert!(matches!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                | clap::error::ErrorKind::MissingSubcommand
        ));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["catalog-relay", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Cli::try_parse_from(["catalog-relay", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "catalog-relay",
            "list",
            "backlog",
            "-vv",
            "--config",
            "/tmp/c.toml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(!cli.quiet);
    }

    #[test]
    fn test_cli_crawl_knobs_default_to_unset() {
        let cli = Cli::try_parse_from(["catalog-relay", "crawl"]).unwrap();
        let Command::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };
        assert!(args.every_minutes.is_none());
        assert!(args.rate_limit.is_none());
        assert!(args.batch_size.is_none());
    }

    #[test]
    fn test_cli_crawl_knobs_parse() {
        let cli = Cli::try_parse_from([
            "catalog-relay",
            "crawl",
            "--every-minutes",
            "30",
            "--rate-limit",
            "10",
            "--batch-size",
            "20",
            "--batch-limit",
            "3",
            "--queue-limit",
            "500",
            "--start-id",
            "100",
        ])
        .unwrap();
        let Command::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };
        assert_eq!(args.every_minutes, Some(30));
        assert_eq!(args.rate_limit, Some(10));
        assert_eq!(args.batch_size, Some(20));
        assert_eq!(args.batch_limit, Some(3));
        assert_eq!(args.queue_limit, Some(500));
        assert_eq!(args.start_id, Some(100));
    }

    #[test]
    fn test_cli_rate_limit_out_of_range_rejected() {
        for value in ["0", "51"] {
            let err = Cli::try_parse_from(["catalog-relay", "crawl", "--rate-limit", value])
                .unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_album_upload_defaults_to_red() {
        let cli = Cli::try_parse_from(["catalog-relay", "album", "upload", "302127"]).unwrap();
        let Command::Album {
            command: AlbumCommand::Upload { id, tracker },
        } = cli.command
        else {
            panic!("expected album upload");
        };
        assert_eq!(id, 302_127);
        assert_eq!(tracker, TrackerCode::Red);
    }

    #[test]
    fn test_cli_tracker_code_is_case_insensitive() {
        let cli =
            Cli::try_parse_from(["catalog-relay", "search", "27", "--tracker", "ops"]).unwrap();
        let Command::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.tracker, TrackerCode::Ops);

        let err = Cli::try_parse_from(["catalog-relay", "search", "27", "--tracker", "xyz"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_retry_upload_takes_upload_id() {
        let cli = Cli::try_parse_from(["catalog-relay", "album", "retry-upload", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Album {
                command: AlbumCommand::RetryUpload { upload_id: 7 }
            }
        ));
    }

    #[test]
    fn test_cli_list_pagination() {
        let cli = Cli::try_parse_from([
            "catalog-relay",
            "list",
            "ready",
            "--limit",
            "10",
            "--offset",
            "20",
        ])
        .unwrap();
        let Command::List {
            view: ListView::Ready(page),
        } = cli.command
        else {
            panic!("expected list ready");
        };
        assert_eq!(page.limit, 10);
        assert_eq!(page.offset, 20);

        let err = Cli::try_parse_from(["catalog-relay", "list", "tracked", "--limit", "0"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_artist_disable() {
        let cli = Cli::try_parse_from(["catalog-relay", "artist", "disable", "27"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Artist {
                command: ArtistCommand::Disable { id: 27 }
            }
        ));
    }
}
