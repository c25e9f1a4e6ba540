//! Album command handlers: show, lifecycle transitions, acquisition,
//! verification and upload.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use catalog_relay::acquire::{AcquisitionTool, CommandAcquisition, download_dir_for};
use catalog_relay::store::{Album, AlbumStatus, Store, StoreError, TrackerCode};
use catalog_relay::upload::{UploadError, UploadOutcome, params::format_duration};
use catalog_relay::verify::{VerificationReport, VerifyError};

use super::AppContext;
use super::progress::with_spinner;
use crate::cli::AlbumCommand;

pub async fn run_album_command(ctx: &AppContext, command: &AlbumCommand) -> Result<()> {
    let store = ctx.open_store().await?;
    match command {
        AlbumCommand::Show { id } => show(&store, *id).await,
        AlbumCommand::Review { id } => transition(&store, *id, AlbumStatus::Reviewed).await,
        AlbumCommand::Disable { id } => transition(&store, *id, AlbumStatus::Disabled).await,
        AlbumCommand::Download { id } => download(ctx, &store, *id).await,
        AlbumCommand::Verify { id } => verify(ctx, &store, *id).await,
        AlbumCommand::Upload { id, tracker } => upload(ctx, store, *id, *tracker).await,
        AlbumCommand::RetryUpload { upload_id } => retry_upload(ctx, store, *upload_id).await,
    }
}

async fn album_dir(ctx: &AppContext, store: &Store, album: &Album) -> Result<PathBuf> {
    let artist = store
        .get_artist(album.artist_id)
        .await?
        .ok_or(StoreError::ArtistNotFound(album.artist_id))?;
    Ok(download_dir_for(
        &ctx.config.download_folder(),
        &artist.name,
        &album.title,
        album.year(),
    ))
}

async fn show(store: &Store, id: i64) -> Result<()> {
    let album = store.require_album(id).await?;
    let artist = store.get_artist(album.artist_id).await?;

    println!("id             = {}", album.id);
    println!(
        "artist         = {} ({})",
        artist.as_ref().map_or("<missing>", |a| a.name.as_str()),
        album.artist_id
    );
    println!("title          = {}", album.title);
    println!("status         = {}", album.status);
    println!("record_type    = {}", album.record_type);
    println!("release_date   = {}", album.release_date);
    println!("digital_date   = {}", album.digital_release_date);
    println!("label          = {}", album.label);
    println!("genres         = {}", album.genres.join(", "));
    println!("upc            = {}", album.upc);
    for contributor in &album.contributors {
        println!("contributor    = {} ({})", contributor.name, contributor.role);
    }

    let mut tracks: Vec<_> = album.tracks.iter().collect();
    tracks.sort_by_key(|t| t.position);
    for track in tracks {
        println!(
            "{:>3}. {} [{}]",
            track.position,
            track.title,
            format_duration(u64::from(track.duration_seconds))
        );
    }
    println!(
        "total          = {}",
        format_duration(album.total_duration_seconds())
    );

    for upload in store.uploads_for_album(id).await? {
        let state = match (upload.tracker_torrent_id, upload.tracker_group_id) {
            (Some(torrent_id), Some(group_id)) => {
                format!("torrent {torrent_id}, group {group_id}")
            }
            _ => "pending".to_string(),
        };
        println!(
            "upload {:>6}   = {} {} ({state})",
            upload.id, upload.tracker_code_str, upload.infohash
        );
    }
    Ok(())
}

async fn transition(store: &Store, id: i64, to: AlbumStatus) -> Result<()> {
    let from = store.transition_album(id, to).await?;
    println!("Album {id}: {from} -> {to}");
    Ok(())
}

async fn download(ctx: &AppContext, store: &Store, id: i64) -> Result<()> {
    let album = store.require_album(id).await?;
    if album.status != AlbumStatus::Reviewed {
        bail!(
            "Album {id} is {}, expected reviewed\n  Suggestion: Run `catalog-relay album review {id}` first",
            album.status
        );
    }

    let acquisition = &ctx.config.acquisition;
    let tool = CommandAcquisition::new(
        acquisition.program.clone().unwrap_or_default(),
        acquisition.args.clone(),
    )?;
    let dir = album_dir(ctx, store, &album).await?;

    acquire_into(store, &tool, &album, &dir, ctx.quiet).await?;
    println!("Album {id} downloaded to {}", dir.display());
    Ok(())
}

/// Runs the acquisition tool and marks the album downloaded once its folder exists.
async fn acquire_into(
    store: &Store,
    tool: &dyn AcquisitionTool,
    album: &Album,
    dir: &Path,
    quiet: bool,
) -> Result<()> {
    let id = album.id;
    with_spinner(quiet, format!("Acquiring {}", album.title), tool.acquire(id))
        .await
        .with_context(|| format!("Acquisition of album {id} failed"))?;

    if !dir.is_dir() {
        bail!(
            "Acquisition of album {id} finished but {} does not exist\n  Suggestion: Check that the acquisition tool writes into the configured download_folder",
            dir.display()
        );
    }
    store.transition_album(id, AlbumStatus::Downloaded).await?;
    Ok(())
}

fn print_report(report: &VerificationReport) {
    for (path, verdict) in &report.files {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        if verdict.passed {
            println!("ok    {name}");
        } else {
            let rules: Vec<_> = verdict.failures.iter().map(|r| r.as_str()).collect();
            println!("FAIL  {name}: {}", rules.join(", "));
        }
    }
}

async fn verify(ctx: &AppContext, store: &Store, id: i64) -> Result<()> {
    let album = store.require_album(id).await?;
    let dir = album_dir(ctx, store, &album).await?;
    let verifier = ctx.verifier();

    let result = with_spinner(
        ctx.quiet,
        format!("Verifying {}", dir.display()),
        verifier.verify(&album, &dir),
    )
    .await;
    let report = match result {
        Ok(report) => report,
        Err(VerifyError::NotAcquired { path }) => {
            bail!(
                "Album {id} is not yet acquired: {} does not exist\n  Suggestion: Run `catalog-relay album download {id}`",
                path.display()
            );
        }
        Err(e) => return Err(e).with_context(|| format!("Verification of album {id} could not run")),
    };

    print_report(&report);
    if !report.is_passed() {
        bail!(
            "Album {id} failed verification ({} of {} files)",
            report.failures().count(),
            report.files.len()
        );
    }
    println!("Album {id} verified: {} files passed", report.files.len());
    Ok(())
}

fn print_outcome(subject: &str, outcome: &UploadOutcome) {
    println!(
        "{subject} uploaded as upload {} (torrent {}, group {}, infohash {}){}",
        outcome.upload_id,
        outcome.ids.torrent_id,
        outcome.ids.group_id,
        outcome.infohash,
        if outcome.resubmitted {
            "; stored torrent resubmitted"
        } else {
            ""
        }
    );
}

async fn upload(ctx: &AppContext, store: Store, id: i64, tracker: TrackerCode) -> Result<()> {
    let orchestrator = ctx.upload_orchestrator(store)?;
    let result = with_spinner(
        ctx.quiet,
        format!("Uploading album {id} to {tracker}"),
        orchestrator.upload(id, tracker),
    )
    .await;

    match result {
        Ok(outcome) => {
            print_outcome(&format!("Album {id}"), &outcome);
            Ok(())
        }
        Err(UploadError::VerificationFailed { report, .. }) => {
            print_report(&report);
            bail!("Album {id} failed verification; nothing was uploaded");
        }
        Err(e) => Err(e.into()),
    }
}

async fn retry_upload(ctx: &AppContext, store: Store, upload_id: i64) -> Result<()> {
    let orchestrator = ctx.upload_orchestrator(store)?;
    let outcome = with_spinner(
        ctx.quiet,
        format!("Resubmitting upload {upload_id}"),
        orchestrator.retry_submission(upload_id),
    )
    .await?;
    print_outcome(&format!("Upload {upload_id}"), &outcome);
    Ok(())
}
