//! Audio acquisition: the external tool seam and the on-disk album layout.
//!
//! Acquisition itself is delegated to an external program (configured as a
//! program plus argument template). This module only launches it and knows
//! where the files are expected to land.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Placeholder substituted with the catalog album id in tool arguments.
pub const ALBUM_ID_PLACEHOLDER: &str = "{album_id}";

/// Characters that are not allowed in a path component on common filesystems.
const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Longest stderr excerpt kept in an error.
const STDERR_EXCERPT_LEN: usize = 2000;

/// Errors from launching the acquisition tool.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// No acquisition program configured.
    #[error(
        "no acquisition tool configured\n  Suggestion: Set [acquisition] program (and args) in the config file"
    )]
    NotConfigured,

    /// The program could not be started.
    #[error("failed to start acquisition tool '{program}': {source}")]
    Spawn {
        /// Program name or path.
        program: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The program ran but reported failure.
    #[error("acquisition of album {album_id} failed (exit code {code:?}): {stderr}")]
    Failed {
        /// Catalog album id.
        album_id: i64,
        /// Process exit code, if any.
        code: Option<i32>,
        /// Tail of the tool's stderr.
        stderr: String,
    },
}

/// Materializes an album's audio files on disk.
#[async_trait]
pub trait AcquisitionTool: Send + Sync {
    /// Acquires the album; returns once the tool has finished.
    async fn acquire(&self, album_id: i64) -> Result<(), AcquireError>;
}

/// Acquisition by running an external command.
#[derive(Debug, Clone)]
pub struct CommandAcquisition {
    program: String,
    args: Vec<String>,
}

impl CommandAcquisition {
    /// Creates a command runner. `{album_id}` in any argument is replaced per call.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::NotConfigured`] if `program` is empty.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self, AcquireError> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(AcquireError::NotConfigured);
        }
        Ok(Self { program, args })
    }

    /// Arguments with the album id substituted.
    #[must_use]
    pub fn expand_args(&self, album_id: i64) -> Vec<String> {
        let id = album_id.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(ALBUM_ID_PLACEHOLDER, &id))
            .collect()
    }
}

#[async_trait]
impl AcquisitionTool for CommandAcquisition {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn acquire(&self, album_id: i64) -> Result<(), AcquireError> {
        let args = self.expand_args(album_id);
        debug!(?args, "starting acquisition tool");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| AcquireError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            info!(album_id, "acquisition finished");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let excerpt_start = stderr
            .char_indices()
            .rev()
            .nth(STDERR_EXCERPT_LEN)
            .map_or(0, |(i, _)| i);
        Err(AcquireError::Failed {
            album_id,
            code: output.status.code(),
            stderr: stderr[excerpt_start..].to_string(),
        })
    }
}

/// Replaces filesystem-reserved characters with `_` and trims whitespace.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if RESERVED_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Folder an album is acquired into: `{base}/{artist} - {album} ({year}) [WEB FLAC]`.
#[must_use]
pub fn download_dir_for(base: &Path, artist: &str, album_title: &str, year: i32) -> PathBuf {
    base.join(format!(
        "{} - {} ({year}) [WEB FLAC]",
        sanitize_component(artist),
        sanitize_component(album_title)
    ))
}
