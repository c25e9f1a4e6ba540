//! Verification of acquired audio against catalog metadata.
//!
//! Given an [`Album`] and the folder its audio was acquired into, the
//! [`Verifier`] checks that every file is an authentic, correctly tagged,
//! full-quality copy of the matching catalog track.
//!
//! Whole-album problems (folder missing, unexpected file, unset checksum,
//! track count mismatch) are returned as [`VerifyError`]. Per-file rule
//! failures are collected into a [`VerificationReport`]; the album passes only
//! when every file passes.
//!
//! # Rules
//!
//! | Rule | Passes when |
//! |---|---|
//! | `title` | embedded title equals the catalog track title |
//! | `album` | embedded album equals the catalog album title |
//! | `position` | embedded track number equals the catalog position |
//! | `bit_depth` | exactly 16 bits |
//! | `sample_rate` | exactly 44 100 Hz |
//! | `upc` | embedded barcode equals the catalog UPC |
//! | `bitrate` | strictly between 400 000 and 1 411 000 bit/s |
//! | `duration` | within 5 s of the catalog duration |
//! | `file_size` | within max(200 000 B, 5% of actual) of `bitrate * duration / 8` |
//! | `stream_integrity` | the optional decoder self-check succeeds |

mod audio;
mod integrity;

pub use audio::{AudioTagReader, FlacTagReader, ParsedAudioFile};
pub use integrity::{FlacTestVerifier, StreamIntegrityVerifier};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::store::{Album, Track};

/// Audio file extension accepted in an album folder.
pub const AUDIO_EXTENSION: &str = "flac";
/// Cover-art extensions tolerated (and ignored) in an album folder.
pub const COVER_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

const REQUIRED_BIT_DEPTH: u8 = 16;
const REQUIRED_SAMPLE_RATE: u32 = 44_100;
const MIN_BITRATE_EXCLUSIVE: u32 = 400_000;
const MAX_BITRATE_EXCLUSIVE: u32 = 1_411_000;
const DURATION_TOLERANCE_SECONDS: f64 = 5.0;
const SIZE_TOLERANCE_BYTES: u64 = 200_000;

/// Errors that fail a verification call as a whole.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The album folder does not exist yet.
    #[error(
        "album not downloaded yet: {path}\n  Suggestion: Run `catalog-relay album download <id>` first"
    )]
    NotAcquired {
        /// Expected album folder.
        path: PathBuf,
    },

    /// A file that is neither audio nor cover art sits in the album folder.
    #[error("unexpected file in album folder: {path}")]
    UnexpectedFile {
        /// Offending entry.
        path: PathBuf,
    },

    /// The encoder never wrote the stream checksum.
    #[error(
        "stream checksum is unset in {path}; the encode is incomplete\n  Suggestion: Delete the folder and acquire the album again"
    )]
    UnsetChecksum {
        /// Offending file.
        path: PathBuf,
    },

    /// Number of audio files differs from the catalog track count.
    #[error("album has {expected} catalog tracks but {found} audio files were found")]
    TrackCountMismatch {
        /// Catalog track count.
        expected: usize,
        /// Audio files present.
        found: usize,
    },

    /// An audio file's metadata could not be read.
    #[error("cannot read audio metadata from {path}: {reason}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Reader error.
        reason: String,
    },

    /// Filesystem failure while listing or opening files.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The stream-integrity checker could not run.
    #[error("stream integrity check failed to run for {path}: {reason}")]
    Integrity {
        /// File being checked.
        path: PathBuf,
        /// Why the check could not run.
        reason: String,
    },

    /// A blocking metadata task panicked or was cancelled.
    #[error("metadata task failed: {0}")]
    Task(String),
}

impl VerifyError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A single verification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Title,
    Album,
    Position,
    BitDepth,
    SampleRate,
    Upc,
    Bitrate,
    Duration,
    FileSize,
    StreamIntegrity,
}

impl Rule {
    /// Stable rule name used in reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Album => "album",
            Self::Position => "position",
            Self::BitDepth => "bit_depth",
            Self::SampleRate => "sample_rate",
            Self::Upc => "upc",
            Self::Bitrate => "bitrate",
            Self::Duration => "duration",
            Self::FileSize => "file_size",
            Self::StreamIntegrity => "stream_integrity",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome for one audio file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileVerdict {
    pub passed: bool,
    /// Failed rules, in rule order. Empty when `passed`.
    pub failures: Vec<Rule>,
}

/// Per-file verdicts for one album folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub files: BTreeMap<PathBuf, FileVerdict>,
}

impl VerificationReport {
    /// True when every file passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.files.values().all(|v| v.passed)
    }

    /// Path → pass/fail map.
    #[must_use]
    pub fn as_bool_map(&self) -> BTreeMap<PathBuf, bool> {
        self.files
            .iter()
            .map(|(path, verdict)| (path.clone(), verdict.passed))
            .collect()
    }

    /// Files that failed, with their failing rules.
    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &[Rule])> {
        self.files
            .iter()
            .filter(|(_, v)| !v.passed)
            .map(|(p, v)| (p, v.failures.as_slice()))
    }
}

/// True when the actual size `actual` is within tolerance of `bitrate * duration / 8`.
///
/// Tolerance is `max(200_000, 0.05 * actual)` bytes. Evaluated on integers
/// scaled by 8 so the boundaries are exact.
#[must_use]
pub fn file_size_within_tolerance(bitrate: u32, catalog_duration_seconds: u32, actual: u64) -> bool {
    let expected_x8 = u128::from(bitrate) * u128::from(catalog_duration_seconds);
    let actual_x8 = u128::from(actual) * 8;
    let diff_x8 = expected_x8.abs_diff(actual_x8);

    diff_x8 <= u128::from(SIZE_TOLERANCE_BYTES) * 8 || diff_x8 * 5 <= u128::from(actual) * 2
}

/// Evaluates every per-file rule except `stream_integrity`.
#[must_use]
pub fn evaluate_rules(parsed: &ParsedAudioFile, album: &Album, track: &Track) -> Vec<Rule> {
    let mut failures = Vec::new();

    if parsed.title.as_deref() != Some(track.title.as_str()) {
        failures.push(Rule::Title);
    }
    if parsed.album.as_deref() != Some(album.title.as_str()) {
        failures.push(Rule::Album);
    }
    if parsed.position != Some(track.position) {
        failures.push(Rule::Position);
    }
    if parsed.bit_depth != Some(REQUIRED_BIT_DEPTH) {
        failures.push(Rule::BitDepth);
    }
    if parsed.sample_rate != Some(REQUIRED_SAMPLE_RATE) {
        failures.push(Rule::SampleRate);
    }
    if parsed.upc.as_deref() != Some(album.upc.as_str()) {
        failures.push(Rule::Upc);
    }
    if !parsed
        .bitrate
        .is_some_and(|b| b > MIN_BITRATE_EXCLUSIVE && b < MAX_BITRATE_EXCLUSIVE)
    {
        failures.push(Rule::Bitrate);
    }
    if (parsed.duration_seconds - f64::from(track.duration_seconds)).abs()
        > DURATION_TOLERANCE_SECONDS
    {
        failures.push(Rule::Duration);
    }
    if !parsed.bitrate.is_some_and(|b| {
        file_size_within_tolerance(b, track.duration_seconds, parsed.file_size)
    }) {
        failures.push(Rule::FileSize);
    }

    failures
}

enum EntryKind {
    Audio,
    Cover,
}

fn classify_entry(path: &Path, is_dir: bool) -> Option<EntryKind> {
    if is_dir {
        return None;
    }
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == AUDIO_EXTENSION {
        Some(EntryKind::Audio)
    } else if COVER_EXTENSIONS.contains(&ext.as_str()) {
        Some(EntryKind::Cover)
    } else {
        None
    }
}

/// Album verification engine.
#[derive(Clone)]
pub struct Verifier {
    reader: Arc<dyn AudioTagReader>,
    integrity: Option<Arc<dyn StreamIntegrityVerifier>>,
}

impl Verifier {
    /// Creates a verifier without the stream-integrity self-check.
    #[must_use]
    pub fn new(reader: Arc<dyn AudioTagReader>) -> Self {
        Self {
            reader,
            integrity: None,
        }
    }

    /// Enables the stream-integrity self-check.
    #[must_use]
    pub fn with_integrity(mut self, integrity: Arc<dyn StreamIntegrityVerifier>) -> Self {
        self.integrity = Some(integrity);
        self
    }

    /// Verifies the album folder `dir` against `album`.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::NotAcquired`] when `dir` does not exist
    /// - [`VerifyError::UnexpectedFile`] for any non-audio, non-cover entry
    /// - [`VerifyError::UnsetChecksum`] for a file whose stream MD5 is all zeros
    /// - [`VerifyError::TrackCountMismatch`] when file and track counts differ
    /// - [`VerifyError::Parse`] / [`VerifyError::Io`] / [`VerifyError::Integrity`]
    ///   when a file cannot be inspected
    #[instrument(skip(self, album), fields(album_id = album.id, dir = %dir.display()))]
    pub async fn verify(&self, album: &Album, dir: &Path) -> Result<VerificationReport, VerifyError> {
        let audio_paths = list_audio_files(dir).await?;

        let mut parsed = Vec::with_capacity(audio_paths.len());
        for path in audio_paths {
            let file = self.read_file(path).await?;
            if file.md5_signature == 0 {
                return Err(VerifyError::UnsetChecksum { path: file.path });
            }
            parsed.push(file);
        }

        parsed.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.path.cmp(&b.path)));

        if parsed.len() != album.tracks.len() {
            return Err(VerifyError::TrackCountMismatch {
                expected: album.tracks.len(),
                found: parsed.len(),
            });
        }

        let mut tracks: Vec<&Track> = album.tracks.iter().collect();
        tracks.sort_by_key(|t| t.position);

        let mut report = VerificationReport::default();
        for (file, track) in parsed.into_iter().zip(tracks) {
            let mut failures = evaluate_rules(&file, album, track);
            if let Some(integrity) = &self.integrity
                && !integrity.check(&file.path).await?
            {
                failures.push(Rule::StreamIntegrity);
            }

            if failures.is_empty() {
                debug!(path = %file.path.display(), "file verified");
            } else {
                warn!(
                    path = %file.path.display(),
                    position = track.position,
                    failed = ?failures.iter().map(Rule::as_str).collect::<Vec<_>>(),
                    "file failed verification"
                );
            }
            report.files.insert(
                file.path,
                FileVerdict {
                    passed: failures.is_empty(),
                    failures,
                },
            );
        }

        info!(passed = report.is_passed(), files = report.files.len(), "verification finished");
        Ok(report)
    }

    async fn read_file(&self, path: PathBuf) -> Result<ParsedAudioFile, VerifyError> {
        let reader = Arc::clone(&self.reader);
        tokio::task::spawn_blocking(move || reader.read(&path))
            .await
            .map_err(|e| VerifyError::Task(e.to_string()))?
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("integrity_check", &self.integrity.is_some())
            .finish_non_exhaustive()
    }
}

/// Lists the folder, failing fast on anything that is not audio or cover art.
async fn list_audio_files(dir: &Path) -> Result<Vec<PathBuf>, VerifyError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VerifyError::NotAcquired {
                path: dir.to_path_buf(),
            });
        }
        Err(e) => return Err(VerifyError::io(dir, e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| VerifyError::io(dir, e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map_err(|e| VerifyError::io(entry.path(), e))?
            .is_dir();
        paths.push((entry.path(), is_dir));
    }
    paths.sort();

    let mut audio = Vec::new();
    for (path, is_dir) in paths {
        match classify_entry(&path, is_dir) {
            Some(EntryKind::Audio) => audio.push(path),
            Some(EntryKind::Cover) => {}
            None => return Err(VerifyError::UnexpectedFile { path }),
        }
    }
    Ok(audio)
}
