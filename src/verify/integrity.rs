//! Stream-integrity self-check: decode the audio and compare against its own MD5.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::VerifyError;

/// Checks a single audio file's stream against its embedded checksum.
#[async_trait]
pub trait StreamIntegrityVerifier: Send + Sync {
    /// Returns `Ok(true)` when the decoded stream matches, `Ok(false)` when it does not.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Integrity`] when the check itself could not run.
    async fn check(&self, path: &Path) -> Result<bool, VerifyError>;
}

/// Runs the reference `flac --test` decoder.
#[derive(Debug, Clone)]
pub struct FlacTestVerifier {
    program: String,
}

impl FlacTestVerifier {
    /// Uses `flac` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("flac")
    }

    /// Uses a specific decoder binary.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FlacTestVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamIntegrityVerifier for FlacTestVerifier {
    async fn check(&self, path: &Path) -> Result<bool, VerifyError> {
        let status = Command::new(&self.program)
            .arg("--test")
            .arg("--silent")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| VerifyError::Integrity {
                path: path.to_path_buf(),
                reason: format!("cannot run {}: {e}", self.program),
            })?;

        debug!(path = %path.display(), ok = status.success(), "stream integrity checked");
        Ok(status.success())
    }
}
