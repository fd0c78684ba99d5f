//! Audiveris recognition client
//!
//! Drives the Audiveris OMR engine as a blocking batch subprocess
//! (`-batch -export`) and locates the `.mxl` archive it writes into the
//! destination tree.
//!
//! The engine may run under a different OS namespace than this service
//! (a Windows binary driven from WSL); when configured, every path handed
//! to it is rewritten through `wslpath -w` first.
//!
//! The engine's process exit can precede its asynchronous disk writes, so
//! output is settled with a bounded poll-with-backoff loop rather than
//! trusting the exit status: poll the destination tree for an archive of
//! at least the configured minimum size until the overall deadline lapses.

use crate::config::{PathTranslation, SiConfig};
use crate::services::recognizer::{RecognizeError, Recognizer};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use walkdir::WalkDir;

/// Initial delay between output polls
const POLL_INITIAL: Duration = Duration::from_millis(250);

/// Poll delay ceiling; backoff doubles up to this
const POLL_MAX: Duration = Duration::from_secs(2);

/// Audiveris client
pub struct AudiverisClient {
    binary: PathBuf,
    translation: PathTranslation,
    settle_timeout: Duration,
    min_archive_bytes: u64,
}

impl AudiverisClient {
    /// Create new Audiveris client from resolved configuration
    pub fn new(config: &SiConfig) -> Self {
        Self {
            binary: config.recognizer_bin.clone(),
            translation: config.path_translation,
            settle_timeout: config.settle_timeout,
            min_archive_bytes: config.min_archive_bytes,
        }
    }

    /// Check whether the configured engine binary responds at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-help")
            .output()
            .is_ok()
    }

    /// Rewrite a path into the engine's filesystem namespace
    fn translate_path(&self, path: &Path) -> Result<String, RecognizeError> {
        match self.translation {
            PathTranslation::None => Ok(path.display().to_string()),
            PathTranslation::Wslpath => {
                let output = Command::new("wslpath")
                    .arg("-w")
                    .arg(path)
                    .output()
                    .map_err(|e| {
                        RecognizeError::PathTranslation(format!("wslpath launch failed: {}", e))
                    })?;

                if !output.status.success() {
                    return Err(RecognizeError::PathTranslation(format!(
                        "wslpath -w {} exited with {:?}: {}",
                        path.display(),
                        output.status.code(),
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }

                let translated = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if translated.is_empty() {
                    return Err(RecognizeError::PathTranslation(format!(
                        "wslpath produced no output for {}",
                        path.display()
                    )));
                }
                Ok(translated)
            }
        }
    }

    /// Run the engine to completion, capturing exit status and diagnostics
    async fn run_engine(
        &self,
        source: &Path,
        output_dir: &Path,
    ) -> Result<std::process::Output, RecognizeError> {
        let engine_source = self.translate_path(source)?;
        let engine_output = self.translate_path(output_dir)?;

        tracing::info!(
            binary = %self.binary.display(),
            source = %engine_source,
            output = %engine_output,
            "Invoking recognition engine"
        );

        let binary = self.binary.clone();
        let output = tokio::task::spawn_blocking(move || {
            Command::new(&binary)
                .arg("-batch")
                .arg("-export")
                .arg("-output")
                .arg(&engine_output)
                .arg("--")
                .arg(&engine_source)
                .output()
        })
        .await
        .map_err(|e| RecognizeError::EngineUnavailable(format!("engine task failed: {}", e)))?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RecognizeError::EngineUnavailable(format!(
                "engine binary not found: {}",
                e
            )),
            _ => RecognizeError::EngineUnavailable(format!("engine launch failed: {}", e)),
        })?;

        Ok(output)
    }

    /// Search the destination tree for a validly-sized archive
    ///
    /// A present-but-undersized file is a failed export, not output.
    fn find_archive(&self, output_dir: &Path) -> Option<PathBuf> {
        for entry in WalkDir::new(output_dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error walking recognizer output: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let is_archive = entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("mxl"))
                .unwrap_or(false);
            if !is_archive {
                continue;
            }

            match entry.metadata() {
                Ok(meta) if meta.len() >= self.min_archive_bytes => {
                    return Some(entry.path().to_path_buf());
                }
                Ok(meta) => {
                    tracing::debug!(
                        candidate = %entry.path().display(),
                        size = meta.len(),
                        min = self.min_archive_bytes,
                        "Ignoring undersized archive candidate"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        candidate = %entry.path().display(),
                        "Could not stat archive candidate: {}",
                        e
                    );
                }
            }
        }
        None
    }

    /// Bounded poll-with-backoff for the engine's asynchronous disk writes
    async fn await_output(&self, output_dir: &Path) -> Result<PathBuf, RecognizeError> {
        let deadline = tokio::time::Instant::now() + self.settle_timeout;
        let mut delay = POLL_INITIAL;

        loop {
            if let Some(archive) = self.find_archive(output_dir) {
                return Ok(archive);
            }

            if tokio::time::Instant::now() + delay > deadline {
                return Err(RecognizeError::RecognitionFailed(format!(
                    "no valid archive (>= {} bytes) appeared under {} within {:?}",
                    self.min_archive_bytes,
                    output_dir.display(),
                    self.settle_timeout
                )));
            }

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(POLL_MAX);
        }
    }
}

#[async_trait]
impl Recognizer for AudiverisClient {
    async fn recognize(
        &self,
        source: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, RecognizeError> {
        std::fs::create_dir_all(output_dir)?;

        let output = self.run_engine(source, output_dir).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognizeError::RecognitionFailed(format!(
                "engine exited with {:?}: {}",
                output.status.code(),
                stderr.chars().take(500).collect::<String>().trim()
            )));
        }

        // Exit status zero still proves nothing about the export
        let archive = self.await_output(output_dir).await?;

        tracing::info!(
            source = %source.display(),
            archive = %archive.display(),
            "Recognition produced validated archive"
        );

        Ok(archive)
    }
}
