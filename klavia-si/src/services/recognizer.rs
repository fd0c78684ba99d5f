//! Recognition capability seam
//!
//! The orchestrator only sees this trait; the concrete engine, its path
//! translation quirks and its output-settlement workaround live behind it
//! and are swappable in tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Recognition bridge errors
///
/// Every variant is terminal for the run that hit it; no automatic retry.
#[derive(Debug, Error)]
pub enum RecognizeError {
    /// Engine binary missing or not executable
    #[error("Recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Path could not be rewritten into the engine's addressing scheme
    #[error("Path translation failed: {0}")]
    PathTranslation(String),

    /// Engine ran but reported failure or produced no valid archive
    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    /// I/O error while driving the engine or searching its output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Optical-music-recognition capability
///
/// Input: a source document on disk plus a destination directory the
/// implementation may fill with whatever tree the engine produces.
/// Output: the location of a validated score archive, or a typed failure.
/// Engine success never implies valid output; implementations must
/// validate what they return.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(
        &self,
        source: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, RecognizeError>;
}
