//! Configuration resolution for klavia-si
//!
//! Resolves the recognition-engine settings with ENV → TOML → default
//! priority and logs which source supplied each value.

use klavia_common::config::TomlConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Default engine binary name, resolved through PATH
const DEFAULT_RECOGNIZER_BIN: &str = "audiveris";

/// Default overall deadline for output settlement
const DEFAULT_SETTLE_TIMEOUT_SECS: u64 = 30;

/// Default minimum byte size for a valid output archive
///
/// A near-zero-byte export is a failed export even when the engine
/// reported success.
const DEFAULT_MIN_ARCHIVE_BYTES: u64 = 100;

/// Filesystem namespace translation between this service and the engine
///
/// The engine may execute under a different OS namespace (e.g. a Windows
/// binary driven from WSL); in that case every path handed to it must be
/// rewritten into the engine's addressing scheme first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTranslation {
    /// Engine shares this process's filesystem namespace
    None,
    /// Engine runs under Windows, paths rewritten via `wslpath -w`
    Wslpath,
}

impl PathTranslation {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(PathTranslation::None),
            "wslpath" => Some(PathTranslation::Wslpath),
            _ => None,
        }
    }
}

/// Resolved klavia-si configuration
#[derive(Debug, Clone)]
pub struct SiConfig {
    /// Recognition engine executable
    pub recognizer_bin: PathBuf,
    /// Path translation mode for the engine invocation
    pub path_translation: PathTranslation,
    /// Overall deadline for recognizer output settlement
    pub settle_timeout: Duration,
    /// Minimum byte size for a produced archive to count as valid output
    pub min_archive_bytes: u64,
}

impl SiConfig {
    /// Resolve configuration with ENV → TOML → default priority
    pub fn resolve(toml_config: Option<&TomlConfig>) -> Self {
        let recognizer_bin = resolve_string(
            "KLAVIA_RECOGNIZER_BIN",
            toml_config.and_then(|c| c.recognizer_bin.as_deref()),
            DEFAULT_RECOGNIZER_BIN,
            "recognizer_bin",
        );

        let translation_raw = resolve_string(
            "KLAVIA_PATH_TRANSLATION",
            toml_config.and_then(|c| c.path_translation.as_deref()),
            "none",
            "path_translation",
        );
        let path_translation = PathTranslation::parse(&translation_raw).unwrap_or_else(|| {
            warn!(
                value = %translation_raw,
                "Unknown path_translation value, falling back to 'none'"
            );
            PathTranslation::None
        });

        let settle_timeout_secs = resolve_u64(
            "KLAVIA_SETTLE_TIMEOUT_SECS",
            toml_config.and_then(|c| c.settle_timeout_secs),
            DEFAULT_SETTLE_TIMEOUT_SECS,
            "settle_timeout_secs",
        );

        let min_archive_bytes = resolve_u64(
            "KLAVIA_MIN_ARCHIVE_BYTES",
            toml_config.and_then(|c| c.min_archive_bytes),
            DEFAULT_MIN_ARCHIVE_BYTES,
            "min_archive_bytes",
        );

        Self {
            recognizer_bin: PathBuf::from(recognizer_bin),
            path_translation,
            settle_timeout: Duration::from_secs(settle_timeout_secs),
            min_archive_bytes,
        }
    }
}

impl Default for SiConfig {
    fn default() -> Self {
        Self {
            recognizer_bin: PathBuf::from(DEFAULT_RECOGNIZER_BIN),
            path_translation: PathTranslation::None,
            settle_timeout: Duration::from_secs(DEFAULT_SETTLE_TIMEOUT_SECS),
            min_archive_bytes: DEFAULT_MIN_ARCHIVE_BYTES,
        }
    }
}

fn resolve_string(env_var: &str, toml_value: Option<&str>, default: &str, key: &str) -> String {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            info!(key = key, source = "environment", "Config value resolved");
            return value;
        }
    }

    if let Some(value) = toml_value {
        if !value.trim().is_empty() {
            info!(key = key, source = "TOML", "Config value resolved");
            return value.to_string();
        }
    }

    info!(key = key, source = "default", "Config value resolved");
    default.to_string()
}

fn resolve_u64(env_var: &str, toml_value: Option<u64>, default: u64, key: &str) -> u64 {
    if let Ok(value) = std::env::var(env_var) {
        match value.trim().parse::<u64>() {
            Ok(parsed) => {
                info!(key = key, source = "environment", "Config value resolved");
                return parsed;
            }
            Err(_) => {
                warn!(
                    key = key,
                    value = %value,
                    "Invalid numeric value in environment, ignoring"
                );
            }
        }
    }

    if let Some(value) = toml_value {
        info!(key = key, source = "TOML", "Config value resolved");
        return value;
    }

    info!(key = key, source = "default", "Config value resolved");
    default
}
