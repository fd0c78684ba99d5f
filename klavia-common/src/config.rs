//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// TOML configuration file contents for a Klavia service
///
/// Every field is optional; missing fields fall back to environment
/// variables and compiled defaults during resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Storage root folder (uploads, recognizer output, database)
    pub root_folder: Option<String>,
    /// Path to the external recognition engine binary
    pub recognizer_bin: Option<String>,
    /// Path translation mode for the engine ("none" or "wslpath")
    pub path_translation: Option<String>,
    /// Overall deadline for recognizer output settlement, in seconds
    pub settle_timeout_secs: Option<u64>,
    /// Minimum byte size for a recognizer output archive to count as valid
    pub min_archive_bytes: Option<u64>,
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config) = load_toml_config(&default_config_path()) {
        if let Some(root_folder) = config.root_folder {
            return PathBuf::from(root_folder);
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Default configuration file path for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("klavia").join("klavia-si.toml"))
        .unwrap_or_else(|| PathBuf::from("./klavia-si.toml"))
}

/// Load and parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("klavia"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/klavia"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("klavia"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/klavia"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("klavia"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\klavia"))
    } else {
        PathBuf::from("./klavia_data")
    }
}

/// Ensure the root folder and its standard subdirectories exist
///
/// Layout under the root:
/// - `uploads/`     raw source documents, written before recognition starts
/// - `recognized/`  per-document recognizer output trees
pub fn ensure_root_layout(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root.join("uploads"))?;
    std::fs::create_dir_all(root.join("recognized"))?;
    Ok(())
}

/// Database file path under the root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join("klavia.db")
}
