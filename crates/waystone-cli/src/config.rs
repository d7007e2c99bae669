//! Data directory and persisted search mode.

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use waystone_core::search::{SearchMode, MODE_STORE_KEY};

/// Asset cache database file name.
const CACHE_FILENAME: &str = "assets.redb";

/// Returns the data directory, creating it if needed.
///
/// - macOS: `~/Library/Application Support/dev.errorsignal.Waystone/`
/// - Linux: `~/.local/share/dev.errorsignal.Waystone/`
pub fn data_dir(custom: Option<&PathBuf>) -> Result<PathBuf> {
    let dir = match custom {
        Some(dir) => dir.clone(),
        None => ProjectDirs::from("dev", "errorsignal", "Waystone")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| anyhow!("could not determine data directory"))?,
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path of the persistent asset cache.
pub fn cache_path(custom: Option<&PathBuf>) -> Result<PathBuf> {
    Ok(data_dir(custom)?.join(CACHE_FILENAME))
}

fn mode_path(custom: Option<&PathBuf>) -> Result<PathBuf> {
    // The store key doubles as the file name, colon replaced for
    // filesystem friendliness.
    Ok(data_dir(custom)?.join(MODE_STORE_KEY.replace(':', "-")))
}

/// Loads the persisted mode, defaulting to lexical.
pub fn load_mode(custom: Option<&PathBuf>) -> SearchMode {
    mode_path(custom)
        .ok()
        .and_then(|p| std::fs::read_to_string(p).ok())
        .map(|s| SearchMode::from_str_or_default(s.trim()))
        .unwrap_or(SearchMode::Lexical)
}

/// Persists the mode for the next invocation.
pub fn save_mode(custom: Option<&PathBuf>, mode: SearchMode) {
    if let Ok(path) = mode_path(custom) {
        let _ = std::fs::write(path, mode.as_str());
    }
}
