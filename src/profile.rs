//! Profile files: a JSON array of `{"x": .., "y": .., "delay": ..}` objects and
//! nothing else.

use crate::{
    action::ClickAction,
    error::{ClickerError, FormatError, Result},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Extension offered by the save/load dialogs.
pub const PROFILE_EXTENSION: &str = "tiny";

pub fn save(path: &Path, actions: &[ClickAction]) -> Result<()> {
    let json = serde_json::to_string(actions).map_err(|e| ClickerError::Format {
        path: path.to_path_buf(),
        source: FormatError(e),
    })?;
    fs::write(path, json).map_err(|source| ClickerError::Io { path: path.to_path_buf(), source })?;
    tracing::info!("Profile saved to {} ({} clicks)", path.display(), actions.len());
    Ok(())
}

/// Reads a whole profile. Any malformed entry fails the entire load.
pub fn load(path: &Path) -> Result<Vec<ClickAction>> {
    let text = fs::read_to_string(path)
        .map_err(|source| ClickerError::Io { path: path.to_path_buf(), source })?;
    let actions: Vec<ClickAction> = serde_json::from_str(&text).map_err(|e| ClickerError::Format {
        path: path.to_path_buf(),
        source: FormatError(e),
    })?;
    tracing::info!("Loaded profile from {} ({} clicks)", path.display(), actions.len());
    Ok(actions)
}

/// Appends `.tiny` when the chosen file name has no extension.
pub fn with_default_extension(path: PathBuf) -> PathBuf {
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(PROFILE_EXTENSION)
    }
}
