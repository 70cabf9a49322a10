//! Locating `.env` files for the runtime CLI's `--dotenv` flag.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

use crate::launch::DotenvSetting;

fn has_dotenv_file(dir: &Utf8Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let entries = fs::read_dir(dir).context(format!("Failed reading directory {dir}"))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(".env") && entry.path().is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Walks up from `start` to `stop` (inclusive) and returns the first directory
/// containing a `.env*` file
///
/// # Errors
///
/// This function will return an error if a directory on the way can not be read
pub fn find_nearest_dotenv_dir(stop: &Utf8Path, start: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        if !current.starts_with(stop) {
            break;
        }
        if has_dotenv_file(current)? {
            return Ok(Some(current.to_path_buf()));
        }
        if current == stop {
            break;
        }
        dir = current.parent();
    }
    Ok(None)
}

/// Resolves a configured dotenv directory against the workspace, returns it only if
/// it contains a `.env*` file
///
/// # Errors
///
/// This function will return an error if the directory can not be read
pub fn validate_dotenv_path(workspace: &Utf8Path, path: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    };

    if has_dotenv_file(&resolved)? {
        Ok(Some(resolved))
    } else {
        Ok(None)
    }
}

impl DotenvSetting {
    /// Directory to hand to the runtime CLI, if any
    ///
    /// # Errors
    ///
    /// This function will return an error if the directories involved can not be read
    pub fn locate(&self, workspace: &Utf8Path, start: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
        match self {
            DotenvSetting::Enabled(false) => Ok(None),
            DotenvSetting::Enabled(true) => find_nearest_dotenv_dir(workspace, start),
            DotenvSetting::Path(path) => validate_dotenv_path(workspace, path),
        }
    }
}
