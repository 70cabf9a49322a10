use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing::debug;

/// Whether `entry` is already listed in `<workspace>/.gitignore`
///
/// # Errors
///
/// This function will return an error if an existing `.gitignore` can not be read
pub fn is_ignored(workspace: &Utf8Path, entry: &str) -> Result<bool> {
    let path = workspace.join(".gitignore");
    if !path.exists() {
        return Ok(false);
    }
    let contents = fs::read_to_string(&path).context(format!("Failed reading {path}"))?;
    let wanted = entry.trim_start_matches('/');

    Ok(contents
        .lines()
        .map(str::trim)
        .any(|line| line.trim_start_matches('/') == wanted))
}

/// Appends `entry` to `<workspace>/.gitignore`, returns `false` if it was already present
///
/// # Errors
///
/// This function will return an error if `.gitignore` can not be read or written
pub fn add_entry(workspace: &Utf8Path, entry: &str) -> Result<bool> {
    if is_ignored(workspace, entry)? {
        debug!("{entry} already ignored");
        return Ok(false);
    }

    let path = workspace.join(".gitignore");
    let mut contents = if path.exists() {
        fs::read_to_string(&path).context(format!("Failed reading {path}"))?
    } else {
        String::new()
    };
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(entry);
    contents.push('\n');

    fs::write(&path, contents).context(format!("Failed writing {path}"))?;
    Ok(true)
}
