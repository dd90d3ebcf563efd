//! Text lists: one path per line

use std::path::{Path, PathBuf};

use crate::error::ChordError;

/// Load a text list of paths, skipping blank lines
///
/// # Errors
///
/// Returns `MissingInputFile` if `path` does not exist
pub fn load_textlist(path: &Path) -> Result<Vec<PathBuf>, ChordError> {
    if !path.exists() {
        return Err(ChordError::MissingInputFile(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}
