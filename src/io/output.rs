//! Output writing
//!
//! Files are written whole (create, write, close); parent directories are
//! created as needed.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::ChordError;

fn ensure_parent(path: &Path) -> Result<(), ChordError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write `value` as pretty-printed JSON (2-space indent)
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ChordError> {
    ensure_parent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Copy `src` to `dst`, creating the destination directory
pub fn copy_file(src: &Path, dst: &Path) -> Result<(), ChordError> {
    if !src.exists() {
        return Err(ChordError::MissingInputFile(src.display().to_string()));
    }
    ensure_parent(dst)?;
    std::fs::copy(src, dst)?;
    Ok(())
}
