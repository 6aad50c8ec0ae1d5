//! Crash-safe file writes.
//!
//! Every write goes to a temp file in the target's directory and is then
//! renamed over the target, so an interrupted process leaves either the old
//! file or the new one, never a torn mix. Appends are realised as
//! read-existing + atomic rewrite; prior content is never truncated.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{PlaybookError, Result};

/// Read `path` as UTF-8, or `None` when it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PlaybookError::Io(e)),
    }
}

/// Read `path` as UTF-8; a missing file is [`PlaybookError::MissingInput`].
pub fn read_required(path: &Path) -> Result<String> {
    read_optional(path)?.ok_or_else(|| PlaybookError::MissingInput {
        path: path.to_path_buf(),
    })
}

/// Atomically replace `path` with `contents`, creating parent directories.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PlaybookError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Append `body` to `path`. When the file does not exist yet it is created
/// with `header` first. Returns `true` if the file was created.
pub fn append_atomic(path: &Path, header: &str, body: &str) -> Result<bool> {
    let existing = read_optional(path)?;
    let created = existing.is_none();
    let mut contents = existing.unwrap_or_else(|| header.to_string());
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(body);
    write_atomic(path, contents.as_bytes())?;
    Ok(created)
}
