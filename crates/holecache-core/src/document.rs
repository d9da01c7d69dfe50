//! Self-describing JSON documents on disk.
//!
//! Reads never fail: a document that was never written, cannot be read, or no longer
//! parses is reported as absent. A later successful write replaces it, so corruption
//! heals itself on the next capture.
//!
//! Writes go to a temporary file in the target directory and are renamed into place,
//! so a crash mid-write leaves either the old document or the new one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Serialize `document` as JSON and commit it at `path`, creating parent directories.
pub fn write<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(document)
        .map_err(|e| Error::Storage(format!("Failed to serialize {}: {e}", path.display())))?;
    write_atomic(path, &json)
}

/// Read the document at `path`, or `None` when it is absent or unparsable.
pub fn read<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Treating unreadable document {} as absent: {e}", path.display());
            return None;
        },
    };

    match serde_json::from_slice(&bytes) {
        Ok(document) => Some(document),
        Err(e) => {
            warn!("Treating corrupt document {} as absent: {e}", path.display());
            None
        },
    }
}

/// Read the document at `path`, falling back to `T::default()`.
pub fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    read(path).unwrap_or_default()
}

/// Write `bytes` to `path` through a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Storage(format!("No parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| Error::Storage(format!("Failed to create {}: {e}", parent.display())))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|e| Error::Storage(format!("Failed to create temp file: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| Error::Storage(format!("Failed to write {}: {e}", path.display())))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::Storage(format!("Failed to sync {}: {e}", path.display())))?;
    tmp.persist(path)
        .map_err(|e| Error::Storage(format!("Failed to commit {}: {}", path.display(), e.error)))?;

    debug!("Committed {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
