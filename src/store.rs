//! JSON file persistence shared by the narrative tracker and the series manager.
//!
//! Files are written whole on every save. Writes go to a temp file in the
//! target directory that is then renamed over the target, so a crash leaves
//! either the old file or the new one. Concurrent writers from different
//! processes are not coordinated: the last rename wins.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from loading or saving state files.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PersistError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

/// Read and parse a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(value)?;
    atomic_write(path, content.as_bytes())?;
    Ok(())
}

/// Write `contents` to `path` through a temp file and a rename.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Move an unreadable file aside as `<name>.corrupt` so a fresh save does not
/// destroy it. Returns the backup path when the move succeeded.
pub fn quarantine(path: &Path) -> Option<PathBuf> {
    let mut name = path.file_name()?.to_os_string();
    name.push(".corrupt");
    let backup = path.with_file_name(name);
    match fs::rename(path, &backup) {
        Ok(()) => Some(backup),
        Err(e) => {
            warn!("Could not move {} aside: {}", path.display(), e);
            None
        }
    }
}
