//! Persistence collaborators for custom providers and the active selection.
//!
//! Each store is a trait so the engine can run against the JSON files used by
//! the CLI, an in-memory backend in tests, or anything an embedding
//! application supplies.

mod keychain;
mod provider_store;
mod selection_store;

pub use keychain::{InMemoryVault, KeychainSelectionStore, KeyringVault, SecretVault};
pub use provider_store::{InMemoryProviderStore, JsonProviderStore, ProviderStore};
pub use selection_store::{InMemorySelectionStore, JsonSelectionStore, SelectionStore};

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O failure while reading or writing a store file.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The OS keychain rejected a read or write.
    #[error("keychain error for {name}: {error}")]
    Keychain { name: String, error: String },
}

/// Write `bytes` to `path` through a temporary sibling file and a rename, so
/// readers never observe a half-written document.
///
/// On unix the temporary file is created with mode 0600 before anything is
/// written to it. It is removed again when any later step fails.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent_directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_directory)?;
    let temp_path = build_temp_path(parent_directory);

    let result = write_temp_file(&temp_path, bytes).and_then(|()| fs::rename(&temp_path, path));
    if let Err(error) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(error.into());
    }
    Ok(())
}

/// Move an unreadable store file aside so the next save cannot overwrite it.
///
/// The file is renamed to `<name>.bak`, replacing any earlier backup.
pub(crate) fn quarantine_unreadable(path: &Path) -> Result<PathBuf, StoreError> {
    let mut file_name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    file_name.push(".bak");
    let backup_path = path.with_file_name(file_name);
    fs::rename(path, &backup_path)?;
    Ok(backup_path)
}

fn write_temp_file(temp_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut temp_file = create_private_file(temp_path)?;
    temp_file.write_all(bytes)?;
    temp_file.sync_all()
}

fn build_temp_path(parent_directory: &Path) -> PathBuf {
    let process_identifier = std::process::id();
    let timestamp_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or_default();
    parent_directory.join(format!(".tether-store-{process_identifier}-{timestamp_nanos}.tmp"))
}

// Store files may hold API keys.
#[cfg(unix)]
fn create_private_file(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new().write(true).create_new(true).mode(0o600).open(path)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "tmp"))
            .collect()
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let dir = tempdir().unwrap();
        // A directory cannot be replaced by a file, so the rename fails.
        let target = dir.path().join("selection.json");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "x").unwrap();

        assert!(matches!(write_atomically(&target, b"{\"secret\":1}"), Err(StoreError::Io(_))));
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn temp_file_is_private_from_creation() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let temp_path = dir.path().join("fresh.tmp");
        let file = create_private_file(&temp_path).unwrap();
        let mode = file.metadata().unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn quarantine_keeps_the_unreadable_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("providers.json");
        fs::write(&path, "[oops,]").unwrap();
        let backup = quarantine_unreadable(&path).unwrap();
        assert_eq!(backup, dir.path().join("providers.json.bak"));
        assert_eq!(fs::read_to_string(backup).unwrap(), "[oops,]");
        assert!(!path.exists());
    }
}
