use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use chrono::Utc;
use thiserror::Error;

use crate::model::Document;

/// Backup file names start with this prefix followed by a sortable
/// timestamp, so lexicographic order is chronological order
const BACKUP_PREFIX: &str = "snapshot-";

/// What can go wrong while loading or saving the document
#[derive(Debug, Error)]
pub enum PersistError {
    /// The document file exists but could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// File involved
        path: PathBuf,
        /// Underlying io error
        source: io::Error,
    },

    /// The document file could not be written
    #[error("failed to write {path}: {source}")]
    Write {
        /// File involved
        path: PathBuf,
        /// Underlying io error
        source: io::Error,
    },

    /// The file was read but is not a valid document
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying serde error
        source: serde_json::Error,
    },

    /// Serializing the in-memory document failed
    #[error("failed to serialize document: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Backup housekeeping failed
    #[error("backup handling failed: {0}")]
    Backup(#[source] io::Error),
}

/// Loads and saves the whole document as pretty-printed JSON, keeping a
/// capped set of timestamped backup snapshots next to it.
///
/// Save failures are reported to the caller and never treated as fatal;
/// the in-memory state stays usable for the rest of the session.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    /// Path of the live document
    data_path: PathBuf,
    /// Directory holding backup snapshots
    backup_dir: PathBuf,
}

impl DocumentStore {
    /// Create a store for the given document path and backup directory.
    #[must_use]
    pub fn new(data_path: PathBuf, backup_dir: PathBuf) -> Self {
        Self { data_path, backup_dir }
    }

    /// Path of the live document.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Load the persisted document.
    ///
    /// Returns `Ok(None)` on a first run (no file yet).
    ///
    /// # Errors
    ///
    /// `PersistError::Read` when the file exists but cannot be read,
    /// `PersistError::Parse` when it is not a valid document.
    pub fn load(&self) -> Result<Option<Document>, PersistError> {
        let contents = match fs::read_to_string(&self.data_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(PersistError::Read { path: self.data_path.clone(), source: err });
            }
        };
        let doc = serde_json::from_str(&contents)
            .map_err(|err| PersistError::Parse { path: self.data_path.clone(), source: err })?;
        Ok(Some(doc))
    }

    /// Persist the full document.
    ///
    /// The sequence is: prune old backups down to the cap, copy the
    /// current on-disk document into the backup directory, then overwrite
    /// the live file with the new document. With `max_backups == 0` no
    /// snapshot is taken at all.
    ///
    /// # Errors
    ///
    /// `Serialize`, `Backup` or `Write` depending on which step failed.
    /// A failure leaves the in-memory document untouched.
    pub fn save(&self, doc: &Document, max_backups: usize) -> Result<(), PersistError> {
        let serialized = serde_json::to_string_pretty(doc).map_err(PersistError::Serialize)?;

        if max_backups > 0 && self.data_path.exists() {
            self.backup_current(max_backups).map_err(PersistError::Backup)?;
        }

        fs::write(&self.data_path, serialized)
            .map_err(|err| PersistError::Write { path: self.data_path.clone(), source: err })
    }

    /// Backup snapshots on disk, newest first.
    ///
    /// # Errors
    ///
    /// `PersistError::Backup` when the backup directory cannot be listed.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>, PersistError> {
        let mut backups = self.backup_files().map_err(PersistError::Backup)?;
        backups.reverse();
        Ok(backups)
    }

    /// Load a backup snapshot for full replacement of the live document.
    ///
    /// # Errors
    ///
    /// `Read` or `Parse` for an unreadable or invalid snapshot.
    pub fn load_backup(&self, path: &Path) -> Result<Document, PersistError> {
        let contents = fs::read_to_string(path)
            .map_err(|err| PersistError::Read { path: path.to_path_buf(), source: err })?;
        serde_json::from_str(&contents)
            .map_err(|err| PersistError::Parse { path: path.to_path_buf(), source: err })
    }

    /// Copy the current on-disk document into the backup directory and
    /// prune the oldest snapshots beyond the cap.
    fn backup_current(&self, max_backups: usize) -> io::Result<()> {
        fs::create_dir_all(&self.backup_dir)?;

        // Prune to cap-1 so the new snapshot lands within the cap.
        let backups = self.backup_files()?;
        let keep = max_backups.saturating_sub(1);
        let excess = backups.len().saturating_sub(keep);
        for old in backups.iter().take(excess) {
            fs::remove_file(old)?;
        }

        let stamp = Utc::now().format("%Y%m%d-%H%M%S%3f");
        let name = format!("{BACKUP_PREFIX}{stamp}.json");
        fs::copy(&self.data_path, self.backup_dir.join(name))?;
        Ok(())
    }

    /// Backup snapshots on disk, oldest first.
    fn backup_files(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut backups: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".json"))
            })
            .collect();
        // Timestamped names sort chronologically.
        backups.sort();
        Ok(backups)
    }
}

#[cfg(test)]
mod tests {
    use super::DocumentStore;
    use crate::model::Document;

    /// Store rooted in a fresh scratch directory.
    #[allow(clippy::expect_used)]
    fn scratch_store() -> (tempfile::TempDir, DocumentStore) {
        let dir = tempfile::tempdir().expect("scratch dir");
        let store =
            DocumentStore::new(dir.path().join("catalog.json"), dir.path().join("backups"));
        (dir, store)
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn first_run_loads_nothing() {
        let (_dir, store) = scratch_store();
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn save_then_load_round_trips() {
        let (_dir, store) = scratch_store();
        let mut doc = Document::default();
        doc.categories.push("Poetry".to_string());

        store.save(&doc, 10).expect("save");
        let loaded = store.load().expect("load").expect("document present");
        assert!(loaded.categories.iter().any(|c| c == "Poetry"));
        assert_eq!(loaded.settings, doc.settings);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn garbage_on_disk_is_a_parse_error() {
        let (dir, store) = scratch_store();
        std::fs::write(dir.path().join("catalog.json"), b"not json").expect("write");
        assert!(store.load().is_err());
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn first_save_takes_no_backup() {
        let (_dir, store) = scratch_store();
        store.save(&Document::default(), 10).expect("save");
        assert!(store.list_backups().expect("list").is_empty());
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn rotation_caps_the_snapshot_count() {
        let (_dir, store) = scratch_store();
        let doc = Document::default();
        // Nine saves: the first has nothing to back up, the rest each take
        // a snapshot of the previous file.
        for _ in 0..9 {
            store.save(&doc, 3).expect("save");
            // Keep timestamps distinct at millisecond resolution.
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let backups = store.list_backups().expect("list");
        assert_eq!(backups.len(), 3);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn zero_cap_disables_backups() {
        let (_dir, store) = scratch_store();
        let doc = Document::default();
        store.save(&doc, 0).expect("save");
        store.save(&doc, 0).expect("save");
        assert!(store.list_backups().expect("list").is_empty());
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn restore_returns_the_older_document() {
        let (_dir, store) = scratch_store();
        let mut doc = Document::default();
        doc.categories.push("Old".to_string());
        store.save(&doc, 10).expect("save old");

        doc.categories.push("New".to_string());
        store.save(&doc, 10).expect("save new");

        let backups = store.list_backups().expect("list");
        let newest = backups.first().expect("one snapshot");
        let restored = store.load_backup(newest).expect("restore");
        assert!(restored.categories.iter().any(|c| c == "Old"));
        assert!(!restored.categories.iter().any(|c| c == "New"));
    }
}
