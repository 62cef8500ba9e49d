//! Snapshot-file reminder store.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use tracing::debug;

use crate::reminder::{NewReminder, Reminder, ReminderId};
use crate::storage::traits::{ReminderStore, StorageError};

use super::codec::Snapshot;
use super::PersistentConfig;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn io_err(context: &str, e: &std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::InvalidData {
        StorageError::Corrupted(format!("{context}: {e}"))
    } else {
        StorageError::BackendError(format!("{context}: {e}"))
    }
}

/// Sibling path the next snapshot is written to before being renamed.
fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Reminder store backed by a single CRC-checked snapshot file.
///
/// Reads are served from memory. Writes persist first and only then update
/// the in-memory copy, so a failed write leaves both unchanged.
#[derive(Debug)]
pub struct FileReminderStore {
    path: PathBuf,
    config: PersistentConfig,
    reminders: RwLock<Vec<Reminder>>,
}

impl FileReminderStore {
    /// Open the snapshot at `path`, creating an empty store if missing.
    pub fn open(path: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_err("create snapshot directory", &e))?;
            }
        }

        let reminders = match fs::read(path) {
            Ok(bytes) => {
                let snapshot = Snapshot::from_bytes(&bytes)?;
                debug!(
                    path = %path.display(),
                    count = snapshot.reminders.len(),
                    saved_at = %snapshot.saved_at,
                    "reminder snapshot loaded"
                );
                snapshot.reminders
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_err("open snapshot", &e)),
        };

        Ok(Self {
            path: path.to_path_buf(),
            config,
            reminders: RwLock::new(reminders),
        })
    }

    /// Location of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, reminders: &[Reminder]) -> Result<(), StorageError> {
        let bytes = Snapshot::new(reminders.to_vec()).to_bytes()?;

        let tmp = temporary_path(&self.path);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)
                .map_err(|e| io_err("create temporary snapshot", &e))?;
            file.write_all(&bytes).map_err(|e| io_err("write snapshot", &e))?;
            if self.config.sync_on_write {
                file.sync_all().map_err(|e| io_err("sync snapshot", &e))?;
            }
        }
        fs::rename(&tmp, &self.path).map_err(|e| io_err("replace snapshot", &e))?;
        Ok(())
    }

    /// Applies `mutate` to a copy, persists it, then publishes it.
    fn write_with<T>(
        &self,
        context: &'static str,
        mutate: impl FnOnce(&mut Vec<Reminder>) -> Option<T>,
    ) -> Result<Option<T>, StorageError> {
        let mut guard = self.reminders.write().map_err(|_| lock_err(context))?;
        let mut next = guard.clone();
        let Some(out) = mutate(&mut next) else {
            return Ok(None);
        };
        self.persist(&next)?;
        *guard = next;
        Ok(Some(out))
    }
}

impl ReminderStore for FileReminderStore {
    fn create(&self, draft: NewReminder) -> Result<Reminder, StorageError> {
        let reminder = draft.into_reminder(Utc::now());
        let created = reminder.clone();
        self.write_with("reminders.create", move |all| {
            all.push(reminder);
            Some(())
        })?;
        Ok(created)
    }

    fn fetch_all(&self) -> Result<Vec<Reminder>, StorageError> {
        let guard = self.reminders.read().map_err(|_| lock_err("reminders.fetch_all"))?;
        Ok(guard.clone())
    }

    fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        let guard = self.reminders.read().map_err(|_| lock_err("reminders.get"))?;
        Ok(guard.iter().find(|r| r.id == id).cloned())
    }

    fn update(&self, id: ReminderId, is_active: bool) -> Result<bool, StorageError> {
        let updated = self.write_with("reminders.update", |all| {
            let r = all.iter_mut().find(|r| r.id == id)?;
            r.is_active = is_active;
            Some(())
        })?;
        Ok(updated.is_some())
    }

    fn delete(&self, id: ReminderId) -> Result<bool, StorageError> {
        let deleted = self.write_with("reminders.delete", |all| {
            let idx = all.iter().position(|r| r.id == id)?;
            all.remove(idx);
            Some(())
        })?;
        Ok(deleted.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    fn draft(name: &str) -> NewReminder {
        NewReminder {
            location_id: name.to_string(),
            name: name.to_string(),
            latitude: 10.0,
            longitude: 20.0,
            radius: 50.0,
            category: "Test".to_string(),
            note: "n".to_string(),
        }
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempdir().unwrap();
        let store = FileReminderStore::open(&dir.path().join("r.geof"), PersistentConfig::default()).unwrap();
        assert!(store.fetch_all().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn no_op_update_does_not_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.geof");
        let store = FileReminderStore::open(&path, PersistentConfig::default()).unwrap();
        assert!(!store.update(ReminderId::new(), false).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn writes_leave_no_temporary_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.geof");
        let store = FileReminderStore::open(&path, PersistentConfig { sync_on_write: false }).unwrap();
        store.create(draft("a")).unwrap();
        assert!(path.exists());
        assert!(!temporary_path(&path).exists());
    }

    #[test]
    fn snapshot_named_tmp_is_not_written_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reminders.tmp");
        assert_ne!(temporary_path(&path), path);

        let store = FileReminderStore::open(&path, PersistentConfig { sync_on_write: false }).unwrap();
        store.create(draft("a")).unwrap();
        store.create(draft("b")).unwrap();
        drop(store);

        let reopened = FileReminderStore::open(&path, PersistentConfig::default()).unwrap();
        assert_eq!(reopened.fetch_all().unwrap().len(), 2);
        assert!(!temporary_path(&path).exists());
    }
}
