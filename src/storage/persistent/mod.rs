//! Persistent storage backend.
//!
//! A single snapshot file holds every reminder. Each mutation rewrites the
//! snapshot into a temporary file and renames it over the previous one, so a
//! crash leaves either the old or the new snapshot on disk, never a mix.
//!
//! ```text
//! reminders.geof
//! ┌──────────────┬────────┬─────────────┬───────────────┬───────────────┐
//! │ magic "GEOF" │ format │ len: u32 LE │ crc32: u32 LE │ JSON snapshot │
//! └──────────────┴────────┴─────────────┴───────────────┴───────────────┘
//! ```

mod codec;
mod store;

pub use store::FileReminderStore;

use std::path::Path;

use crate::storage::StorageError;

/// Configuration for persistent storage.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// Whether to fsync after every write (slower but safer).
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self { sync_on_write: true }
    }
}

/// Open or create a reminder snapshot file.
///
/// # Errors
/// - If the parent directory cannot be created or accessed
/// - If an existing snapshot is corrupted
///
/// # Example
/// ```rust,ignore
/// use geofence::storage::persistent::open_reminder_store;
///
/// let store = open_reminder_store("./reminders.geof", None)?;
/// ```
pub fn open_reminder_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> Result<FileReminderStore, StorageError> {
    FileReminderStore::open(path.as_ref(), config.unwrap_or_default())
}
