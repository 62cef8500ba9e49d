//! Abstract reminder storage.
//!
//! The engine never owns durability. It talks to a store through this narrow
//! CRUD contract, which lets hosts plug in whatever database they already
//! have and lets tests use the in-memory backend.

use thiserror::Error;

use crate::reminder::{NewReminder, Reminder, ReminderId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Stored data failed an integrity check.
    #[error("Corrupted data: {0}")]
    Corrupted(String),
}

/// Storage trait for reminder records.
///
/// All operations are synchronous and authoritative: once a call returns
/// `Ok`, the change is durable as far as the backend is concerned.
pub trait ReminderStore: Send + Sync {
    /// Persist a new reminder. The store assigns the id and creation time;
    /// new reminders start active.
    fn create(&self, draft: NewReminder) -> Result<Reminder, StorageError>;

    /// All reminders, ordered by creation time (oldest first).
    fn fetch_all(&self) -> Result<Vec<Reminder>, StorageError>;

    /// Get one reminder by id.
    fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        Ok(self.fetch_all()?.into_iter().find(|r| r.id == id))
    }

    /// Set the active flag. Returns false if the reminder does not exist.
    fn update(&self, id: ReminderId, is_active: bool) -> Result<bool, StorageError>;

    /// Remove a reminder. Returns false if the reminder does not exist.
    fn delete(&self, id: ReminderId) -> Result<bool, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_reminder_store_object_safe(_: &dyn ReminderStore) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::DuplicateKey("abc".to_string());
        assert!(err.to_string().contains("Duplicate key"));

        let err = StorageError::BackendError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
