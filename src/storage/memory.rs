//! In-memory storage backend.
//!
//! Thread-safe implementation of `ReminderStore`, intended for embedded
//! usage, tests, and as a reference implementation. It can also be told to
//! fail on demand so callers can exercise their storage-failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use crate::reminder::{NewReminder, Reminder, ReminderId};
use crate::storage::traits::{ReminderStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct ReminderState {
    by_id: HashMap<ReminderId, Reminder>,
    /// Insertion order; creation timestamps can tie at clock resolution.
    order: Vec<ReminderId>,
}

/// In-memory reminder store.
#[derive(Debug, Default)]
pub struct InMemoryReminderStore {
    state: RwLock<ReminderState>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryReminderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail with a backend error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Insert a fully-formed record (e.g. restored from elsewhere).
    pub fn insert(&self, reminder: Reminder) -> Result<(), StorageError> {
        self.check_writes()?;
        let mut state = self.state.write().map_err(|_| lock_err("reminders.insert"))?;
        if state.by_id.contains_key(&reminder.id) {
            return Err(StorageError::DuplicateKey(reminder.id.to_string()));
        }
        state.order.push(reminder.id);
        state.by_id.insert(reminder.id, reminder);
        Ok(())
    }

    /// Number of stored reminders.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("reminders.len"))?;
        Ok(state.by_id.len())
    }

    /// Returns true if no reminders are stored.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    fn check_writes(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::BackendError("write failure injected".to_string()));
        }
        Ok(())
    }

    fn check_reads(&self) -> Result<(), StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::BackendError("read failure injected".to_string()));
        }
        Ok(())
    }
}

impl ReminderStore for InMemoryReminderStore {
    fn create(&self, draft: NewReminder) -> Result<Reminder, StorageError> {
        self.check_writes()?;
        let reminder = draft.into_reminder(Utc::now());
        let mut state = self.state.write().map_err(|_| lock_err("reminders.create"))?;
        state.order.push(reminder.id);
        state.by_id.insert(reminder.id, reminder.clone());
        Ok(reminder)
    }

    fn fetch_all(&self) -> Result<Vec<Reminder>, StorageError> {
        self.check_reads()?;
        let state = self.state.read().map_err(|_| lock_err("reminders.fetch_all"))?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.by_id.get(id).cloned())
            .collect())
    }

    fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        self.check_reads()?;
        let state = self.state.read().map_err(|_| lock_err("reminders.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn update(&self, id: ReminderId, is_active: bool) -> Result<bool, StorageError> {
        self.check_writes()?;
        let mut state = self.state.write().map_err(|_| lock_err("reminders.update"))?;
        let Some(existing) = state.by_id.get_mut(&id) else {
            return Ok(false);
        };
        existing.is_active = is_active;
        Ok(true)
    }

    fn delete(&self, id: ReminderId) -> Result<bool, StorageError> {
        self.check_writes()?;
        let mut state = self.state.write().map_err(|_| lock_err("reminders.delete"))?;
        if state.by_id.remove(&id).is_none() {
            return Ok(false);
        }
        state.order.retain(|x| *x != id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> NewReminder {
        NewReminder {
            location_id: name.to_lowercase(),
            name: name.to_string(),
            latitude: 37.33,
            longitude: -122.0,
            radius: 120.0,
            category: "Test".to_string(),
            note: String::new(),
        }
    }

    #[test]
    fn create_fetch_update_delete() {
        let store = InMemoryReminderStore::new();
        let a = store.create(draft("A")).unwrap();
        let b = store.create(draft("B")).unwrap();
        assert!(a.is_active);

        let all = store.fetch_all().unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a.id, b.id]);

        assert!(store.update(a.id, false).unwrap());
        assert!(!store.get(a.id).unwrap().unwrap().is_active);

        assert!(store.delete(a.id).unwrap());
        assert!(store.get(a.id).unwrap().is_none());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn missing_ids_report_false() {
        let store = InMemoryReminderStore::new();
        assert!(!store.update(ReminderId::new(), true).unwrap());
        assert!(!store.delete(ReminderId::new()).unwrap());
    }

    #[test]
    fn injected_write_failure_leaves_state_unchanged() {
        let store = InMemoryReminderStore::new();
        store.set_fail_writes(true);
        assert!(matches!(store.create(draft("A")), Err(StorageError::BackendError(_))));
        store.set_fail_writes(false);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn insert_rejects_duplicates() {
        let store = InMemoryReminderStore::new();
        let r = draft("A").into_reminder(Utc::now());
        store.insert(r.clone()).unwrap();
        assert!(matches!(store.insert(r), Err(StorageError::DuplicateKey(_))));
    }
}
