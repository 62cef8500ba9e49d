//! Reminder storage.
//!
//! The `ReminderStore` trait is the only way the engine touches persisted
//! reminders. Two backends ship with the crate: an in-memory store and, with
//! the `persistent` feature, a snapshot-file store.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryReminderStore;
pub use traits::{ReminderStore, StorageError};

#[cfg(feature = "persistent")]
pub use persistent::{open_reminder_store, FileReminderStore, PersistentConfig};
