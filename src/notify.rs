//! Local notifications for accepted crossings.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::reminder::{Reminder, ReminderId};

/// Domain meaning of an accepted crossing.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingDirection {
    Arrived,
    Departed,
}

/// A routed crossing, ready for the sink and for subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainNotification {
    pub direction: CrossingDirection,
    pub reminder: Reminder,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

impl DomainNotification {
    /// Human-readable text for the local notification.
    #[must_use]
    pub fn render(&self) -> Notification {
        let name = &self.reminder.name;
        let (title, body) = match self.direction {
            CrossingDirection::Arrived => (format!("Reminder: {name}"), format!("You've arrived at {name}")),
            CrossingDirection::Departed => (format!("Left Area: {name}"), format!("You've left {name}")),
        };
        Notification {
            reminder_id: self.reminder.id,
            title,
            body,
        }
    }
}

/// Title/body pair handed to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub reminder_id: ReminderId,
    pub title: String,
    pub body: String,
}

/// Errors raised by a notification sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notifications not permitted")]
    NotPermitted,

    #[error("sink rejected notification: {0}")]
    Rejected(String),
}

/// Delivers local notifications. Fire-and-forget: implementations must not
/// block on user interaction.
pub trait NotificationSink: Send + Sync {
    /// Shows `notification` to the user.
    fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Sink that only logs. Useful for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            reminder_id = %notification.reminder_id,
            title = %notification.title,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

/// Sink that keeps every delivered notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications delivered so far, in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        let mut guard = self
            .delivered
            .lock()
            .map_err(|_| NotificationError::Rejected("poisoned lock".to_string()))?;
        guard.push(notification.clone());
        Ok(())
    }
}
