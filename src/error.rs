//! Error types for the geofence engine.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. Only storage and validation failures are meant to
//! reach the user directly; everything else is recovered inside the engine
//! and surfaced as an advisory or a log line.

use thiserror::Error;

use crate::authorization::AuthorizationState;
use crate::notify::NotificationError;
use crate::region::RegionId;
use crate::reminder::ReminderId;
use crate::storage::StorageError;

/// Validation errors raised before anything is persisted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Radius {radius}m is out of range (0, {max}]")]
    RadiusOutOfRange { radius: f64, max: f64 },

    #[error("Latitude {value} is out of range [-90, 90]")]
    LatitudeOutOfRange { value: f64 },

    #[error("Longitude {value} is out of range [-180, 180]")]
    LongitudeOutOfRange { value: f64 },

    #[error("Required field '{field}' is missing")]
    MissingField { field: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong { field: String, max_length: usize },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Top-level error type for the engine.
#[derive(Debug, Error)]
pub enum GeofenceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Create/update/delete/fetch failed in the reminder store.
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Reminder not found: {id}")]
    ReminderNotFound { id: ReminderId },

    /// The region monitor rejected a region.
    #[error("Region {region_id} registration failed: {reason}")]
    RegionRegistration { region_id: RegionId, reason: String },

    /// Monitoring attempted without `Always` permission.
    #[error("Monitoring requires Always authorization (current: {state})")]
    AuthorizationInsufficient { state: AuthorizationState },

    #[error("Notification delivery failed: {0}")]
    NotificationDelivery(#[from] NotificationError),

    /// A callback referenced a region with no matching reminder.
    #[error("Stale region reference: {region_id}")]
    StaleRegionReference { region_id: RegionId },

    #[error("Channel disconnected: {path}")]
    Disconnected { path: String },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GeofenceError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a registration failure for a region.
    #[must_use]
    pub fn registration(region_id: RegionId, reason: impl Into<String>) -> Self {
        Self::RegionRegistration {
            region_id,
            reason: reason.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage failure.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if the error should be shown to the user as a blocking
    /// failure of the operation they requested.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Storage(_) | Self::ReminderNotFound { .. }
        )
    }

    /// Returns true if the engine retries this on the next trigger.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::ReminderNotFound { .. } | Self::Internal { .. } => false,
            Self::StaleRegionReference { .. } => false,
            Self::Storage(_)
            | Self::RegionRegistration { .. }
            | Self::AuthorizationInsufficient { .. }
            | Self::NotificationDelivery(_)
            | Self::Timeout { .. } => true,
            Self::Disconnected { .. } => false,
        }
    }
}

/// Result type alias for engine operations.
pub type GeofenceResult<T> = Result<T, GeofenceError>;
