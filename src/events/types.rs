//! Event and subscription types published by the engine.
//!
//! Every subscriber receives its own clone of each event; events are
//! immutable snapshots and carry no handle back into engine state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::AuthorizationState;
use crate::notify::DomainNotification;
use crate::reconcile::PendingReason;
use crate::region::RegionId;
use crate::reminder::{Reminder, ReminderId};

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A change to the stored reminder list.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderChange {
    Created { reminder: Reminder },
    Toggled { id: ReminderId, is_active: bool },
    Deleted { id: ReminderId },
}

/// User-facing conditions the UI should surface.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Advisory {
    /// Only foreground permission; geofences will not fire in the background.
    BackgroundDeliveryUnavailable,
    /// Monitoring is suppressed until the user grants "always" permission.
    AuthorizationRequired { state: AuthorizationState },
    /// Some active reminders have no registered region.
    RegistrationPending { pending: BTreeMap<RegionId, PendingReason> },
}

impl Advisory {
    /// Returns true if the advisory should block interaction until resolved.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::AuthorizationRequired { state } if state.is_blocked())
    }
}

/// Events published to subscribers.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RemindersChanged { change: ReminderChange },
    GeofenceCrossed { notification: DomainNotification },
    AuthorizationChanged {
        previous: AuthorizationState,
        current: AuthorizationState,
    },
    /// Registered region set after a reconcile pass that changed it.
    RegionsChanged { registered: Vec<RegionId> },
    Advisory { advisory: Advisory },
}

impl EngineEvent {
    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::RemindersChanged { .. } => EventKind::RemindersChanged,
            Self::GeofenceCrossed { .. } => EventKind::GeofenceCrossed,
            Self::AuthorizationChanged { .. } => EventKind::AuthorizationChanged,
            Self::RegionsChanged { .. } => EventKind::RegionsChanged,
            Self::Advisory { .. } => EventKind::Advisory,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RemindersChanged,
    GeofenceCrossed,
    AuthorizationChanged,
    RegionsChanged,
    Advisory,
}

/// Selects which event kinds a subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    kinds: Option<Vec<EventKind>>,
}

impl EventFilter {
    /// Every event.
    #[must_use]
    pub const fn all() -> Self {
        Self { kinds: None }
    }

    /// Only the listed kinds.
    #[must_use]
    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    /// Returns true if `event` passes the filter.
    #[must_use]
    pub fn matches(&self, event: &EngineEvent) -> bool {
        self.kinds.as_ref().map_or(true, |k| k.contains(&event.kind()))
    }
}
