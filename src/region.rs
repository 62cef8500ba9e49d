//! Monitored regions and raw crossing events.
//!
//! These are runtime-only projections of reminders. Nothing here is
//! persisted by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reminder::{Coordinate, Reminder, ReminderId};

/// Identifier of a monitored region.
///
/// A region is always registered under the id of the reminder it projects,
/// which keeps the reminder/region mapping bijective.
pub type RegionId = ReminderId;

/// A circular region registered with the region monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredRegion {
    pub id: RegionId,
    pub center: Coordinate,
    /// Radius in meters.
    pub radius: f64,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
}

impl MonitoredRegion {
    /// Projects a reminder onto the region that monitors it.
    #[must_use]
    pub fn from_reminder(reminder: &Reminder) -> Self {
        Self {
            id: reminder.id,
            center: reminder.coordinate(),
            radius: reminder.radius,
            notify_on_entry: true,
            notify_on_exit: true,
        }
    }

    /// Returns true if the point lies inside (or on) the boundary.
    #[must_use]
    pub fn contains(&self, point: &Coordinate) -> bool {
        self.center.distance_to(point) <= self.radius
    }
}

/// Direction of a boundary crossing as reported by the monitor.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingKind {
    Enter,
    Exit,
}

/// A raw crossing callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub region_id: RegionId,
    pub kind: CrossingKind,
    pub observed_at: DateTime<Utc>,
}

impl CrossingEvent {
    /// Creates an event observed now.
    #[must_use]
    pub fn now(region_id: RegionId, kind: CrossingKind) -> Self {
        Self {
            region_id,
            kind,
            observed_at: Utc::now(),
        }
    }
}
