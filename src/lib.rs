//! # geofence - Location-based reminder monitoring
//!
//! Keeps an operating system's bounded set of monitored circular regions in
//! line with a user's stored location reminders, and turns the system's
//! boundary-crossing callbacks into deduplicated notifications.
//!
//! ## Core Concepts
//!
//! - **Reminder**: a stored geofence (center, radius, note) that can be switched on or off
//! - **Region**: the runtime registration of one active reminder with the region monitor
//! - **Reconciliation**: aligning registered regions with the desired set under capacity
//!   and permission limits
//! - **Crossing**: an Enter or Exit callback, routed to an Arrived or Departed notification
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use geofence::{
//!     AuthorizationState, EngineConfig, GeofenceEngine, InMemoryReminderStore, LogSink,
//!     SimulatedRegionMonitor, builtin_points_of_interest,
//! };
//!
//! let monitor = Arc::new(SimulatedRegionMonitor::with_authorization(20, AuthorizationState::Always));
//! let engine = GeofenceEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(InMemoryReminderStore::new()),
//!     monitor.clone(),
//!     Arc::new(LogSink),
//! )?;
//! monitor.attach(engine.callbacks());
//!
//! let park = &builtin_points_of_interest()[0];
//! engine.create_reminder_for_point(park, 100.0, "say hi")?;
//! engine.sync()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Domain types
pub mod authorization;
pub mod error;
pub mod notify;
pub mod poi;
pub mod region;
pub mod reminder;

// Collaborators
pub mod adapter;
pub mod storage;

// Engine
pub mod engine;
pub mod events;
pub mod logging;
pub mod reconcile;
pub mod router;

pub use adapter::{AdapterCallback, CallbackSender, RegionMonitor, SimulatedRegionMonitor, DEFAULT_REGION_CAPACITY};
pub use authorization::{AuthorizationEffect, AuthorizationMachine, AuthorizationState, AuthorizationTransition};
pub use engine::{EngineConfig, EngineStats, GeofenceEngine};
pub use error::{GeofenceError, GeofenceResult, ValidationError};
pub use events::{Advisory, EngineEvent, EventFilter, EventKind, ReminderChange, Subscription};
pub use notify::{
    CrossingDirection, DomainNotification, LogSink, Notification, NotificationError, NotificationSink, RecordingSink,
};
pub use poi::{builtin_points_of_interest, load_points_of_interest, parse_points_of_interest, PointOfInterest, PointSource};
pub use reconcile::{PendingReason, ReconcilePlan, ReconcileReport, Reconciler};
pub use region::{CrossingEvent, CrossingKind, MonitoredRegion, RegionId};
pub use reminder::{Coordinate, NewReminder, Reminder, ReminderId};
pub use router::{CrossingRouter, LastCrossing, RouteOutcome};
pub use storage::{InMemoryReminderStore, ReminderStore, StorageError};

#[cfg(feature = "persistent")]
pub use storage::{open_reminder_store, FileReminderStore, PersistentConfig};
