//! The geofence engine.
//!
//! `GeofenceEngine` is the entry point for hosts. Mutations go to the
//! reminder store synchronously on the caller's thread; everything that
//! touches region registrations is handed to a dedicated worker thread,
//! which also consumes the region monitor's callbacks and runs a periodic
//! resync.
//!
//! ```rust,ignore
//! let monitor = Arc::new(SimulatedRegionMonitor::with_authorization(20, AuthorizationState::Always));
//! let engine = GeofenceEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(InMemoryReminderStore::new()),
//!     monitor.clone(),
//!     Arc::new(LogSink),
//! )?;
//! monitor.attach(engine.callbacks());
//!
//! let reminder = engine.create_reminder_for_point(&builtin_points_of_interest()[0], 100.0, "")?;
//! engine.sync()?;
//! ```

mod config;
mod worker;

pub use config::EngineConfig;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::{CallbackSender, RegionMonitor};
use crate::authorization::{AuthorizationMachine, AuthorizationState};
use crate::error::{GeofenceError, GeofenceResult};
use crate::events::{EngineEvent, EventBus, EventFilter, ReminderChange, Subscription};
use crate::notify::NotificationSink;
use crate::poi::PointOfInterest;
use crate::reconcile::{PendingReason, Reconciler};
use crate::region::RegionId;
use crate::reminder::{NewReminder, Reminder, ReminderId};
use crate::router::{CrossingRouter, LastCrossing};
use crate::storage::ReminderStore;

use worker::{read, write, Control, Shared, Worker};

/// Counters describing what the engine has done since it started.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub reconcile_passes: u64,
    pub reconcile_failures: u64,
    pub crossings_received: u64,
    pub crossings_accepted: u64,
    pub duplicates_dropped: u64,
    pub stale_dropped: u64,
    pub notifications_failed: u64,
    /// Events a slow subscriber missed.
    pub events_dropped: u64,
}

/// Geofence monitoring engine.
pub struct GeofenceEngine {
    config: EngineConfig,
    store: Arc<dyn ReminderStore>,
    monitor: Arc<dyn RegionMonitor>,
    shared: Arc<Shared>,
    bus: EventBus,
    control_tx: Sender<Control>,
    callbacks: CallbackSender,
    join: Option<JoinHandle<()>>,
}

impl fmt::Debug for GeofenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeofenceEngine")
            .field("config", &self.config)
            .field("authorization", &self.authorization())
            .field("registered", &self.registered_regions().len())
            .finish_non_exhaustive()
    }
}

impl GeofenceEngine {
    /// Start an engine.
    ///
    /// The monitor's current authorization is fed in as the first callback
    /// and a startup reconcile is scheduled. Attach the monitor to
    /// `callbacks()` to receive its later callbacks.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ReminderStore>,
        monitor: Arc<dyn RegionMonitor>,
        sink: Arc<dyn NotificationSink>,
    ) -> GeofenceResult<Self> {
        Self::with_crossing_state(config, store, monitor, sink, Vec::new())
    }

    /// Start an engine with dedup state saved from a previous run
    /// (see `crossing_state`).
    pub fn with_crossing_state(
        config: EngineConfig,
        store: Arc<dyn ReminderStore>,
        monitor: Arc<dyn RegionMonitor>,
        sink: Arc<dyn NotificationSink>,
        crossing_state: Vec<LastCrossing>,
    ) -> GeofenceResult<Self> {
        config.validate()?;

        let reminders = store.fetch_all()?;
        let shared = Arc::new(Shared::new(reminders));
        let bus = EventBus::new(config.subscriber_capacity);

        let (control_tx, control_rx) = bounded::<Control>(config.control_queue_capacity);
        let (callback_tx, callback_rx) = bounded(config.callback_queue_capacity);

        let mut router = CrossingRouter::new(
            Arc::clone(&store),
            Arc::clone(&monitor),
            sink,
            config.dedup_window(),
        );
        router.restore(crossing_state);

        let worker = Worker {
            shared: Arc::clone(&shared),
            store: Arc::clone(&store),
            reconciler: Reconciler::new(Arc::clone(&monitor), config.region_capacity),
            router,
            machine: AuthorizationMachine::new(),
            bus: bus.clone(),
        };

        let resync = config.resync_interval();
        let join = thread::Builder::new()
            .name("geofence-engine".to_string())
            .spawn(move || worker.run(control_rx, callback_rx, resync))
            .map_err(|e| GeofenceError::internal(format!("failed to spawn engine worker: {e}")))?;

        let engine = Self {
            config,
            store,
            monitor,
            shared,
            bus,
            control_tx,
            callbacks: CallbackSender::new(callback_tx),
            join: Some(join),
        };

        engine.callbacks.authorization_changed(engine.monitor.authorization())?;
        engine.request_reconcile();
        info!(
            reminders = engine.reminders().len(),
            capacity = engine.monitor.capacity(),
            "geofence engine started"
        );
        Ok(engine)
    }

    /// Configuration the engine was started with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle for the region monitor's callbacks.
    #[must_use]
    pub fn callbacks(&self) -> CallbackSender {
        self.callbacks.clone()
    }

    /// Subscribe to engine events.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    /// Validate and store a new reminder, then schedule a reconcile.
    ///
    /// A storage failure is returned and nothing is registered.
    pub fn create_reminder(&self, draft: NewReminder) -> GeofenceResult<Reminder> {
        draft.validate()?;
        let reminder = self.store.create(draft)?;
        info!(reminder_id = %reminder.id, name = %reminder.name, "reminder created");

        self.refresh_snapshot();
        self.bus.publish(&EngineEvent::RemindersChanged {
            change: ReminderChange::Created {
                reminder: reminder.clone(),
            },
        });
        self.request_reconcile();
        Ok(reminder)
    }

    /// Create a reminder at a point of interest.
    pub fn create_reminder_for_point(
        &self,
        point: &PointOfInterest,
        radius: f64,
        note: impl Into<String>,
    ) -> GeofenceResult<Reminder> {
        self.create_reminder(NewReminder::for_point(point, radius, note))
    }

    /// Switch a reminder on or off.
    pub fn toggle_reminder(&self, id: ReminderId, is_active: bool) -> GeofenceResult<()> {
        if !self.store.update(id, is_active)? {
            return Err(GeofenceError::ReminderNotFound { id });
        }
        info!(reminder_id = %id, is_active, "reminder toggled");

        self.refresh_snapshot();
        self.bus.publish(&EngineEvent::RemindersChanged {
            change: ReminderChange::Toggled { id, is_active },
        });
        self.request_reconcile();
        Ok(())
    }

    /// Delete a reminder. Its region is unregistered by the next reconcile.
    pub fn delete_reminder(&self, id: ReminderId) -> GeofenceResult<()> {
        if !self.store.delete(id)? {
            return Err(GeofenceError::ReminderNotFound { id });
        }
        info!(reminder_id = %id, "reminder deleted");

        self.refresh_snapshot();
        self.bus.publish(&EngineEvent::RemindersChanged {
            change: ReminderChange::Deleted { id },
        });
        self.request_reconcile();
        Ok(())
    }

    fn refresh_snapshot(&self) {
        match self.store.fetch_all() {
            Ok(all) => *write(&self.shared.reminders) = Arc::new(all),
            Err(e) => warn!(error = %e, "could not refresh reminder snapshot"),
        }
    }

    /// Snapshot of all reminders, in creation order.
    #[must_use]
    pub fn reminders(&self) -> Arc<Vec<Reminder>> {
        Arc::clone(&read(&self.shared.reminders))
    }

    /// Looks up one reminder in the current snapshot.
    #[must_use]
    pub fn reminder(&self, id: ReminderId) -> Option<Reminder> {
        self.reminders().iter().find(|r| r.id == id).cloned()
    }

    /// The reminder created for a point of interest, if any.
    #[must_use]
    pub fn reminder_for_location(&self, location_id: &str) -> Option<Reminder> {
        self.reminders()
            .iter()
            .find(|r| r.location_id == location_id)
            .cloned()
    }

    /// Last permission level reported by the monitor.
    #[must_use]
    pub fn authorization(&self) -> AuthorizationState {
        *read(&self.shared.authorization)
    }

    /// Region ids registered as of the last reconcile pass.
    #[must_use]
    pub fn registered_regions(&self) -> BTreeSet<RegionId> {
        read(&self.shared.registered).clone()
    }

    /// Active reminders without a region, as of the last reconcile pass.
    #[must_use]
    pub fn pending_regions(&self) -> BTreeMap<RegionId, PendingReason> {
        read(&self.shared.pending).clone()
    }

    /// Counters since start.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.shared.stats.snapshot(self.bus.dropped_events())
    }

    /// Ask the user for background permission through the monitor.
    pub fn request_authorization(&self) {
        debug!(state = %self.authorization(), "requesting always authorization");
        self.monitor.request_always_authorization();
    }

    /// Schedule a reconcile. Requests made before the worker gets to it
    /// collapse into one pass.
    pub fn request_reconcile(&self) {
        if !self.shared.request_reconcile() {
            return;
        }
        match self.control_tx.try_send(Control::Reconcile) {
            // A full queue means the worker is busy and will see the flag.
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => warn!("engine worker gone; reconcile dropped"),
        }
    }

    /// Block until every callback queued so far has been handled and any
    /// requested reconcile has run.
    pub fn sync(&self) -> GeofenceResult<()> {
        let (reply, rx) = bounded(1);
        self.control(Control::Sync { reply })?;
        self.await_reply(&rx)
    }

    /// Dedup state of the crossing router, for carrying across restarts.
    pub fn crossing_state(&self) -> GeofenceResult<Vec<LastCrossing>> {
        let (reply, rx) = bounded(1);
        self.control(Control::CrossingState { reply })?;
        self.await_reply(&rx)
    }

    fn control(&self, msg: Control) -> GeofenceResult<()> {
        self.control_tx.send(msg).map_err(|_| GeofenceError::Disconnected {
            path: "engine_control".to_string(),
        })
    }

    fn await_reply<T>(&self, rx: &Receiver<T>) -> GeofenceResult<T> {
        let timeout = self.config.sync_timeout();
        rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => GeofenceError::Timeout {
                duration_ms: self.config.sync_timeout_ms,
            },
            RecvTimeoutError::Disconnected => GeofenceError::Disconnected {
                path: "engine_control".to_string(),
            },
        })
    }
}

impl Drop for GeofenceEngine {
    fn drop(&mut self) {
        // The worker only blocks on its own channels, so it sees this promptly.
        let _ = self.control_tx.send(Control::Shutdown);
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                warn!("engine worker panicked");
            }
        }
    }
}
