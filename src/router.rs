//! Crossing event routing.
//!
//! Turns raw crossing callbacks into domain notifications: resolves the
//! region to its reminder, drops stale and duplicate callbacks, and hands
//! accepted crossings to the notification sink.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::RegionMonitor;
use crate::notify::{CrossingDirection, DomainNotification, Notification, NotificationSink};
use crate::region::{CrossingEvent, CrossingKind, RegionId};
use crate::storage::ReminderStore;

/// Last accepted crossing for a region.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCrossing {
    pub region_id: RegionId,
    pub kind: CrossingKind,
    pub observed_at: DateTime<Utc>,
}

/// What the router did with one callback.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Accepted and handed to the sink. `delivered` is false if the sink failed.
    Accepted {
        notification: DomainNotification,
        delivered: bool,
    },
    /// Same kind as the previous accepted crossing, inside the dedup window.
    Duplicate,
    /// No reminder exists for the region; it was unregistered.
    Stale,
    /// The reminder exists but is switched off.
    Inactive,
    /// The store could not be read.
    Unresolved(String),
}

impl RouteOutcome {
    /// The notification, if the crossing was accepted.
    #[must_use]
    pub fn notification(&self) -> Option<&DomainNotification> {
        match self {
            Self::Accepted { notification, .. } => Some(notification),
            _ => None,
        }
    }
}

/// Routes crossing callbacks. Owned by a single thread.
pub struct CrossingRouter {
    store: Arc<dyn ReminderStore>,
    monitor: Arc<dyn RegionMonitor>,
    sink: Arc<dyn NotificationSink>,
    dedup_window: chrono::Duration,
    last: HashMap<RegionId, LastCrossing>,
}

impl fmt::Debug for CrossingRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossingRouter")
            .field("dedup_window", &self.dedup_window)
            .field("tracked_regions", &self.last.len())
            .finish_non_exhaustive()
    }
}

impl CrossingRouter {
    /// Crossings of the same kind closer together than `dedup_window` are dropped.
    #[must_use]
    pub fn new(
        store: Arc<dyn ReminderStore>,
        monitor: Arc<dyn RegionMonitor>,
        sink: Arc<dyn NotificationSink>,
        dedup_window: Duration,
    ) -> Self {
        let dedup_window =
            chrono::Duration::from_std(dedup_window).unwrap_or_else(|_| chrono::Duration::milliseconds(i64::MAX));
        Self {
            store,
            monitor,
            sink,
            dedup_window,
            last: HashMap::new(),
        }
    }

    /// Routes one callback and reports what happened.
    pub fn route(&mut self, event: &CrossingEvent) -> RouteOutcome {
        let region_id = event.region_id;

        let reminder = match self.store.get(region_id) {
            Ok(Some(reminder)) => reminder,
            Ok(None) => {
                warn!(region_id = %region_id, "crossing for unknown region; unregistering");
                if let Err(e) = self.monitor.stop_monitoring(region_id) {
                    warn!(region_id = %region_id, error = %e, "failed to unregister stale region");
                }
                self.forget(region_id);
                return RouteOutcome::Stale;
            }
            Err(e) => {
                warn!(region_id = %region_id, error = %e, "could not resolve crossing region");
                return RouteOutcome::Unresolved(e.to_string());
            }
        };

        if !reminder.is_active {
            debug!(reminder_id = %reminder.id, "crossing for inactive reminder ignored");
            return RouteOutcome::Inactive;
        }

        if let Some(prev) = self.last.get(&region_id) {
            if prev.kind == event.kind && event.observed_at - prev.observed_at < self.dedup_window {
                debug!(region_id = %region_id, kind = ?event.kind, "duplicate crossing dropped");
                return RouteOutcome::Duplicate;
            }
        }

        self.last.insert(
            region_id,
            LastCrossing {
                region_id,
                kind: event.kind,
                observed_at: event.observed_at,
            },
        );

        let direction = match event.kind {
            CrossingKind::Enter => CrossingDirection::Arrived,
            CrossingKind::Exit => CrossingDirection::Departed,
        };
        let notification = DomainNotification {
            direction,
            reminder,
            observed_at: event.observed_at,
        };
        info!(reminder_id = %notification.reminder.id, direction = ?direction, "crossing accepted");

        let delivered = self.deliver(&notification.render());
        RouteOutcome::Accepted { notification, delivered }
    }

    /// Routes one callback, returning the domain notification if accepted.
    pub fn handle(&mut self, event: &CrossingEvent) -> Option<DomainNotification> {
        match self.route(event) {
            RouteOutcome::Accepted { notification, .. } => Some(notification),
            _ => None,
        }
    }

    fn deliver(&self, notification: &Notification) -> bool {
        match self.sink.deliver(notification) {
            Ok(()) => true,
            Err(e) => {
                warn!(reminder_id = %notification.reminder_id, error = %e, "notification delivery failed");
                false
            }
        }
    }

    /// Dedup state, ordered by region id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LastCrossing> {
        let mut out: Vec<LastCrossing> = self.last.values().copied().collect();
        out.sort_by(|a, b| a.region_id.cmp(&b.region_id));
        out
    }

    /// Replaces the dedup state.
    pub fn restore(&mut self, state: impl IntoIterator<Item = LastCrossing>) {
        self.last = state.into_iter().map(|c| (c.region_id, c)).collect();
    }

    /// Drops dedup state for one region.
    pub fn forget(&mut self, region_id: RegionId) {
        self.last.remove(&region_id);
    }

    /// Keeps dedup state only for the given regions.
    pub fn retain(&mut self, known: &BTreeSet<RegionId>) {
        self.last.retain(|id, _| known.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    use crate::adapter::SimulatedRegionMonitor;
    use crate::authorization::AuthorizationState;
    use crate::notify::{NotificationError, RecordingSink};
    use crate::region::MonitoredRegion;
    use crate::reminder::{NewReminder, Reminder};
    use crate::storage::InMemoryReminderStore;

    struct RejectingSink;

    impl NotificationSink for RejectingSink {
        fn deliver(&self, _: &Notification) -> Result<(), NotificationError> {
            Err(NotificationError::NotPermitted)
        }
    }

    struct Fixture {
        store: Arc<InMemoryReminderStore>,
        monitor: Arc<SimulatedRegionMonitor>,
        sink: Arc<RecordingSink>,
        router: CrossingRouter,
        reminder: Reminder,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryReminderStore::new());
        let monitor = Arc::new(SimulatedRegionMonitor::with_authorization(20, AuthorizationState::Always));
        let sink = Arc::new(RecordingSink::new());
        let reminder = store
            .create(NewReminder {
                location_id: "1".to_string(),
                name: "Apple Park".to_string(),
                latitude: 37.3347,
                longitude: -122.0089,
                radius: 100.0,
                category: "Landmark".to_string(),
                note: String::new(),
            })
            .unwrap();
        monitor.start_monitoring(&MonitoredRegion::from_reminder(&reminder)).unwrap();
        let router = CrossingRouter::new(store.clone(), monitor.clone(), sink.clone(), Duration::from_secs(60));
        Fixture {
            store,
            monitor,
            sink,
            router,
            reminder,
        }
    }

    fn at(secs: i64, id: RegionId, kind: CrossingKind) -> CrossingEvent {
        CrossingEvent {
            region_id: id,
            kind,
            observed_at: Utc.with_ymd_and_hms(2025, 3, 18, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs),
        }
    }

    #[test]
    fn enter_then_exit_arrives_then_departs() {
        let mut f = fixture();
        let id = f.reminder.id;

        let arrived = f.router.handle(&at(0, id, CrossingKind::Enter)).unwrap();
        let departed = f.router.handle(&at(5, id, CrossingKind::Exit)).unwrap();
        assert_eq!(arrived.direction, CrossingDirection::Arrived);
        assert_eq!(departed.direction, CrossingDirection::Departed);

        let titles: Vec<String> = f.sink.delivered().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["Reminder: Apple Park", "Left Area: Apple Park"]);
    }

    #[test]
    fn repeated_kind_inside_window_is_dropped() {
        let mut f = fixture();
        let id = f.reminder.id;
        assert!(f.router.handle(&at(0, id, CrossingKind::Enter)).is_some());
        assert_eq!(f.router.route(&at(30, id, CrossingKind::Enter)), RouteOutcome::Duplicate);
        // out-of-order callbacks count as inside the window
        assert_eq!(f.router.route(&at(-10, id, CrossingKind::Enter)), RouteOutcome::Duplicate);
        assert!(f.router.handle(&at(60, id, CrossingKind::Enter)).is_some());
        assert_eq!(f.sink.delivered().len(), 2);
    }

    #[test]
    fn alternating_kinds_are_never_duplicates() {
        let mut f = fixture();
        let id = f.reminder.id;
        for (i, kind) in [CrossingKind::Enter, CrossingKind::Exit, CrossingKind::Enter]
            .into_iter()
            .enumerate()
        {
            assert!(f.router.handle(&at(i as i64, id, kind)).is_some());
        }
    }

    #[test]
    fn stale_region_is_unregistered() {
        let mut f = fixture();
        let id = f.reminder.id;
        f.router.handle(&at(0, id, CrossingKind::Enter));
        f.store.delete(id).unwrap();

        assert_eq!(f.router.route(&at(5, id, CrossingKind::Exit)), RouteOutcome::Stale);
        assert!(f.monitor.region(id).is_none());
        assert!(f.router.snapshot().is_empty());
        assert_eq!(f.sink.delivered().len(), 1);
    }

    #[test]
    fn inactive_reminder_emits_nothing() {
        let mut f = fixture();
        f.store.update(f.reminder.id, false).unwrap();
        assert_eq!(f.router.route(&at(0, f.reminder.id, CrossingKind::Enter)), RouteOutcome::Inactive);
        assert!(f.sink.delivered().is_empty());
    }

    #[test]
    fn storage_failure_is_not_fatal() {
        let mut f = fixture();
        let id = f.reminder.id;
        f.store.set_fail_reads(true);
        assert!(matches!(f.router.route(&at(0, id, CrossingKind::Enter)), RouteOutcome::Unresolved(_)));
        assert!(f.monitor.region(id).is_some());

        f.store.set_fail_reads(false);
        assert!(f.router.handle(&at(1, id, CrossingKind::Enter)).is_some());
    }

    #[test]
    fn sink_failure_still_accepts() {
        let f = fixture();
        let mut router = CrossingRouter::new(f.store.clone(), f.monitor.clone(), Arc::new(RejectingSink), Duration::from_secs(60));
        let id = f.reminder.id;

        let outcome = router.route(&at(0, id, CrossingKind::Enter));
        assert!(matches!(outcome, RouteOutcome::Accepted { delivered: false, .. }));
        assert_eq!(outcome.notification().unwrap().direction, CrossingDirection::Arrived);
        // dedup state still advanced
        assert_eq!(router.route(&at(1, id, CrossingKind::Enter)), RouteOutcome::Duplicate);
        assert!(router.handle(&at(2, id, CrossingKind::Exit)).is_some());
    }

    #[test]
    fn snapshot_restores_dedup_state() {
        let mut f = fixture();
        let id = f.reminder.id;
        f.router.handle(&at(0, id, CrossingKind::Enter));
        let saved = f.router.snapshot();
        assert_eq!(saved.len(), 1);

        let mut fresh = CrossingRouter::new(f.store.clone(), f.monitor.clone(), f.sink.clone(), Duration::from_secs(60));
        fresh.restore(saved);
        assert_eq!(fresh.route(&at(10, id, CrossingKind::Enter)), RouteOutcome::Duplicate);

        fresh.retain(&BTreeSet::new());
        assert!(fresh.handle(&at(11, id, CrossingKind::Enter)).is_some());
    }
}
