//! Reconciliation of reminders against monitored regions.
//!
//! `plan` is a pure diff: given the reminders, the permission level and the
//! ids the monitor reports, it decides what to register and unregister.
//! `Reconciler` applies a plan to a `RegionMonitor`, then re-queries the
//! monitor so the report reflects what the OS actually holds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::RegionMonitor;
use crate::authorization::AuthorizationState;
use crate::error::GeofenceResult;
use crate::region::{MonitoredRegion, RegionId};
use crate::reminder::Reminder;

/// Why an active reminder has no registered region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum PendingReason {
    /// Newer reminders took every available slot.
    Capacity,
    /// The monitor rejected the region.
    RegistrationFailed(String),
    /// Registration was issued but the monitor does not report it.
    NotConfirmed,
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity => f.write_str("region capacity reached"),
            Self::RegistrationFailed(reason) => write!(f, "registration failed: {reason}"),
            Self::NotConfirmed => f.write_str("registration not confirmed by monitor"),
        }
    }
}

/// Output of `plan`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Regions that should be monitored, keyed by id.
    pub desired: BTreeMap<RegionId, MonitoredRegion>,
    /// Desired regions the monitor does not hold, newest reminder first.
    pub to_register: Vec<MonitoredRegion>,
    /// Registered ids that are not desired.
    pub to_unregister: BTreeSet<RegionId>,
    /// Active reminders left out because of capacity, newest first.
    pub over_capacity: Vec<RegionId>,
    /// Set when monitoring is suppressed by the permission level.
    pub suppressed_by: Option<AuthorizationState>,
}

impl ReconcilePlan {
    /// Returns true if applying the plan would not call the monitor.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_register.is_empty() && self.to_unregister.is_empty()
    }
}

/// Orders active reminders by monitoring priority: most recently created
/// first, ties broken by id.
#[must_use]
pub fn by_priority(reminders: &[Reminder]) -> Vec<&Reminder> {
    let mut active: Vec<&Reminder> = reminders.iter().filter(|r| r.is_active).collect();
    active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    active
}

/// Computes the register/unregister diff.
#[must_use]
pub fn plan(
    reminders: &[Reminder],
    authorization: AuthorizationState,
    registered: &BTreeSet<RegionId>,
    capacity: usize,
) -> ReconcilePlan {
    let mut out = ReconcilePlan::default();

    if authorization.permits_monitoring() {
        for (rank, reminder) in by_priority(reminders).into_iter().enumerate() {
            if rank < capacity {
                out.desired.insert(reminder.id, MonitoredRegion::from_reminder(reminder));
                if !registered.contains(&reminder.id) {
                    out.to_register.push(MonitoredRegion::from_reminder(reminder));
                }
            } else {
                out.over_capacity.push(reminder.id);
            }
        }
    } else {
        out.suppressed_by = Some(authorization);
    }

    out.to_unregister = registered
        .iter()
        .filter(|id| !out.desired.contains_key(id))
        .copied()
        .collect();

    out
}

/// What a reconcile pass did and where it ended up.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub authorization: AuthorizationState,
    /// Number of regions that should be monitored.
    pub desired: usize,
    /// Ids the monitor reports after the pass.
    pub registered: BTreeSet<RegionId>,
    pub started: Vec<RegionId>,
    pub stopped: Vec<RegionId>,
    /// Active reminders without a region, and why.
    pub pending: BTreeMap<RegionId, PendingReason>,
    pub suppressed: bool,
}

impl ReconcileReport {
    /// Returns true if every desired region is registered and nothing else is.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.pending.is_empty() && self.registered.len() == self.desired
    }
}

/// Applies reconcile plans to a region monitor.
pub struct Reconciler {
    monitor: Arc<dyn RegionMonitor>,
    capacity_limit: Option<usize>,
    pending: BTreeMap<RegionId, PendingReason>,
    failed: BTreeMap<RegionId, String>,
    desired: BTreeSet<RegionId>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("capacity_limit", &self.capacity_limit)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// `capacity_limit` can only lower the monitor's own capacity.
    #[must_use]
    pub fn new(monitor: Arc<dyn RegionMonitor>, capacity_limit: Option<usize>) -> Self {
        Self {
            monitor,
            capacity_limit,
            pending: BTreeMap::new(),
            failed: BTreeMap::new(),
            desired: BTreeSet::new(),
        }
    }

    /// Effective capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let platform = self.monitor.capacity();
        self.capacity_limit.map_or(platform, |limit| limit.min(platform))
    }

    /// Pending reminders as of the last pass (plus failures reported since).
    #[must_use]
    pub fn pending(&self) -> &BTreeMap<RegionId, PendingReason> {
        &self.pending
    }

    /// Records an asynchronous monitoring failure.
    ///
    /// The region is dropped from the monitor so the next pass registers it
    /// again. A region the last pass wanted is reported as pending until
    /// then; returns whether it was.
    pub fn mark_failed(&mut self, region_id: RegionId, reason: impl Into<String>) -> bool {
        if let Err(e) = self.monitor.stop_monitoring(region_id) {
            debug!(region_id = %region_id, error = %e, "stop after monitoring failure did not succeed");
        }
        if !self.desired.contains(&region_id) {
            debug!(region_id = %region_id, "failure reported for a region that is not wanted");
            return false;
        }
        let reason = reason.into();
        self.pending
            .insert(region_id, PendingReason::RegistrationFailed(reason.clone()));
        self.failed.insert(region_id, reason);
        true
    }

    /// Runs one reconcile pass.
    ///
    /// Fails only if the monitor cannot report its registered set; individual
    /// register/unregister failures are recorded as pending and retried on
    /// the next pass.
    pub fn reconcile(
        &mut self,
        reminders: &[Reminder],
        authorization: AuthorizationState,
    ) -> GeofenceResult<ReconcileReport> {
        let registered = self.monitor.currently_monitored()?;
        let capacity = self.capacity();
        let plan = plan(reminders, authorization, &registered, capacity);

        let mut report = ReconcileReport {
            authorization,
            desired: plan.desired.len(),
            suppressed: plan.suppressed_by.is_some(),
            ..ReconcileReport::default()
        };
        let mut pending = BTreeMap::new();

        // Unregister first so replacements fit under the capacity limit.
        for id in &plan.to_unregister {
            match self.monitor.stop_monitoring(*id) {
                Ok(()) => report.stopped.push(*id),
                Err(e) => warn!(region_id = %id, error = %e, "failed to stop monitoring region"),
            }
        }

        for region in &plan.to_register {
            match self.monitor.start_monitoring(region) {
                Ok(()) => report.started.push(region.id),
                Err(e) => {
                    warn!(region_id = %region.id, error = %e, "region registration failed; keeping it pending");
                    pending.insert(region.id, PendingReason::RegistrationFailed(e.to_string()));
                }
            }
        }

        report.registered = self.monitor.currently_monitored()?;

        for id in plan.desired.keys() {
            if report.registered.contains(id) {
                continue;
            }
            pending.entry(*id).or_insert_with(|| {
                self.failed
                    .get(id)
                    .map_or(PendingReason::NotConfirmed, |r| PendingReason::RegistrationFailed(r.clone()))
            });
        }
        for id in &plan.over_capacity {
            pending.insert(*id, PendingReason::Capacity);
        }

        self.failed.retain(|id, _| pending.contains_key(id));
        self.desired = plan.desired.keys().copied().collect();
        self.pending = pending.clone();
        report.pending = pending;

        if let Some(state) = plan.suppressed_by {
            debug!(state = %state, stopped = report.stopped.len(), "monitoring suppressed by authorization");
        } else if !plan.over_capacity.is_empty() {
            info!(
                capacity,
                waiting = plan.over_capacity.len(),
                "more active reminders than region slots"
            );
        }
        debug!(
            desired = report.desired,
            registered = report.registered.len(),
            started = report.started.len(),
            stopped = report.stopped.len(),
            pending = report.pending.len(),
            "reconcile pass complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone, Utc};

    use crate::adapter::SimulatedRegionMonitor;
    use crate::reminder::NewReminder;

    fn reminder(n: i64) -> Reminder {
        let mut r = NewReminder {
            location_id: format!("loc-{n}"),
            name: format!("Place {n}"),
            latitude: 37.0 + n as f64 * 0.001,
            longitude: -122.0,
            radius: 50.0 + n as f64,
            category: "Test".to_string(),
            note: String::new(),
        }
        .into_reminder(Utc.with_ymd_and_hms(2025, 3, 18, 0, 0, 0).unwrap());
        r.created_at += Duration::minutes(n);
        r
    }

    fn always_monitor(capacity: usize) -> Arc<SimulatedRegionMonitor> {
        Arc::new(SimulatedRegionMonitor::with_authorization(
            capacity,
            AuthorizationState::Always,
        ))
    }

    #[test]
    fn plan_registers_everything_under_capacity() {
        let reminders: Vec<Reminder> = (0..3).map(reminder).collect();
        let p = plan(&reminders, AuthorizationState::Always, &BTreeSet::new(), 20);
        assert_eq!(p.desired.len(), 3);
        assert_eq!(p.to_register.len(), 3);
        assert!(p.to_unregister.is_empty());
        assert!(p.over_capacity.is_empty());
        // newest first
        assert_eq!(p.to_register[0].id, reminders[2].id);

        let registered: BTreeSet<RegionId> = p.desired.keys().copied().collect();
        assert!(plan(&reminders, AuthorizationState::Always, &registered, 20).is_noop());
    }

    #[test]
    fn plan_prefers_newest_when_over_capacity() {
        let reminders: Vec<Reminder> = (0..5).map(reminder).collect();
        let p = plan(&reminders, AuthorizationState::Always, &BTreeSet::new(), 2);
        let desired: BTreeSet<RegionId> = p.desired.keys().copied().collect();
        assert_eq!(desired, [reminders[4].id, reminders[3].id].into_iter().collect());
        assert_eq!(p.over_capacity, vec![reminders[2].id, reminders[1].id, reminders[0].id]);
    }

    #[test]
    fn plan_ignores_inactive_and_unregisters_strays() {
        let mut reminders: Vec<Reminder> = (0..2).map(reminder).collect();
        reminders[0].is_active = false;
        let stray = RegionId::new();
        let registered: BTreeSet<RegionId> = [reminders[0].id, stray].into_iter().collect();

        let p = plan(&reminders, AuthorizationState::Always, &registered, 20);
        assert_eq!(p.to_register.len(), 1);
        assert_eq!(p.to_register[0].id, reminders[1].id);
        assert_eq!(p.to_unregister, registered);
    }

    #[test]
    fn plan_suppresses_without_always() {
        let reminders: Vec<Reminder> = (0..2).map(reminder).collect();
        let registered: BTreeSet<RegionId> = reminders.iter().map(|r| r.id).collect();
        for state in [
            AuthorizationState::Undetermined,
            AuthorizationState::WhileInUse,
            AuthorizationState::Denied,
            AuthorizationState::Restricted,
        ] {
            let p = plan(&reminders, state, &registered, 20);
            assert!(p.desired.is_empty());
            assert_eq!(p.to_unregister, registered);
            assert_eq!(p.suppressed_by, Some(state));
        }
    }

    #[test]
    fn reconcile_converges_and_is_idempotent() {
        let monitor = always_monitor(20);
        let mut rec = Reconciler::new(monitor.clone(), None);
        let reminders: Vec<Reminder> = (0..4).map(reminder).collect();

        let first = rec.reconcile(&reminders, AuthorizationState::Always).unwrap();
        assert!(first.is_converged());
        assert_eq!(first.started.len(), 4);
        for r in &reminders {
            let region = monitor.region(r.id).unwrap();
            assert_eq!(region.radius, r.radius);
            assert_eq!(region.center, r.coordinate());
        }

        let calls = monitor.start_calls();
        let second = rec.reconcile(&reminders, AuthorizationState::Always).unwrap();
        assert!(second.started.is_empty() && second.stopped.is_empty());
        assert_eq!(monitor.start_calls(), calls);
    }

    #[test]
    fn capacity_limit_lowers_platform_capacity() {
        let monitor = always_monitor(20);
        let mut rec = Reconciler::new(monitor.clone(), Some(3));
        assert_eq!(rec.capacity(), 3);
        let reminders: Vec<Reminder> = (0..5).map(reminder).collect();
        let report = rec.reconcile(&reminders, AuthorizationState::Always).unwrap();
        assert_eq!(report.registered.len(), 3);
        assert_eq!(report.pending.get(&reminders[0].id), Some(&PendingReason::Capacity));
        assert_eq!(report.pending.get(&reminders[1].id), Some(&PendingReason::Capacity));

        assert_eq!(Reconciler::new(monitor, Some(50)).capacity(), 20);
    }

    #[test]
    fn pending_capacity_region_promoted_after_removal() {
        let monitor = always_monitor(2);
        let mut rec = Reconciler::new(monitor.clone(), None);
        let mut reminders: Vec<Reminder> = (0..3).map(reminder).collect();

        let report = rec.reconcile(&reminders, AuthorizationState::Always).unwrap();
        assert_eq!(report.pending.len(), 1);
        assert!(monitor.region(reminders[0].id).is_none());

        reminders.remove(2);
        let report = rec.reconcile(&reminders, AuthorizationState::Always).unwrap();
        assert!(report.is_converged());
        assert!(monitor.region(reminders[0].id).is_some());
    }

    #[test]
    fn rejected_region_stays_pending_then_recovers() {
        let monitor = always_monitor(20);
        let mut rec = Reconciler::new(monitor.clone(), None);
        let reminders: Vec<Reminder> = (0..2).map(reminder).collect();
        monitor.reject_region(reminders[1].id, "monitoring unsupported").unwrap();

        let report = rec.reconcile(&reminders, AuthorizationState::Always).unwrap();
        assert!(matches!(
            report.pending.get(&reminders[1].id),
            Some(PendingReason::RegistrationFailed(reason)) if reason.contains("monitoring unsupported")
        ));
        assert!(report.registered.contains(&reminders[0].id));

        monitor.clear_rejections().unwrap();
        let report = rec.reconcile(&reminders, AuthorizationState::Always).unwrap();
        assert!(report.is_converged());
    }

    #[test]
    fn evicted_region_is_restored() {
        let monitor = always_monitor(20);
        let mut rec = Reconciler::new(monitor.clone(), None);
        let reminders: Vec<Reminder> = (0..2).map(reminder).collect();
        rec.reconcile(&reminders, AuthorizationState::Always).unwrap();

        assert!(monitor.evict(reminders[0].id).unwrap());
        let report = rec.reconcile(&reminders, AuthorizationState::Always).unwrap();
        assert_eq!(report.started, vec![reminders[0].id]);
        assert!(report.is_converged());
    }

    #[test]
    fn mark_failed_forces_reregistration() {
        let monitor = always_monitor(20);
        let mut rec = Reconciler::new(monitor.clone(), None);
        let reminders = vec![reminder(1)];
        rec.reconcile(&reminders, AuthorizationState::Always).unwrap();

        assert!(rec.mark_failed(reminders[0].id, "location unavailable"));
        assert!(monitor.region(reminders[0].id).is_none());
        assert!(matches!(
            rec.pending().get(&reminders[0].id),
            Some(PendingReason::RegistrationFailed(_))
        ));

        let report = rec.reconcile(&reminders, AuthorizationState::Always).unwrap();
        assert!(report.is_converged());
        assert!(rec.pending().is_empty());
    }

    #[test]
    fn mark_failed_ignores_regions_that_are_not_wanted() {
        let monitor = always_monitor(20);
        let mut rec = Reconciler::new(monitor.clone(), None);
        let reminders = vec![reminder(1)];
        rec.reconcile(&reminders, AuthorizationState::Always).unwrap();

        assert!(!rec.mark_failed(RegionId::new(), "gone"));
        assert!(rec.pending().is_empty());

        rec.reconcile(&reminders, AuthorizationState::Denied).unwrap();
        assert!(!rec.mark_failed(reminders[0].id, "location unavailable"));
        assert!(rec.pending().is_empty());
    }
}
