//! In-process region monitor.
//!
//! Behaves like the OS service closely enough to drive the engine without a
//! device: it enforces the capacity limit, refuses to monitor without
//! `Always` permission, can evict or reject regions on demand, and turns
//! simulated movement into Enter/Exit callbacks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::authorization::AuthorizationState;
use crate::error::{GeofenceError, GeofenceResult};
use crate::region::{CrossingKind, MonitoredRegion, RegionId};
use crate::reminder::Coordinate;

use super::{AdapterCallback, CallbackSender, RegionMonitor, DEFAULT_REGION_CAPACITY};

#[derive(Debug, Default)]
struct SimState {
    regions: BTreeMap<RegionId, MonitoredRegion>,
    authorization: AuthorizationState,
    position: Option<Coordinate>,
    inside: BTreeSet<RegionId>,
    rejections: BTreeMap<RegionId, String>,
    start_calls: u64,
    stop_calls: u64,
    authorization_requests: u64,
}

/// Simulated region monitor.
#[derive(Debug)]
pub struct SimulatedRegionMonitor {
    capacity: usize,
    state: Mutex<SimState>,
    callbacks: Mutex<Option<CallbackSender>>,
}

impl Default for SimulatedRegionMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_REGION_CAPACITY)
    }
}

impl SimulatedRegionMonitor {
    /// Create a monitor with the given capacity and `Undetermined` permission.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(SimState::default()),
            callbacks: Mutex::new(None),
        }
    }

    /// Create a monitor that already holds the given permission.
    #[must_use]
    pub fn with_authorization(capacity: usize, authorization: AuthorizationState) -> Self {
        let monitor = Self::new(capacity);
        if let Ok(mut state) = monitor.state.lock() {
            state.authorization = authorization;
        }
        monitor
    }

    /// Route future callbacks to an engine.
    pub fn attach(&self, callbacks: CallbackSender) {
        if let Ok(mut guard) = self.callbacks.lock() {
            *guard = Some(callbacks);
        }
    }

    fn lock(&self) -> GeofenceResult<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| GeofenceError::internal("simulated monitor lock poisoned"))
    }

    fn emit(&self, callbacks: Vec<AdapterCallback>) {
        let sender = self.callbacks.lock().ok().and_then(|g| g.clone());
        let Some(sender) = sender else {
            debug!(count = callbacks.len(), "no engine attached; callbacks discarded");
            return;
        };
        for cb in callbacks {
            if let Err(e) = sender.send(cb) {
                warn!(error = %e, "simulated callback not delivered");
            }
        }
    }

    /// Change the permission level as if the user edited OS settings.
    ///
    /// Downgrading from `Always` does not clear registrations, matching the
    /// OS: regions stay registered but stop delivering until permission
    /// returns.
    pub fn set_authorization(&self, authorization: AuthorizationState) -> GeofenceResult<()> {
        self.lock()?.authorization = authorization;
        self.emit(vec![AdapterCallback::Authorization(authorization)]);
        Ok(())
    }

    /// Move the simulated device and emit crossings for monitored regions.
    ///
    /// Returns the crossings produced, in emission order.
    pub fn move_to(&self, position: Coordinate) -> GeofenceResult<Vec<(RegionId, CrossingKind)>> {
        let crossings = {
            let mut state = self.lock()?;
            state.position = Some(position);
            let delivering = state.authorization.permits_monitoring();

            let mut crossings = Vec::new();
            let regions: Vec<MonitoredRegion> = state.regions.values().cloned().collect();
            for region in regions {
                let now_inside = region.contains(&position);
                let was_inside = state.inside.contains(&region.id);
                if now_inside && !was_inside {
                    state.inside.insert(region.id);
                    if delivering && region.notify_on_entry {
                        crossings.push((region.id, CrossingKind::Enter));
                    }
                } else if !now_inside && was_inside {
                    state.inside.remove(&region.id);
                    if delivering && region.notify_on_exit {
                        crossings.push((region.id, CrossingKind::Exit));
                    }
                }
            }
            crossings
        };

        self.emit(
            crossings
                .iter()
                .map(|(id, kind)| AdapterCallback::Crossing(crate::region::CrossingEvent::now(*id, *kind)))
                .collect(),
        );
        Ok(crossings)
    }

    /// Deliver a raw crossing callback, registered or not.
    pub fn deliver(&self, region_id: RegionId, kind: CrossingKind) {
        self.emit(vec![AdapterCallback::Crossing(crate::region::CrossingEvent::now(
            region_id, kind,
        ))]);
    }

    /// Drop a region silently, as the OS may do across restarts.
    pub fn evict(&self, region_id: RegionId) -> GeofenceResult<bool> {
        let mut state = self.lock()?;
        state.inside.remove(&region_id);
        Ok(state.regions.remove(&region_id).is_some())
    }

    /// Make `start_monitoring` fail for a region until cleared.
    pub fn reject_region(&self, region_id: RegionId, reason: impl Into<String>) -> GeofenceResult<()> {
        self.lock()?.rejections.insert(region_id, reason.into());
        Ok(())
    }

    /// Stop rejecting all regions.
    pub fn clear_rejections(&self) -> GeofenceResult<()> {
        self.lock()?.rejections.clear();
        Ok(())
    }

    /// Report an asynchronous monitoring failure for a registered region.
    pub fn fail_region(&self, region_id: RegionId, reason: impl Into<String>) -> GeofenceResult<()> {
        {
            let mut state = self.lock()?;
            state.regions.remove(&region_id);
            state.inside.remove(&region_id);
        }
        self.emit(vec![AdapterCallback::MonitoringFailed {
            region_id,
            reason: reason.into(),
        }]);
        Ok(())
    }

    /// The registered region with this id, if any.
    #[must_use]
    pub fn region(&self, region_id: RegionId) -> Option<MonitoredRegion> {
        self.state.lock().ok()?.regions.get(&region_id).cloned()
    }

    /// All registered regions.
    #[must_use]
    pub fn regions(&self) -> Vec<MonitoredRegion> {
        self.state
            .lock()
            .map(|s| s.regions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of `start_monitoring` calls accepted or rejected so far.
    #[must_use]
    pub fn start_calls(&self) -> u64 {
        self.state.lock().map(|s| s.start_calls).unwrap_or(0)
    }

    /// Number of `stop_monitoring` calls so far.
    #[must_use]
    pub fn stop_calls(&self) -> u64 {
        self.state.lock().map(|s| s.stop_calls).unwrap_or(0)
    }

    /// Number of permission prompts requested.
    #[must_use]
    pub fn authorization_requests(&self) -> u64 {
        self.state.lock().map(|s| s.authorization_requests).unwrap_or(0)
    }
}

impl RegionMonitor for SimulatedRegionMonitor {
    fn start_monitoring(&self, region: &MonitoredRegion) -> GeofenceResult<()> {
        let mut state = self.lock()?;
        state.start_calls += 1;

        if !state.authorization.permits_monitoring() {
            return Err(GeofenceError::AuthorizationInsufficient {
                state: state.authorization,
            });
        }
        if let Some(reason) = state.rejections.get(&region.id) {
            return Err(GeofenceError::registration(region.id, reason.clone()));
        }
        if !state.regions.contains_key(&region.id) && state.regions.len() >= self.capacity {
            return Err(GeofenceError::registration(
                region.id,
                format!("capacity of {} regions exceeded", self.capacity),
            ));
        }

        // Starting inside a region does not fire Enter; only later movement does.
        let inside = state.position.is_some_and(|p| region.contains(&p));
        if inside {
            state.inside.insert(region.id);
        } else {
            state.inside.remove(&region.id);
        }
        state.regions.insert(region.id, region.clone());
        Ok(())
    }

    fn stop_monitoring(&self, region_id: RegionId) -> GeofenceResult<()> {
        let mut state = self.lock()?;
        state.stop_calls += 1;
        state.regions.remove(&region_id);
        state.inside.remove(&region_id);
        Ok(())
    }

    fn currently_monitored(&self) -> GeofenceResult<BTreeSet<RegionId>> {
        Ok(self.lock()?.regions.keys().copied().collect())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn authorization(&self) -> AuthorizationState {
        self.state
            .lock()
            .map(|s| s.authorization)
            .unwrap_or(AuthorizationState::Undetermined)
    }

    fn request_always_authorization(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.authorization_requests += 1;
        }
    }
}
