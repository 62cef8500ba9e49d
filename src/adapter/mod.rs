//! Region monitor adapter.
//!
//! The operating system owns region monitoring. The engine drives it through
//! `RegionMonitor` and receives its callbacks through a `CallbackSender`,
//! which feeds the engine worker's callback queue from any thread.

mod simulated;

pub use simulated::SimulatedRegionMonitor;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;

use crate::authorization::AuthorizationState;
use crate::error::{GeofenceError, GeofenceResult};
use crate::region::{CrossingEvent, CrossingKind, MonitoredRegion, RegionId};

/// Platform limit on simultaneously monitored regions.
pub const DEFAULT_REGION_CAPACITY: usize = 20;

/// OS capability to monitor a bounded set of circular regions.
///
/// Calls may block on OS internals and may complete out of order relative
/// to each other; callers re-query `currently_monitored` instead of trusting
/// the calls they issued.
pub trait RegionMonitor: Send + Sync {
    /// Register a region. Registering an id that is already monitored
    /// replaces it.
    fn start_monitoring(&self, region: &MonitoredRegion) -> GeofenceResult<()>;

    /// Unregister a region. Unknown ids are a no-op.
    fn stop_monitoring(&self, region_id: RegionId) -> GeofenceResult<()>;

    /// Ids the OS is monitoring right now.
    fn currently_monitored(&self) -> GeofenceResult<BTreeSet<RegionId>>;

    /// Hard upper bound on simultaneously monitored regions.
    fn capacity(&self) -> usize {
        DEFAULT_REGION_CAPACITY
    }

    /// Current permission level as known to the OS.
    fn authorization(&self) -> AuthorizationState;

    /// Ask the user for background ("always") permission. The answer
    /// arrives later as an authorization callback.
    fn request_always_authorization(&self) {}
}

/// A raw callback from the region monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterCallback {
    /// A boundary crossing.
    Crossing(CrossingEvent),
    /// The permission level changed (or was re-confirmed).
    Authorization(AuthorizationState),
    /// The OS gave up monitoring a region.
    MonitoringFailed { region_id: RegionId, reason: String },
}

/// Cloneable handle adapters use to deliver callbacks to the engine.
#[derive(Debug, Clone)]
pub struct CallbackSender {
    tx: Sender<AdapterCallback>,
}

impl CallbackSender {
    pub(crate) fn new(tx: Sender<AdapterCallback>) -> Self {
        Self { tx }
    }

    /// Enqueue a callback. Blocks while the engine's callback queue is full.
    pub fn send(&self, callback: AdapterCallback) -> GeofenceResult<()> {
        self.tx.send(callback).map_err(|_| GeofenceError::Disconnected {
            path: "engine_callbacks".to_string(),
        })
    }

    /// Report a crossing observed now.
    pub fn crossing(&self, region_id: RegionId, kind: CrossingKind) -> GeofenceResult<()> {
        self.send(AdapterCallback::Crossing(CrossingEvent::now(region_id, kind)))
    }

    /// Report a crossing with an explicit observation time.
    pub fn crossing_at(
        &self,
        region_id: RegionId,
        kind: CrossingKind,
        observed_at: DateTime<Utc>,
    ) -> GeofenceResult<()> {
        self.send(AdapterCallback::Crossing(CrossingEvent {
            region_id,
            kind,
            observed_at,
        }))
    }

    /// Report the current authorization level.
    pub fn authorization_changed(&self, state: AuthorizationState) -> GeofenceResult<()> {
        self.send(AdapterCallback::Authorization(state))
    }

    /// Report that monitoring failed for a region.
    pub fn monitoring_failed(&self, region_id: RegionId, reason: impl Into<String>) -> GeofenceResult<()> {
        self.send(AdapterCallback::MonitoringFailed {
            region_id,
            reason: reason.into(),
        })
    }
}
