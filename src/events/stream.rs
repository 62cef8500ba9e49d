use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{GeofenceError, GeofenceResult};

use super::bus::BusInner;
use super::types::{EngineEvent, SubscriptionId};

fn disconnected() -> GeofenceError {
    GeofenceError::Disconnected {
        path: "event_subscription".to_string(),
    }
}

/// A stream of engine events.
///
/// Dropping the subscription unregisters it from the bus.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: Receiver<EngineEvent>,
    bus: Weak<BusInner>,
    unregistered: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, rx: Receiver<EngineEvent>, bus: Weak<BusInner>) -> Self {
        Self {
            id,
            rx,
            bus,
            unregistered: AtomicBool::new(false),
        }
    }

    /// Identifier of this subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Explicit unregistration. Idempotent; buffered events stay readable.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> GeofenceResult<EngineEvent> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> GeofenceResult<EngineEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => GeofenceError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Receive an event if one is buffered.
    pub fn try_recv(&self) -> GeofenceResult<Option<EngineEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Everything currently buffered, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
