//! Engine worker thread.
//!
//! The worker is the single owner of the reconciler, the crossing router and
//! the authorization machine. Everything that touches the region monitor's
//! registrations runs here.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::adapter::AdapterCallback;
use crate::authorization::{AuthorizationEffect, AuthorizationMachine, AuthorizationState};
use crate::events::{Advisory, EngineEvent, EventBus};
use crate::reconcile::{PendingReason, Reconciler};
use crate::region::RegionId;
use crate::reminder::Reminder;
use crate::router::{CrossingRouter, LastCrossing, RouteOutcome};
use crate::storage::ReminderStore;

use super::EngineStats;

/// Upper bound on drain/reconcile rounds while settling for `sync`.
const MAX_SETTLE_ROUNDS: usize = 16;

#[derive(Debug)]
pub(crate) enum Control {
    /// Wake the worker; the request itself lives in `Shared::reconcile_requested`.
    Reconcile,
    Sync { reply: Sender<()> },
    CrossingState { reply: Sender<Vec<LastCrossing>> },
    Shutdown,
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    reconcile_passes: AtomicU64,
    reconcile_failures: AtomicU64,
    crossings_received: AtomicU64,
    crossings_accepted: AtomicU64,
    duplicates_dropped: AtomicU64,
    stale_dropped: AtomicU64,
    notifications_failed: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, events_dropped: u64) -> EngineStats {
        EngineStats {
            reconcile_passes: self.reconcile_passes.load(Ordering::Relaxed),
            reconcile_failures: self.reconcile_failures.load(Ordering::Relaxed),
            crossings_received: self.crossings_received.load(Ordering::Relaxed),
            crossings_accepted: self.crossings_accepted.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            events_dropped,
        }
    }
}

/// State the worker publishes for readers on other threads.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) reminders: RwLock<Arc<Vec<Reminder>>>,
    pub(crate) registered: RwLock<BTreeSet<RegionId>>,
    pub(crate) pending: RwLock<BTreeMap<RegionId, PendingReason>>,
    pub(crate) authorization: RwLock<AuthorizationState>,
    pub(crate) reconcile_requested: AtomicBool,
    pub(crate) stats: StatsCounters,
}

impl Shared {
    pub(crate) fn new(reminders: Vec<Reminder>) -> Self {
        Self {
            reminders: RwLock::new(Arc::new(reminders)),
            registered: RwLock::new(BTreeSet::new()),
            pending: RwLock::new(BTreeMap::new()),
            authorization: RwLock::new(AuthorizationState::Undetermined),
            reconcile_requested: AtomicBool::new(false),
            stats: StatsCounters::default(),
        }
    }

    pub(crate) fn request_reconcile(&self) -> bool {
        !self.reconcile_requested.swap(true, Ordering::AcqRel)
    }

    fn take_reconcile_request(&self) -> bool {
        self.reconcile_requested.swap(false, Ordering::AcqRel)
    }
}

pub(crate) struct Worker {
    pub(crate) shared: Arc<Shared>,
    pub(crate) store: Arc<dyn ReminderStore>,
    pub(crate) reconciler: Reconciler,
    pub(crate) router: CrossingRouter,
    pub(crate) machine: AuthorizationMachine,
    pub(crate) bus: EventBus,
}

impl Worker {
    pub(crate) fn run(mut self, control_rx: Receiver<Control>, callback_rx: Receiver<AdapterCallback>, resync: Duration) {
        let ticker = tick(resync);
        debug!(resync_ms = resync.as_millis() as u64, "engine worker started");

        let mut running = true;
        while running {
            select! {
                recv(control_rx) -> msg => match msg {
                    Ok(Control::Reconcile) => {}
                    Ok(Control::Sync { reply }) => {
                        self.settle(&callback_rx);
                        let _ = reply.send(());
                    }
                    Ok(Control::CrossingState { reply }) => {
                        let _ = reply.send(self.router.snapshot());
                    }
                    Ok(Control::Shutdown) | Err(_) => running = false,
                },
                recv(callback_rx) -> msg => match msg {
                    Ok(callback) => self.handle_callback(callback),
                    Err(_) => {
                        error!("callback channel closed; stopping engine worker");
                        running = false;
                    }
                },
                recv(ticker) -> _ => {
                    debug!("periodic resync");
                    self.shared.request_reconcile();
                }
            }

            if running && self.shared.take_reconcile_request() {
                self.run_reconcile();
            }
        }

        debug!("engine worker stopped");
    }

    /// Handles every queued callback and pending reconcile request.
    fn settle(&mut self, callback_rx: &Receiver<AdapterCallback>) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            while let Ok(callback) = callback_rx.try_recv() {
                self.handle_callback(callback);
            }
            if !self.shared.take_reconcile_request() {
                return;
            }
            self.run_reconcile();
        }
        warn!(rounds = MAX_SETTLE_ROUNDS, "engine did not settle; returning from sync");
    }

    fn handle_callback(&mut self, callback: AdapterCallback) {
        match callback {
            AdapterCallback::Crossing(event) => {
                let stats = &self.shared.stats;
                StatsCounters::bump(&stats.crossings_received);
                match self.router.route(&event) {
                    RouteOutcome::Accepted { notification, delivered } => {
                        StatsCounters::bump(&stats.crossings_accepted);
                        if !delivered {
                            StatsCounters::bump(&stats.notifications_failed);
                        }
                        self.bus.publish(&EngineEvent::GeofenceCrossed { notification });
                    }
                    RouteOutcome::Duplicate => StatsCounters::bump(&stats.duplicates_dropped),
                    RouteOutcome::Stale => StatsCounters::bump(&stats.stale_dropped),
                    RouteOutcome::Inactive => {
                        self.shared.request_reconcile();
                    }
                    RouteOutcome::Unresolved(_) => {}
                }
            }
            AdapterCallback::Authorization(state) => self.apply_authorization(state),
            AdapterCallback::MonitoringFailed { region_id, reason } => {
                warn!(region_id = %region_id, reason = %reason, "monitor reported region failure");
                self.router.forget(region_id);
                if self.reconciler.mark_failed(region_id, reason) {
                    *write(&self.shared.pending) = self.reconciler.pending().clone();
                }
                self.shared.request_reconcile();
            }
        }
    }

    fn apply_authorization(&mut self, state: AuthorizationState) {
        let transition = self.machine.apply(state);
        *write(&self.shared.authorization) = state;
        self.shared.request_reconcile();

        if !transition.changed() {
            debug!(state = %state, "authorization re-confirmed");
            return;
        }

        info!(previous = %transition.previous, current = %state, "authorization changed");
        self.bus.publish(&EngineEvent::AuthorizationChanged {
            previous: transition.previous,
            current: state,
        });

        let advisory = match transition.effect {
            AuthorizationEffect::Resume => None,
            AuthorizationEffect::WarnForegroundOnly => Some(Advisory::BackgroundDeliveryUnavailable),
            AuthorizationEffect::SuppressAndPrompt | AuthorizationEffect::AwaitDecision => {
                Some(Advisory::AuthorizationRequired { state })
            }
        };
        if let Some(advisory) = advisory {
            self.bus.publish(&EngineEvent::Advisory { advisory });
        }
    }

    fn run_reconcile(&mut self) {
        let reminders = match self.store.fetch_all() {
            Ok(reminders) => reminders,
            Err(e) => {
                StatsCounters::bump(&self.shared.stats.reconcile_failures);
                warn!(error = %e, "could not load reminders; keeping current regions");
                return;
            }
        };

        let known: BTreeSet<RegionId> = reminders.iter().map(|r| r.id).collect();
        self.router.retain(&known);

        let report = self.reconciler.reconcile(&reminders, self.machine.state());
        *write(&self.shared.reminders) = Arc::new(reminders);

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                StatsCounters::bump(&self.shared.stats.reconcile_failures);
                warn!(error = %e, "reconcile pass failed; will retry");
                return;
            }
        };
        StatsCounters::bump(&self.shared.stats.reconcile_passes);

        // A region registered afresh starts with no crossing history.
        for id in report.stopped.iter().chain(&report.started) {
            self.router.forget(*id);
        }

        let regions_changed = {
            let mut registered = write(&self.shared.registered);
            let changed = *registered != report.registered;
            registered.clone_from(&report.registered);
            changed
        };
        if regions_changed {
            self.bus.publish(&EngineEvent::RegionsChanged {
                registered: report.registered.iter().copied().collect(),
            });
        }

        let pending_changed = {
            let mut pending = write(&self.shared.pending);
            let changed = *pending != report.pending;
            pending.clone_from(&report.pending);
            changed
        };
        if pending_changed && !report.pending.is_empty() {
            self.bus.publish(&EngineEvent::Advisory {
                advisory: Advisory::RegistrationPending {
                    pending: report.pending,
                },
            });
        }
    }
}
