// Bridge controller: owns the registry and drives both tick passes

mod control;

pub use control::{control_topics, AUTOPILOT_TOPIC, VEHICLE_CONTROL_TOPIC};

#[cfg(test)]
mod tests;

use crate::actor::ActorKind;
use crate::config::BridgeConfig;
use crate::factory::ActorFactory;
use crate::messaging::MessageBus;
use crate::pseudo::{MapPublisher, ObjectListPublisher, PseudoActor, UpdateContext};
use crate::reconcile::{ReconcileReport, Reconciler, ScopedPublisherPolicy};
use crate::registry::Registry;
use crate::stats::BridgeStats;
use crate::world::{ActorId, SimulationWorld, Timestamp};
use dashmap::DashMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why an update tick did nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The messaging side is shutting down
    Shutdown,
    /// Another update pass holds the update lock
    Busy,
    /// The tick timestamp does not advance past the last processed one
    Stale,
}

/// Result of an update pass
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub pseudo_updated: usize,
    pub actors_updated: usize,
    /// Actors whose update failed, with the error message, in update order
    pub failures: Vec<(ActorId, String)>,
    /// Pseudo actors whose update failed, by type name
    pub pseudo_failures: Vec<(&'static str, String)>,
}

impl PassReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len() + self.pseudo_failures.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Updated(PassReport),
}

/// Tunables for a bridge instance
#[derive(Clone, Debug)]
pub struct BridgeOptions {
    /// How long the reconcile lock is held after a reconciliation pass
    pub reconcile_cooldown: Duration,
    pub scoped_publisher_policy: ScopedPublisherPolicy,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            reconcile_cooldown: Duration::from_secs(1),
            scoped_publisher_policy: ScopedPublisherPolicy::Retain,
        }
    }
}

impl From<&BridgeConfig> for BridgeOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            reconcile_cooldown: config.reconcile_cooldown(),
            scoped_publisher_policy: config.scoped_publisher_policy(),
        }
    }
}

/// Everything guarded by the update lock
struct UpdateState {
    registry: Registry,
    pseudo_actors: Vec<Box<dyn PseudoActor>>,
    last_timestamp: Option<f64>,
}

impl UpdateState {
    /// A tick is processed only if it is strictly newer than the last one.
    /// The first tick always is, unless its timestamp is NaN.
    fn is_stale(&self, elapsed_seconds: f64) -> bool {
        match self.last_timestamp {
            Some(last) => elapsed_seconds.partial_cmp(&last) != Some(Ordering::Greater),
            None => elapsed_seconds.is_nan(),
        }
    }
}

/// Keeps the simulation's actor tree mirrored onto the message bus.
///
/// Two tick callbacks are registered with the world: reconciliation (guarded by
/// the reconcile lock, rate limited by a cooldown) and the update pass (guarded
/// by the update lock). Both try-lock and skip when busy; only `shutdown`
/// blocks. Reconciliation plans its diff without the update lock and applies it
/// under the update lock, so an update pass never sees a half-created tree.
///
/// Every ego vehicle also gets inbound control subscriptions on the bus for as
/// long as it is registered.
pub struct Bridge {
    world: Arc<dyn SimulationWorld>,
    bus: Arc<dyn MessageBus>,
    reconciler: Reconciler,
    reconcile_cooldown: Duration,
    state: Mutex<UpdateState>,
    reconcile_lock: Mutex<()>,
    /// Ego vehicles with control subscriptions: id -> topic prefix
    vehicle_controls: DashMap<ActorId, String>,
    stats: BridgeStats,
}

impl Bridge {
    /// Create the bridge and register its tick callbacks with the world.
    ///
    /// Ego role names come from the bus parameters (`ego_vehicle.role_name`).
    pub fn new(
        world: Arc<dyn SimulationWorld>,
        bus: Arc<dyn MessageBus>,
        options: BridgeOptions,
    ) -> Arc<Self> {
        let factory = ActorFactory::from_parameters(bus.parameters());
        info!(
            ego_role_names = ?factory.ego_role_names(),
            reconcile_cooldown_ms = options.reconcile_cooldown.as_millis() as u64,
            policy = ?options.scoped_publisher_policy,
            "Initializing bridge"
        );

        let pseudo_actors: Vec<Box<dyn PseudoActor>> = vec![
            Box::new(MapPublisher::new("/map")),
            Box::new(ObjectListPublisher::new("objects")),
        ];

        let bridge = Arc::new(Self {
            world,
            bus,
            reconciler: Reconciler::new(factory, options.scoped_publisher_policy),
            reconcile_cooldown: options.reconcile_cooldown,
            state: Mutex::new(UpdateState {
                registry: Registry::new(),
                pseudo_actors,
                last_timestamp: None,
            }),
            reconcile_lock: Mutex::new(()),
            vehicle_controls: DashMap::new(),
            stats: BridgeStats::new(),
        });

        // callbacks hold weak references so dropping the bridge stops them
        let weak = Arc::downgrade(&bridge);
        bridge.world.on_tick(Arc::new(move |timestamp: Timestamp| {
            if let Some(bridge) = weak.upgrade() {
                bridge.on_reconcile_tick(timestamp);
            }
        }));

        let weak = Arc::downgrade(&bridge);
        bridge.world.on_tick(Arc::new(move |timestamp: Timestamp| {
            if let Some(bridge) = weak.upgrade() {
                bridge.on_update_tick(timestamp);
            }
        }));

        bridge
    }

    /// Reconciliation tick: sync the registry with the live world, then hold
    /// the reconcile lock for the cooldown. Returns `None` when skipped.
    pub fn on_reconcile_tick(&self, timestamp: Timestamp) -> Option<ReconcileReport> {
        if self.bus.is_shutdown() {
            return None;
        }

        let _guard = match self.reconcile_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                self.stats.record_reconcile_skip();
                return None;
            }
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };

        debug!(frame = timestamp.frame, "Reconciling actors");
        let report = self.reconcile();

        if !self.reconcile_cooldown.is_zero() {
            std::thread::sleep(self.reconcile_cooldown);
        }

        Some(report)
    }

    /// Update tick: run one update pass if the update lock is free and the
    /// timestamp advances, then flush outgoing messages.
    pub fn on_update_tick(&self, timestamp: Timestamp) -> TickOutcome {
        if self.bus.is_shutdown() {
            return TickOutcome::Skipped(SkipReason::Shutdown);
        }

        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => {
                self.stats.record_busy_skip();
                return TickOutcome::Skipped(SkipReason::Busy);
            }
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };

        if state.is_stale(timestamp.elapsed_seconds) {
            self.stats.record_stale_skip();
            return TickOutcome::Skipped(SkipReason::Stale);
        }
        state.last_timestamp = Some(timestamp.elapsed_seconds);

        self.bus.update_clock(timestamp);
        let report = self.update_pass(&mut state);
        self.bus.send_msgs();

        self.stats.record_pass(report.failure_count());
        TickOutcome::Updated(report)
    }

    /// Add a pseudo actor, updated after the ones already present
    pub fn add_pseudo_actor(&self, pseudo: Box<dyn PseudoActor>) {
        self.lock_state().pseudo_actors.push(pseudo);
    }

    /// Drain in-flight passes and stop the message bus
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        let _reconcile = self
            .reconcile_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _state = self.lock_state();

        for (id, prefix) in self.take_vehicle_controls() {
            control::unsubscribe(self.bus.as_ref(), id, &prefix);
        }
        self.bus.signal_shutdown("bridge shutdown");
        info!("Exiting bridge");
    }

    /// Block until the message bus stops spinning, then shut down
    pub fn run(&self) {
        self.bus.spin();
        self.shutdown();
    }

    /// Registered actor ids, ascending
    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.lock_state().registry.ids()
    }

    pub fn actor_kind(&self, id: ActorId) -> Option<ActorKind> {
        self.lock_state().registry.kind_of(id)
    }

    /// Parent id of a registered actor; `None` if unknown or a root
    pub fn parent_of(&self, id: ActorId) -> Option<ActorId> {
        self.lock_state()
            .registry
            .get(id)
            .and_then(|actor| actor.parent_id())
    }

    pub fn topic_prefix_of(&self, id: ActorId) -> Option<String> {
        self.lock_state()
            .registry
            .get(id)
            .map(|actor| actor.topic_prefix().to_string())
    }

    /// Creation sequence number of a registered actor
    pub fn created_seq_of(&self, id: ActorId) -> Option<u64> {
        self.lock_state()
            .registry
            .get(id)
            .map(|actor| actor.created_seq())
    }

    pub fn pseudo_actor_count(&self) -> usize {
        self.lock_state().pseudo_actors.len()
    }

    /// Topic prefixes of the pseudo actors, in update order
    pub fn pseudo_actor_topics(&self) -> Vec<String> {
        self.lock_state()
            .pseudo_actors
            .iter()
            .map(|pseudo| pseudo.topic_prefix().to_string())
            .collect()
    }

    /// Ego vehicles currently listening for control input, ascending
    pub fn controlled_vehicles(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self.vehicle_controls.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.lock_state().last_timestamp
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    fn lock_state(&self) -> MutexGuard<'_, UpdateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plan against a copy of the registry, then apply under the update lock.
    /// Only reconciliation mutates the registry and it holds the reconcile
    /// lock, so the copy cannot go stale in between.
    fn reconcile(&self) -> ReconcileReport {
        let live = self.world.actors();
        let known = self.lock_state().registry.known();

        let plan = self.reconciler.plan(self.world.as_ref(), &live, &known);

        let mut guard = self.lock_state();
        let state = &mut *guard;
        let report = self
            .reconciler
            .apply(plan, &mut state.registry, &mut state.pseudo_actors);
        let new_egos: Vec<(ActorId, String)> = report
            .created
            .iter()
            .filter_map(|id| state.registry.get(*id))
            .filter(|actor| actor.kind() == ActorKind::EgoVehicle)
            .map(|actor| (actor.id(), actor.topic_prefix().to_string()))
            .collect();
        drop(guard);

        for id in &report.removed {
            if let Some((id, prefix)) = self.vehicle_controls.remove(id) {
                control::unsubscribe(self.bus.as_ref(), id, &prefix);
            }
        }
        for (id, prefix) in new_egos {
            control::subscribe(&self.world, self.bus.as_ref(), id, &prefix);
            self.vehicle_controls.insert(id, prefix);
        }

        self.stats
            .record_reconcile(report.created.len(), report.removed.len());
        report
    }

    fn take_vehicle_controls(&self) -> Vec<(ActorId, String)> {
        let ids: Vec<ActorId> = self.vehicle_controls.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.vehicle_controls.remove(&id))
            .collect()
    }

    /// Pseudo actors first, in list order; then actors in creation order.
    /// A failing update is logged and the pass moves on.
    fn update_pass(&self, state: &mut UpdateState) -> PassReport {
        let mut report = PassReport::default();
        let UpdateState {
            registry,
            pseudo_actors,
            ..
        } = state;

        let ctx = UpdateContext {
            world: self.world.as_ref(),
            bus: self.bus.as_ref(),
            registry: &*registry,
        };
        for pseudo in pseudo_actors.iter_mut() {
            match pseudo.update(&ctx) {
                Ok(()) => report.pseudo_updated += 1,
                Err(e) => {
                    warn!(
                        actor_type = pseudo.type_name(),
                        topic_prefix = %pseudo.topic_prefix(),
                        error = %e,
                        "Error while updating pseudo actor"
                    );
                    report.pseudo_failures.push((pseudo.type_name(), e.to_string()));
                }
            }
        }

        let mut actors: Vec<_> = registry.iter_mut().collect();
        actors.sort_by_key(|actor| actor.created_seq());

        for actor in actors {
            match actor.update(self.world.as_ref(), self.bus.as_ref()) {
                Ok(()) => report.actors_updated += 1,
                Err(e) => {
                    warn!(
                        actor_type = actor.type_name(),
                        actor_id = actor.id(),
                        error = %e,
                        "Error while updating actor"
                    );
                    report.failures.push((actor.id(), e.to_string()));
                }
            }
        }

        report
    }
}
