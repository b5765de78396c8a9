use super::{
    ActorId, ActorSnapshot, ActorState, SimulationWorld, TickCallback, Timestamp, VehicleControl,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// In-memory simulation world.
///
/// Actors are spawned and destroyed by hand (or loaded from a JSON scenario) and
/// ticks are fired explicitly, which makes the bridge drivable without a simulator.
pub struct ScriptedWorld {
    map_name: String,
    actors: RwLock<BTreeMap<ActorId, ScriptedActor>>,
    callbacks: RwLock<Vec<TickCallback>>,
    clock: Mutex<Timestamp>,
}

#[derive(Clone, Debug, Deserialize)]
struct ScriptedActor {
    #[serde(flatten)]
    snapshot: ActorSnapshot,
    #[serde(default)]
    state: ActorState,
    /// Measurements waiting to be taken by the bridge
    #[serde(default)]
    sensor_events: Vec<Value>,
    #[serde(skip)]
    control: Option<VehicleControl>,
    #[serde(skip)]
    autopilot: bool,
}

impl ScriptedActor {
    fn new(snapshot: ActorSnapshot, state: ActorState) -> Self {
        Self {
            snapshot,
            state,
            sensor_events: Vec::new(),
            control: None,
            autopilot: false,
        }
    }
}

/// JSON scenario file layout
#[derive(Debug, Deserialize)]
struct Scenario {
    map: String,
    #[serde(default)]
    actors: Vec<ScriptedActor>,
}

impl ScriptedWorld {
    pub fn new(map_name: impl Into<String>) -> Self {
        Self {
            map_name: map_name.into(),
            actors: RwLock::new(BTreeMap::new()),
            callbacks: RwLock::new(Vec::new()),
            clock: Mutex::new(Timestamp::default()),
        }
    }

    /// Load a world from a JSON scenario:
    ///
    /// ```json
    /// { "map": "Town01",
    ///   "actors": [ { "id": 1, "type_id": "vehicle.tesla", "attributes": { "role_name": "hero" } } ] }
    /// ```
    pub fn from_scenario(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario '{}'", path.display()))?;
        let scenario: Scenario =
            serde_json::from_str(&contents).context("Failed to parse scenario JSON")?;

        let world = Self::new(scenario.map);
        world
            .actors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(scenario.actors.into_iter().map(|actor| (actor.snapshot.id, actor)));

        info!(
            path = %path.display(),
            map = %world.map_name,
            actors = world.actor_count(),
            "Loaded scenario"
        );
        Ok(world)
    }

    /// Add an actor at the origin
    pub fn spawn(&self, snapshot: ActorSnapshot) {
        self.spawn_with_state(snapshot, ActorState::default());
    }

    pub fn spawn_with_state(&self, snapshot: ActorSnapshot, state: ActorState) {
        debug!(actor_id = snapshot.id, type_id = %snapshot.type_id, "Spawning actor");
        self.actors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.id, ScriptedActor::new(snapshot, state));
    }

    /// Remove an actor. Returns false if it did not exist.
    pub fn destroy(&self, id: ActorId) -> bool {
        self.actors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Overwrite an actor's kinematic state. Returns false if it does not exist.
    pub fn set_state(&self, id: ActorId, state: ActorState) -> bool {
        self.with_actor(id, |actor| actor.state = state)
    }

    /// Queue a measurement for a sensor. Returns false if it does not exist.
    pub fn push_sensor_event(&self, id: ActorId, event: Value) -> bool {
        self.with_actor(id, |actor| actor.sensor_events.push(event))
    }

    /// Last control applied to a vehicle
    pub fn last_control(&self, id: ActorId) -> Option<VehicleControl> {
        self.actors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .and_then(|actor| actor.control)
    }

    /// Whether the autopilot drives `id`; `None` if the actor does not exist
    pub fn autopilot(&self, id: ActorId) -> Option<bool> {
        self.actors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|actor| actor.autopilot)
    }

    pub fn actor_count(&self) -> usize {
        self.actors.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Advance the world clock by `delta_seconds` and fire a tick
    pub fn advance(&self, delta_seconds: f64) -> Vec<JoinHandle<()>> {
        let timestamp = {
            let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
            *clock = Timestamp::new(
                clock.frame + 1,
                clock.elapsed_seconds + delta_seconds,
                delta_seconds,
            );
            *clock
        };
        self.tick(timestamp)
    }

    /// Fire every registered callback with `timestamp`, each on its own thread,
    /// the way the simulator delivers ticks from its worker pool.
    pub fn tick(&self, timestamp: Timestamp) -> Vec<JoinHandle<()>> {
        self.registered_callbacks()
            .into_iter()
            .map(|callback| thread::spawn(move || callback(timestamp)))
            .collect()
    }

    /// Fire every registered callback sequentially on the calling thread
    pub fn tick_inline(&self, timestamp: Timestamp) {
        for callback in self.registered_callbacks() {
            callback(timestamp);
        }
    }

    fn with_actor(&self, id: ActorId, f: impl FnOnce(&mut ScriptedActor)) -> bool {
        match self
            .actors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            Some(actor) => {
                f(actor);
                true
            }
            None => false,
        }
    }

    fn registered_callbacks(&self) -> Vec<TickCallback> {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SimulationWorld for ScriptedWorld {
    fn actors(&self) -> Vec<ActorSnapshot> {
        self.actors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|actor| actor.snapshot.clone())
            .collect()
    }

    fn find_actor(&self, id: ActorId) -> Option<ActorSnapshot> {
        self.actors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|actor| actor.snapshot.clone())
    }

    fn actor_state(&self, id: ActorId) -> Option<ActorState> {
        self.actors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|actor| actor.state)
    }

    fn map_name(&self) -> String {
        self.map_name.clone()
    }

    fn on_tick(&self, callback: TickCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    fn sensor_events(&self, id: ActorId) -> Vec<Value> {
        self.actors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
            .map(|actor| std::mem::take(&mut actor.sensor_events))
            .unwrap_or_default()
    }

    fn apply_control(&self, id: ActorId, control: VehicleControl) -> bool {
        debug!(actor_id = id, ?control, "Applying vehicle control");
        self.with_actor(id, |actor| actor.control = Some(control))
    }

    fn set_autopilot(&self, id: ActorId, enabled: bool) -> bool {
        debug!(actor_id = id, enabled, "Setting autopilot");
        self.with_actor(id, |actor| actor.autopilot = enabled)
    }
}
