// Simulation-world collaborator: actor enumeration and tick callbacks

mod scripted;

pub use scripted::ScriptedWorld;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Simulator-assigned actor id, stable for the lifetime of the simulated object
pub type ActorId = u32;

/// Timestamp delivered with every simulation tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Simulator frame counter
    pub frame: u64,

    /// Simulated seconds since the episode started (monotonic)
    pub elapsed_seconds: f64,

    /// Simulated seconds since the previous tick
    pub delta_seconds: f64,
}

impl Timestamp {
    pub fn new(frame: u64, elapsed_seconds: f64, delta_seconds: f64) -> Self {
        Self {
            frame,
            elapsed_seconds,
            delta_seconds,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Euler rotation in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Vector3,
    pub rotation: Rotation,
}

/// Per-tick kinematic state of a live actor
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub velocity: Vector3,
    #[serde(default)]
    pub acceleration: Vector3,
    /// Half-size of the actor's bounding box
    #[serde(default)]
    pub extent: Vector3,
}

/// Raw handle for one simulated object as enumerated by the world.
///
/// The parent is a handle too: resolve it with [`SimulationWorld::find_actor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,

    /// Blueprint tag such as "vehicle.tesla.model3" or "sensor.camera.rgb"
    pub type_id: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub parent: Option<ActorId>,
}

impl ActorSnapshot {
    pub fn new(id: ActorId, type_id: impl Into<String>) -> Self {
        Self {
            id,
            type_id: type_id.into(),
            attributes: BTreeMap::new(),
            parent: None,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent: ActorId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn role_name(&self) -> Option<&str> {
        self.attribute("role_name")
    }
}

/// Driver input for a vehicle, as received on `{prefix}/vehicle_control_cmd`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleControl {
    /// 0.0 to 1.0
    pub throttle: f64,
    /// -1.0 (left) to 1.0 (right)
    pub steer: f64,
    /// 0.0 to 1.0
    pub brake: f64,
    pub hand_brake: bool,
    pub reverse: bool,
}

/// Callback fired by the world on every simulation tick
pub type TickCallback = Arc<dyn Fn(Timestamp) + Send + Sync>;

/// Narrow interface to the running simulation.
///
/// Tick callbacks may be invoked concurrently from several threads; implementors
/// make no ordering promise between callbacks registered for the same tick.
pub trait SimulationWorld: Send + Sync {
    /// Enumerate every currently live actor
    fn actors(&self) -> Vec<ActorSnapshot>;

    /// Resolve an actor handle by id (used to follow parent links)
    fn find_actor(&self, id: ActorId) -> Option<ActorSnapshot>;

    /// Current kinematic state, or `None` once the actor has been destroyed
    fn actor_state(&self, id: ActorId) -> Option<ActorState>;

    /// Name of the loaded map
    fn map_name(&self) -> String;

    /// Register a callback fired on every tick
    fn on_tick(&self, callback: TickCallback);

    /// Take the measurements a sensor produced since the last call, oldest first
    fn sensor_events(&self, id: ActorId) -> Vec<Value>;

    /// Forward driver input to a vehicle. Returns false if the actor is gone.
    fn apply_control(&self, id: ActorId, control: VehicleControl) -> bool;

    /// Hand a vehicle to (or take it back from) the simulator's autopilot.
    /// Returns false if the actor is gone.
    fn set_autopilot(&self, id: ActorId, enabled: bool) -> bool;
}
