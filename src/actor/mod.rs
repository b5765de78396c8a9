// Bridged actors: one per simulated object

mod kind;

pub use kind::ActorKind;


use crate::error::ActorError;
use crate::messaging::{MessageBus, TF_TOPIC};
use crate::world::{ActorId, ActorSnapshot, ActorState, SimulationWorld, Transform};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Frame used for actors without a parent
pub const ROOT_FRAME: &str = "map";

/// Topic all vehicle markers are published on
pub const MARKER_TOPIC: &str = "vehicle_marker";

/// Object classification taken from a vehicle's `object_type` attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Unknown,
    Car,
    Bike,
    Motorcycle,
    Truck,
    Vehicle,
}

impl ObjectClass {
    fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("car") => ObjectClass::Car,
            Some("bike") => ObjectClass::Bike,
            Some("motorcycle") => ObjectClass::Motorcycle,
            Some("truck") => ObjectClass::Truck,
            Some("other") => ObjectClass::Vehicle,
            _ => ObjectClass::Unknown,
        }
    }
}

/// A simulated object bridged to the messaging side.
///
/// Identity, parent link and topic prefix are fixed at creation. `update()` reads
/// the actor's current state from the world and publishes it according to its
/// [`ActorKind`].
#[derive(Debug)]
pub struct Actor {
    id: ActorId,
    parent_id: Option<ActorId>,
    kind: ActorKind,
    type_id: String,
    attributes: BTreeMap<String, String>,
    topic_prefix: String,
    parent_frame: String,
    classification: ObjectClass,
    classification_age: u64,
    /// Built once at creation; `None` for non-cameras and misconfigured cameras
    camera_info: Option<Value>,
    info_published: bool,
    /// Stands in for a parent the world could not describe
    placeholder: bool,
    pub(crate) created_seq: u64,
}

impl Actor {
    /// Build an actor from its raw handle.
    ///
    /// `parent` is the already-resolved parent's id and topic prefix.
    pub fn new(snapshot: &ActorSnapshot, kind: ActorKind, parent: Option<(ActorId, &str)>) -> Self {
        let topic_prefix = Self::default_topic_prefix(snapshot, kind);

        if kind == ActorKind::Camera {
            warn!(
                actor_id = snapshot.id,
                parent_id = ?parent.map(|(id, _)| id),
                type_id = %snapshot.type_id,
                attributes = ?snapshot.attributes,
                "Created unsupported camera actor"
            );
        }

        let mut actor = Self {
            id: snapshot.id,
            parent_id: parent.map(|(id, _)| id),
            kind,
            type_id: snapshot.type_id.clone(),
            attributes: snapshot.attributes.clone(),
            topic_prefix,
            parent_frame: parent
                .map(|(_, prefix)| prefix.to_string())
                .unwrap_or_else(|| ROOT_FRAME.to_string()),
            classification: if kind.is_vehicle() {
                ObjectClass::from_attribute(snapshot.attribute("object_type"))
            } else {
                ObjectClass::Unknown
            },
            classification_age: 0,
            camera_info: None,
            info_published: false,
            placeholder: false,
            created_seq: 0,
        };

        if matches!(
            kind,
            ActorKind::RgbCamera | ActorKind::DepthCamera | ActorKind::SemanticSegmentationCamera
        ) {
            match actor.camera_info() {
                Ok(info) => actor.camera_info = Some(info),
                Err(e) => warn!(
                    actor_id = actor.id,
                    prefix = %actor.topic_prefix,
                    error = %e,
                    "Camera attributes unusable, publishing transforms only"
                ),
            }
        }

        actor
    }

    /// Generic root actor for a parent id the world cannot describe.
    ///
    /// Publishes an identity transform under the root frame for as long as the
    /// world has no state for it, so its children's frames stay connected.
    pub fn placeholder(id: ActorId) -> Self {
        let mut actor = Self::new(&ActorSnapshot::new(id, ""), ActorKind::Generic, None);
        actor.placeholder = true;
        actor
    }

    fn default_topic_prefix(snapshot: &ActorSnapshot, kind: ActorKind) -> String {
        let role_name = snapshot.role_name().unwrap_or("default");
        match kind {
            ActorKind::TrafficLight => "traffic.traffic_light".to_string(),
            ActorKind::Traffic => "traffic".to_string(),
            ActorKind::EgoVehicle => role_name.to_string(),
            ActorKind::Vehicle => format!("vehicle/{:03}", snapshot.id),
            ActorKind::RgbCamera => format!("camera/rgb/{}", role_name),
            ActorKind::DepthCamera => format!("camera/depth/{}", role_name),
            ActorKind::SemanticSegmentationCamera => {
                format!("camera/semantic_segmentation/{}", role_name)
            }
            ActorKind::Camera => "camera".to_string(),
            ActorKind::Lidar => format!("lidar/{}", role_name),
            ActorKind::Gnss => format!("gnss/{}", role_name),
            ActorKind::CollisionSensor => "collision".to_string(),
            ActorKind::LaneInvasionSensor | ActorKind::Sensor => "sensor".to_string(),
            ActorKind::Spectator => "spectator".to_string(),
            ActorKind::Generic => "actor".to_string(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn parent_id(&self) -> Option<ActorId> {
        self.parent_id
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Position in registry insertion order (0 until registered)
    pub fn created_seq(&self) -> u64 {
        self.created_seq
    }

    /// Publish this actor's current state, then any sensor measurements the
    /// world produced since the last update.
    ///
    /// Fails with [`ActorError::Gone`] if the world no longer knows the actor.
    pub fn update(
        &mut self,
        world: &dyn SimulationWorld,
        bus: &dyn MessageBus,
    ) -> Result<(), ActorError> {
        let state = match world.actor_state(self.id) {
            Some(state) => state,
            None if self.placeholder => {
                self.publish_transform(&Transform::default(), bus);
                return Ok(());
            }
            None => return Err(ActorError::Gone { id: self.id }),
        };

        match self.kind {
            ActorKind::EgoVehicle => {
                if !self.info_published {
                    bus.publish(
                        &format!("{}/vehicle_info", self.topic_prefix),
                        json!({
                            "id": self.id,
                            "type": self.type_id,
                            "rolename": self.attributes.get("role_name"),
                        }),
                    );
                    self.info_published = true;
                }
                bus.publish(
                    &format!("{}/vehicle_status", self.topic_prefix),
                    json!({
                        "velocity": state.velocity.length(),
                        "acceleration": state.acceleration.length(),
                        "orientation": state.transform.rotation,
                    }),
                );
                self.publish_vehicle(&state, bus);
            }
            ActorKind::Vehicle => self.publish_vehicle(&state, bus),
            ActorKind::RgbCamera | ActorKind::DepthCamera | ActorKind::SemanticSegmentationCamera => {
                self.publish_transform(&state.transform, bus);
                if !self.info_published {
                    if let Some(info) = &self.camera_info {
                        bus.publish(&format!("{}/camera_info", self.topic_prefix), info.clone());
                        self.info_published = true;
                    }
                }
            }
            ActorKind::Lidar => {
                // the point cloud arrives already rotated: keep yaw only
                let mut transform = state.transform;
                transform.rotation.roll = 0.0;
                transform.rotation.pitch = 0.0;
                self.publish_transform(&transform, bus);
            }
            _ => self.publish_transform(&state.transform, bus),
        }

        self.publish_sensor_events(world, bus);
        Ok(())
    }

    /// Object description consumed by object-list publishers
    pub fn object_info(&self, state: &ActorState) -> Value {
        let mut object = json!({
            "id": self.id,
            "transform": state.transform,
            "velocity": state.velocity,
            "accel": state.acceleration,
            "dimensions": [state.extent.x * 2.0, state.extent.y * 2.0, state.extent.z * 2.0],
            "object_classified": false,
        });

        if self.classification != ObjectClass::Unknown {
            object["object_classified"] = json!(true);
            object["classification"] = json!(self.classification);
            object["classification_certainty"] = json!(1.0);
            object["classification_age"] = json!(self.classification_age);
        }

        object
    }

    fn publish_vehicle(&mut self, state: &ActorState, bus: &dyn MessageBus) {
        self.classification_age += 1;
        self.publish_transform(&state.transform, bus);

        let color = if self.kind == ActorKind::EgoVehicle {
            [0, 255, 0]
        } else {
            [255, 0, 0]
        };
        bus.publish(
            MARKER_TOPIC,
            json!({
                "frame_id": self.topic_prefix,
                "id": self.id,
                "text": format!("id = {}", self.id),
                "color": { "r": color[0], "g": color[1], "b": color[2], "a": 0.3 },
                "scale": [state.extent.x * 2.0, state.extent.y * 2.0, state.extent.z * 2.0],
            }),
        );
    }

    /// Topic measurements are published on; `None` for actors that are not
    /// sensors or whose measurements are not bridged
    fn sensor_topic(&self) -> Option<String> {
        let prefix = &self.topic_prefix;
        match self.kind {
            ActorKind::RgbCamera => Some(format!("{}/image_color", prefix)),
            ActorKind::DepthCamera => Some(format!("{}/image_depth", prefix)),
            ActorKind::SemanticSegmentationCamera => Some(format!("{}/image_segmentation", prefix)),
            ActorKind::Lidar => Some(format!("{}/point_cloud", prefix)),
            ActorKind::Gnss => Some(format!("{}/fix", prefix)),
            ActorKind::CollisionSensor => Some(prefix.clone()),
            ActorKind::LaneInvasionSensor => Some(format!("{}/lane_invasion", prefix)),
            _ => None,
        }
    }

    fn publish_sensor_events(&self, world: &dyn SimulationWorld, bus: &dyn MessageBus) {
        let topic = match self.sensor_topic() {
            Some(topic) => topic,
            None => {
                if matches!(self.kind, ActorKind::Camera | ActorKind::Sensor) {
                    let dropped = world.sensor_events(self.id).len();
                    if dropped > 0 {
                        debug!(actor_id = self.id, dropped, "Dropping measurements of unsupported sensor");
                    }
                }
                return;
            }
        };

        for mut event in world.sensor_events(self.id) {
            if let Some(info) = &self.camera_info {
                let sized = event.get("width").is_some() || event.get("height").is_some();
                if sized
                    && (event.get("width") != info.get("width")
                        || event.get("height") != info.get("height"))
                {
                    warn!(
                        actor_id = self.id,
                        prefix = %self.topic_prefix,
                        "Camera received image not matching configuration"
                    );
                }
            }
            if let Value::Object(fields) = &mut event {
                fields
                    .entry("frame_id")
                    .or_insert_with(|| Value::String(self.topic_prefix.clone()));
            }
            bus.publish(&topic, event);
        }
    }

    fn publish_transform(&self, transform: &Transform, bus: &dyn MessageBus) {
        bus.publish(
            TF_TOPIC,
            json!({
                "frame_id": self.parent_frame,
                "child_frame_id": self.topic_prefix,
                "transform": transform,
            }),
        );
    }

    /// Pinhole camera model from the blueprint attributes (plumb bob, no distortion)
    pub fn camera_info(&self) -> Result<Value, ActorError> {
        let width: u32 = self.parse_attribute("image_size_x")?;
        let height: u32 = self.parse_attribute("image_size_y")?;
        let fov: f64 = self.parse_attribute("fov")?;

        let cx = f64::from(width) / 2.0;
        let cy = f64::from(height) / 2.0;
        let fx = f64::from(width) / (2.0 * (fov * std::f64::consts::PI / 360.0).tan());
        let fy = fx;

        Ok(json!({
            "width": width,
            "height": height,
            "distortion_model": "plumb_bob",
            "D": [0.0, 0.0, 0.0, 0.0, 0.0],
            "K": [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            "R": [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            "P": [fx, 0.0, cx, 0.0, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        }))
    }

    fn parse_attribute<T: FromStr>(&self, name: &str) -> Result<T, ActorError> {
        let value = self
            .attributes
            .get(name)
            .ok_or_else(|| ActorError::MissingAttribute {
                id: self.id,
                name: name.to_string(),
            })?;

        value.parse().map_err(|_| ActorError::InvalidAttribute {
            id: self.id,
            name: name.to_string(),
            value: value.clone(),
        })
    }
}
