use serde::Serialize;

/// Closed set of bridged actor variants.
///
/// Every blueprint tag maps to exactly one variant; see [`ActorKind::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ActorKind {
    TrafficLight,
    Traffic,
    EgoVehicle,
    Vehicle,
    RgbCamera,
    DepthCamera,
    SemanticSegmentationCamera,
    /// Camera type the bridge does not know how to publish
    Camera,
    Lidar,
    Gnss,
    CollisionSensor,
    LaneInvasionSensor,
    Sensor,
    Spectator,
    Generic,
}

impl ActorKind {
    /// Classify a blueprint tag.
    ///
    /// Total over all tags: anything unrecognised becomes [`ActorKind::Generic`]
    /// (or [`ActorKind::Sensor`] / [`ActorKind::Camera`] inside those families).
    /// A vehicle is an ego vehicle when its `role_name` is one of `ego_role_names`.
    pub fn classify(type_id: &str, role_name: Option<&str>, ego_role_names: &[String]) -> Self {
        if type_id.starts_with("traffic") {
            if type_id == "traffic.traffic_light" {
                ActorKind::TrafficLight
            } else {
                ActorKind::Traffic
            }
        } else if type_id.starts_with("vehicle") {
            let is_ego = role_name
                .map(|role| ego_role_names.iter().any(|ego| ego == role))
                .unwrap_or(false);
            if is_ego {
                ActorKind::EgoVehicle
            } else {
                ActorKind::Vehicle
            }
        } else if type_id.starts_with("sensor") {
            Self::classify_sensor(type_id)
        } else if type_id.starts_with("spectator") {
            ActorKind::Spectator
        } else {
            ActorKind::Generic
        }
    }

    // camera, lidar, gnss, collision, lane invasion; generic sensor only if none matched
    fn classify_sensor(type_id: &str) -> Self {
        if type_id.starts_with("sensor.camera") {
            if type_id.starts_with("sensor.camera.rgb") {
                ActorKind::RgbCamera
            } else if type_id.starts_with("sensor.camera.depth") {
                ActorKind::DepthCamera
            } else if type_id.starts_with("sensor.camera.semantic_segmentation") {
                ActorKind::SemanticSegmentationCamera
            } else {
                ActorKind::Camera
            }
        } else if type_id.starts_with("sensor.lidar") {
            ActorKind::Lidar
        } else if type_id.starts_with("sensor.other.gnss") {
            ActorKind::Gnss
        } else if type_id.starts_with("sensor.other.collision") {
            ActorKind::CollisionSensor
        } else if type_id.starts_with("sensor.other.lane_invasion") {
            ActorKind::LaneInvasionSensor
        } else {
            ActorKind::Sensor
        }
    }

    /// Human-readable variant name used in logs
    pub fn type_name(&self) -> &'static str {
        match self {
            ActorKind::TrafficLight => "TrafficLight",
            ActorKind::Traffic => "Traffic",
            ActorKind::EgoVehicle => "EgoVehicle",
            ActorKind::Vehicle => "Vehicle",
            ActorKind::RgbCamera => "RgbCamera",
            ActorKind::DepthCamera => "DepthCamera",
            ActorKind::SemanticSegmentationCamera => "SemanticSegmentationCamera",
            ActorKind::Camera => "Camera",
            ActorKind::Lidar => "Lidar",
            ActorKind::Gnss => "Gnss",
            ActorKind::CollisionSensor => "CollisionSensor",
            ActorKind::LaneInvasionSensor => "LaneInvasionSensor",
            ActorKind::Sensor => "Sensor",
            ActorKind::Spectator => "Spectator",
            ActorKind::Generic => "Actor",
        }
    }

    pub fn is_vehicle(&self) -> bool {
        matches!(self, ActorKind::EgoVehicle | ActorKind::Vehicle)
    }
}
