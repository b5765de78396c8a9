// Inbound control path: ego vehicles take driver input and autopilot toggles
// from the message bus and forward them to the world

use crate::messaging::MessageBus;
use crate::world::{ActorId, SimulationWorld, VehicleControl};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub const VEHICLE_CONTROL_TOPIC: &str = "vehicle_control_cmd";
pub const AUTOPILOT_TOPIC: &str = "enable_autopilot";

/// Topics an ego vehicle with `prefix` listens on
pub fn control_topics(prefix: &str) -> [String; 2] {
    [
        format!("{}/{}", prefix, VEHICLE_CONTROL_TOPIC),
        format!("{}/{}", prefix, AUTOPILOT_TOPIC),
    ]
}

/// Accepts a bare boolean or `{"data": bool}`
fn parse_autopilot(payload: &Value) -> Option<bool> {
    payload
        .as_bool()
        .or_else(|| payload.get("data").and_then(Value::as_bool))
}

pub(super) fn subscribe(
    world: &Arc<dyn SimulationWorld>,
    bus: &dyn MessageBus,
    id: ActorId,
    prefix: &str,
) {
    let [control_topic, autopilot_topic] = control_topics(prefix);

    let target: Weak<dyn SimulationWorld> = Arc::downgrade(world);
    bus.subscribe(
        &control_topic,
        Arc::new(move |payload: Value| {
            let control: VehicleControl = match serde_json::from_value(payload) {
                Ok(control) => control,
                Err(e) => {
                    warn!(actor_id = id, error = %e, "Ignoring malformed vehicle control command");
                    return;
                }
            };
            let applied = target
                .upgrade()
                .map_or(false, |world| world.apply_control(id, control));
            if !applied {
                debug!(actor_id = id, "Vehicle control for an actor that is gone");
            }
        }),
    );

    let target: Weak<dyn SimulationWorld> = Arc::downgrade(world);
    bus.subscribe(
        &autopilot_topic,
        Arc::new(move |payload: Value| {
            let Some(enabled) = parse_autopilot(&payload) else {
                warn!(actor_id = id, payload = %payload, "Ignoring malformed autopilot toggle");
                return;
            };
            debug!(actor_id = id, enabled, "Ego vehicle: set autopilot");
            let applied = target
                .upgrade()
                .map_or(false, |world| world.set_autopilot(id, enabled));
            if !applied {
                debug!(actor_id = id, "Autopilot toggle for an actor that is gone");
            }
        }),
    );

    info!(actor_id = id, prefix = %prefix, "Listening for vehicle control");
}

pub(super) fn unsubscribe(bus: &dyn MessageBus, id: ActorId, prefix: &str) {
    for topic in control_topics(prefix) {
        bus.unsubscribe(&topic);
    }
    debug!(actor_id = id, prefix = %prefix, "Stopped listening for vehicle control");
}
