use super::{PseudoActor, UpdateContext};
use crate::error::ActorError;
use crate::world::ActorId;
use serde_json::{json, Value};

/// Publishes every registered vehicle as an object list.
///
/// A scoped publisher belongs to one ego vehicle: it lives under that vehicle's
/// topic prefix and leaves the vehicle itself out of the list.
pub struct ObjectListPublisher {
    topic_prefix: String,
    filtered_id: Option<ActorId>,
}

impl ObjectListPublisher {
    /// Whole-world publisher covering all vehicles
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            filtered_id: None,
        }
    }

    /// Publisher for one ego vehicle, on `{ego_prefix}/objects`
    pub fn scoped(ego_id: ActorId, ego_prefix: &str) -> Self {
        Self {
            topic_prefix: format!("{}/objects", ego_prefix),
            filtered_id: Some(ego_id),
        }
    }
}

impl PseudoActor for ObjectListPublisher {
    fn type_name(&self) -> &'static str {
        "ObjectSensor"
    }

    fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    fn parent_id(&self) -> Option<ActorId> {
        self.filtered_id
    }

    fn update(&mut self, ctx: &UpdateContext<'_>) -> Result<(), ActorError> {
        let mut vehicles: Vec<_> = ctx
            .registry
            .vehicles()
            .filter(|actor| Some(actor.id()) != self.filtered_id)
            .collect();
        vehicles.sort_by_key(|actor| actor.id());

        // vehicles destroyed since the last reconciliation are skipped, not reported
        let objects: Vec<Value> = vehicles
            .into_iter()
            .filter_map(|actor| {
                ctx.world
                    .actor_state(actor.id())
                    .map(|state| actor.object_info(&state))
            })
            .collect();

        ctx.bus.publish(
            &self.topic_prefix,
            json!({ "frame_id": "map", "objects": objects }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorKind};
    use crate::messaging::{MemoryBus, MessageBus};
    use crate::registry::Registry;
    use crate::world::{ActorSnapshot, ScriptedWorld};

    fn setup() -> (ScriptedWorld, Registry) {
        let world = ScriptedWorld::new("Town01");
        let mut registry = Registry::new();
        for (id, type_id, kind) in [
            (1, "vehicle.tesla", ActorKind::EgoVehicle),
            (2, "vehicle.audi", ActorKind::Vehicle),
            (3, "sensor.other.gnss", ActorKind::Gnss),
        ] {
            let snapshot = ActorSnapshot::new(id, type_id).with_attribute("role_name", "hero");
            world.spawn(snapshot.clone());
            registry.insert(Actor::new(&snapshot, kind, None));
        }
        (world, registry)
    }

    #[test]
    fn test_unscoped_lists_all_vehicles() {
        let (world, registry) = setup();
        let bus = MemoryBus::new(json!({}));
        let ctx = UpdateContext {
            world: &world,
            bus: &bus,
            registry: &registry,
        };

        let mut publisher = ObjectListPublisher::new("objects");
        publisher.update(&ctx).unwrap();
        bus.send_msgs();

        let objects = bus.latest("objects").unwrap()["objects"].clone();
        let ids: Vec<u64> = objects
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(publisher.parent_id(), None);
    }

    #[test]
    fn test_scoped_excludes_own_vehicle() {
        let (world, registry) = setup();
        let bus = MemoryBus::new(json!({}));
        let ctx = UpdateContext {
            world: &world,
            bus: &bus,
            registry: &registry,
        };

        let mut publisher = ObjectListPublisher::scoped(1, "hero");
        assert_eq!(publisher.topic_prefix(), "hero/objects");
        assert_eq!(publisher.parent_id(), Some(1));

        publisher.update(&ctx).unwrap();
        bus.send_msgs();

        let list = bus.latest("hero/objects").unwrap();
        let objects = list["objects"].as_array().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["id"], 2);
    }

    #[test]
    fn test_destroyed_vehicles_skipped() {
        let (world, registry) = setup();
        world.destroy(2);
        let bus = MemoryBus::new(json!({}));
        let ctx = UpdateContext {
            world: &world,
            bus: &bus,
            registry: &registry,
        };

        ObjectListPublisher::new("objects").update(&ctx).unwrap();
        bus.send_msgs();

        assert_eq!(bus.latest("objects").unwrap()["objects"].as_array().unwrap().len(), 1);
    }
}
