use super::{PseudoActor, UpdateContext};
use crate::error::ActorError;
use serde_json::json;

/// Publishes the map description once
pub struct MapPublisher {
    topic_prefix: String,
    published: bool,
}

impl MapPublisher {
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            published: false,
        }
    }
}

impl PseudoActor for MapPublisher {
    fn type_name(&self) -> &'static str {
        "Map"
    }

    fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    fn update(&mut self, ctx: &UpdateContext<'_>) -> Result<(), ActorError> {
        if !self.published {
            ctx.bus.publish(
                &self.topic_prefix,
                json!({ "frame_id": "map", "map_name": ctx.world.map_name() }),
            );
            self.published = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{MemoryBus, MessageBus};
    use crate::registry::Registry;
    use crate::world::ScriptedWorld;

    #[test]
    fn test_map_published_once() {
        let world = ScriptedWorld::new("Town05");
        let bus = MemoryBus::new(json!({}));
        let registry = Registry::new();
        let ctx = UpdateContext {
            world: &world,
            bus: &bus,
            registry: &registry,
        };

        let mut map = MapPublisher::new("/map");
        map.update(&ctx).unwrap();
        map.update(&ctx).unwrap();
        bus.send_msgs();

        let maps = bus.messages_on("/map");
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0]["map_name"], "Town05");
    }
}
