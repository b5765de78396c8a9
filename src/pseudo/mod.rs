// Pseudo actors: bridged publishers with no backing simulation object

mod map;
mod objects;

pub use map::MapPublisher;
pub use objects::ObjectListPublisher;

use crate::error::ActorError;
use crate::messaging::MessageBus;
use crate::registry::Registry;
use crate::world::{ActorId, SimulationWorld};

/// Everything a pseudo actor may read during an update pass
pub struct UpdateContext<'a> {
    pub world: &'a dyn SimulationWorld,
    pub bus: &'a dyn MessageBus,
    pub registry: &'a Registry,
}

/// A synthetic publisher updated once per pass, before the registered actors.
///
/// Implementations must not block: they run under the update lock.
pub trait PseudoActor: Send {
    /// Human-readable name used in logs
    fn type_name(&self) -> &'static str;

    fn topic_prefix(&self) -> &str;

    /// Actor this publisher is scoped to, if any
    fn parent_id(&self) -> Option<ActorId> {
        None
    }

    fn update(&mut self, ctx: &UpdateContext<'_>) -> Result<(), ActorError>;
}
