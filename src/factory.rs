use crate::actor::{Actor, ActorKind};
use crate::error::FactoryError;
use crate::registry::KnownActor;
use crate::world::{ActorId, ActorSnapshot, SimulationWorld};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Actors resolved during one reconciliation pass, in parent-before-child order.
///
/// Built off the update lock; applied to the registry in one step afterwards.
#[derive(Debug, Default)]
pub struct CreationPlan {
    /// Already-registered actors: id -> topic prefix
    known: HashMap<ActorId, String>,
    created: Vec<Actor>,
    created_index: HashMap<ActorId, usize>,
    in_progress: Vec<ActorId>,
}

impl CreationPlan {
    pub fn new(known: &HashMap<ActorId, KnownActor>) -> Self {
        Self {
            known: known
                .iter()
                .map(|(id, actor)| (*id, actor.topic_prefix.clone()))
                .collect(),
            ..Default::default()
        }
    }

    /// True if `id` is registered or already resolved in this plan
    pub fn contains(&self, id: ActorId) -> bool {
        self.known.contains_key(&id) || self.created_index.contains_key(&id)
    }

    fn topic_prefix(&self, id: ActorId) -> Option<&str> {
        self.known.get(&id).map(String::as_str).or_else(|| {
            self.created_index
                .get(&id)
                .map(|index| self.created[*index].topic_prefix())
        })
    }

    /// Parent link of an actor created by this plan
    pub fn parent_of(&self, id: ActorId) -> Option<ActorId> {
        self.created_index
            .get(&id)
            .and_then(|index| self.created[*index].parent_id())
    }

    pub fn created(&self) -> &[Actor] {
        &self.created
    }

    pub fn into_created(self) -> Vec<Actor> {
        self.created
    }

    /// Fails if `id` is already on the chain being resolved
    fn check_cycle(&self, id: ActorId) -> Result<(), FactoryError> {
        match self.in_progress.iter().position(|pending| *pending == id) {
            Some(pos) => {
                let mut chain = self.in_progress[pos..].to_vec();
                chain.push(id);
                Err(FactoryError::ParentCycle { chain })
            }
            None => Ok(()),
        }
    }

    fn push(&mut self, actor: Actor) {
        self.created_index.insert(actor.id(), self.created.len());
        self.created.push(actor);
    }
}

/// Turns raw world handles into classified actors
#[derive(Clone, Debug, Default)]
pub struct ActorFactory {
    ego_role_names: Vec<String>,
}

impl ActorFactory {
    pub fn new(ego_role_names: Vec<String>) -> Self {
        Self { ego_role_names }
    }

    /// Read the ego role names from the messaging parameters
    /// (`ego_vehicle.role_name`, a list of strings or a single string)
    pub fn from_parameters(parameters: &Value) -> Self {
        let ego_role_names = match parameters.pointer("/ego_vehicle/role_name") {
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(name)) => vec![name.clone()],
            _ => Vec::new(),
        };
        Self::new(ego_role_names)
    }

    pub fn ego_role_names(&self) -> &[String] {
        &self.ego_role_names
    }

    pub fn classify(&self, snapshot: &ActorSnapshot) -> ActorKind {
        ActorKind::classify(&snapshot.type_id, snapshot.role_name(), &self.ego_role_names)
    }

    /// Resolve `snapshot` into the plan, resolving its parent chain first.
    ///
    /// Parents are looked up in the plan, then through the world; a parent the
    /// world cannot describe becomes a placeholder root (see
    /// [`Actor::placeholder`]). Returns the actor's id.
    pub fn resolve(
        &self,
        snapshot: &ActorSnapshot,
        world: &dyn SimulationWorld,
        plan: &mut CreationPlan,
    ) -> Result<ActorId, FactoryError> {
        plan.in_progress.clear();
        let result = self.resolve_chain(snapshot, world, plan);
        plan.in_progress.clear();
        result
    }

    fn resolve_chain(
        &self,
        snapshot: &ActorSnapshot,
        world: &dyn SimulationWorld,
        plan: &mut CreationPlan,
    ) -> Result<ActorId, FactoryError> {
        if plan.contains(snapshot.id) {
            return Ok(snapshot.id);
        }
        plan.check_cycle(snapshot.id)?;

        plan.in_progress.push(snapshot.id);
        if let Some(parent_id) = snapshot.parent {
            if !plan.contains(parent_id) {
                match world.find_actor(parent_id) {
                    Some(parent) => {
                        self.resolve_chain(&parent, world, plan)?;
                    }
                    None => {
                        plan.check_cycle(parent_id)?;
                        debug!(actor_id = snapshot.id, parent_id, "Parent handle unresolvable, using placeholder");
                        plan.push(Actor::placeholder(parent_id));
                    }
                }
            }
        }
        plan.in_progress.pop();

        let parent = snapshot
            .parent
            .and_then(|parent_id| plan.topic_prefix(parent_id).map(|prefix| (parent_id, prefix)));
        let actor = Actor::new(snapshot, self.classify(snapshot), parent);
        plan.push(actor);

        Ok(snapshot.id)
    }
}
