use crate::actor::{Actor, ActorKind};
use crate::world::ActorId;
use std::collections::HashMap;

/// What reconciliation needs to know about a registered actor
#[derive(Clone, Debug, PartialEq)]
pub struct KnownActor {
    pub parent_id: Option<ActorId>,
    pub topic_prefix: String,
}

/// Registered actors keyed by simulator id.
///
/// Every insert stamps the actor with a strictly increasing creation sequence
/// number, which makes parent-before-child registration observable.
#[derive(Debug, Default)]
pub struct Registry {
    actors: HashMap<ActorId, Actor>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor, replacing any previous entry with the same id.
    /// Returns the creation sequence number assigned.
    pub fn insert(&mut self, mut actor: Actor) -> u64 {
        self.next_seq += 1;
        actor.created_seq = self.next_seq;
        self.actors.insert(actor.id(), actor);
        self.next_seq
    }

    pub fn remove(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self.actors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Actor> {
        self.actors.values_mut()
    }

    /// Registered vehicles (ego or not)
    pub fn vehicles(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values().filter(|actor| actor.kind().is_vehicle())
    }

    pub fn kind_of(&self, id: ActorId) -> Option<ActorKind> {
        self.get(id).map(Actor::kind)
    }

    /// Copy of the parent links and topic prefixes, taken so reconciliation can
    /// plan its diff without holding the update lock
    pub fn known(&self) -> HashMap<ActorId, KnownActor> {
        self.actors
            .values()
            .map(|actor| {
                (
                    actor.id(),
                    KnownActor {
                        parent_id: actor.parent_id(),
                        topic_prefix: actor.topic_prefix().to_string(),
                    },
                )
            })
            .collect()
    }
}
