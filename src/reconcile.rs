use crate::actor::{Actor, ActorKind};
use crate::factory::{ActorFactory, CreationPlan};
use crate::pseudo::{ObjectListPublisher, PseudoActor};
use crate::registry::{KnownActor, Registry};
use crate::world::{ActorId, ActorSnapshot, SimulationWorld};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};

/// What happens to an ego vehicle's scoped object-list publisher when the
/// vehicle is removed from the registry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopedPublisherPolicy {
    /// Keep publishing (an empty-or-stale list) after the vehicle is gone
    #[default]
    Retain,
    /// Remove the publisher together with its vehicle
    DropWithVehicle,
}

/// Create/delete diff computed without touching the registry
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// New actors, parents before children
    pub created: Vec<Actor>,
    /// Registered ids no longer alive, ascending
    pub removed: Vec<ActorId>,
    /// Live ids that could not be created (parent cycles)
    pub rejected: Vec<ActorId>,
}

/// Outcome of one reconciliation pass
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub created: Vec<ActorId>,
    pub removed: Vec<ActorId>,
    pub rejected: Vec<ActorId>,
    pub scoped_publishers_added: usize,
    pub scoped_publishers_dropped: usize,
}

/// Keeps the registry consistent with the live world enumeration
#[derive(Clone, Debug)]
pub struct Reconciler {
    factory: ActorFactory,
    policy: ScopedPublisherPolicy,
}

impl Reconciler {
    pub fn new(factory: ActorFactory, policy: ScopedPublisherPolicy) -> Self {
        Self { factory, policy }
    }

    /// Diff the live enumeration against a copy of the registry.
    ///
    /// An actor counts as alive if it is enumerated or is an ancestor of an
    /// enumerated actor (a live child's parent handle proves the parent exists).
    pub fn plan(
        &self,
        world: &dyn SimulationWorld,
        live: &[ActorSnapshot],
        known: &HashMap<ActorId, KnownActor>,
    ) -> ReconcilePlan {
        let mut creation = CreationPlan::new(known);
        let mut rejected = Vec::new();

        for snapshot in live {
            if creation.contains(snapshot.id) {
                continue;
            }
            if let Err(e) = self.factory.resolve(snapshot, world, &mut creation) {
                error!(actor_id = snapshot.id, type_id = %snapshot.type_id, error = %e, "Failed to create actor");
                rejected.push(snapshot.id);
            }
        }

        let alive = live_ids(live, known, &creation);
        let mut removed: Vec<ActorId> = known
            .keys()
            .filter(|id| !alive.contains(id))
            .copied()
            .collect();
        removed.sort_unstable();

        ReconcilePlan {
            created: creation.into_created(),
            removed,
            rejected,
        }
    }

    /// Apply a plan in one step. Callers hold the update lock.
    pub fn apply(
        &self,
        plan: ReconcilePlan,
        registry: &mut Registry,
        pseudo_actors: &mut Vec<Box<dyn PseudoActor>>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport {
            rejected: plan.rejected,
            ..Default::default()
        };

        for actor in plan.created {
            info!(
                actor_type = actor.type_name(),
                actor_id = actor.id(),
                parent_id = ?actor.parent_id(),
                type_id = %actor.type_id(),
                prefix = %actor.topic_prefix(),
                attributes = ?actor.attributes(),
                "Created actor"
            );

            if actor.kind() == ActorKind::EgoVehicle {
                pseudo_actors.push(Box::new(ObjectListPublisher::scoped(
                    actor.id(),
                    actor.topic_prefix(),
                )));
                report.scoped_publishers_added += 1;
            }

            report.created.push(actor.id());
            registry.insert(actor);
        }

        for id in plan.removed {
            warn!(actor_id = id, "Remove actor");
            registry.remove(id);

            if self.policy == ScopedPublisherPolicy::DropWithVehicle {
                let before = pseudo_actors.len();
                pseudo_actors.retain(|pseudo| pseudo.parent_id() != Some(id));
                report.scoped_publishers_dropped += before - pseudo_actors.len();
            }

            report.removed.push(id);
        }

        report
    }
}

/// Enumerated ids plus every ancestor reachable through parent links
fn live_ids(
    live: &[ActorSnapshot],
    known: &HashMap<ActorId, KnownActor>,
    creation: &CreationPlan,
) -> HashSet<ActorId> {
    let mut ids = HashSet::with_capacity(live.len());

    for snapshot in live {
        ids.insert(snapshot.id);

        let mut next = snapshot.parent;
        while let Some(parent_id) = next {
            if !ids.insert(parent_id) {
                break;
            }
            next = known
                .get(&parent_id)
                .and_then(|actor| actor.parent_id)
                .or_else(|| creation.parent_of(parent_id));
        }
    }

    ids
}
