use crate::world::ActorId;
use thiserror::Error;

/// Recoverable failure raised by a single actor's `update()`.
///
/// Never aborts an update pass: the bridge logs it and moves on to the next actor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActorError {
    /// The simulation no longer knows this actor (destroyed between reconciliation passes)
    #[error("actor {id} no longer exists in the simulation")]
    Gone { id: ActorId },

    #[error("actor {id} is missing attribute '{name}'")]
    MissingAttribute { id: ActorId, name: String },

    #[error("actor {id} has invalid attribute '{name}' = '{value}'")]
    InvalidAttribute {
        id: ActorId,
        name: String,
        value: String,
    },
}

/// Structural errors found while resolving an actor's parent chain
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FactoryError {
    /// Following parent links from an actor led back to an actor already on the chain.
    /// `chain` lists the ids on the cycle, starting and ending with the repeated id.
    #[error("parent cycle detected: {chain:?}")]
    ParentCycle { chain: Vec<ActorId> },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
