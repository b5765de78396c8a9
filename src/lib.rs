// Error taxonomy
pub mod error;

// Configuration loading
pub mod config;

// Simulation world collaborator
pub mod world;

// Message bus collaborator
pub mod messaging;

// Bridged actors and their classification
pub mod actor;

// Actors with no backing simulation object
pub mod pseudo;

// Registered actors
pub mod registry;

// Parent-first actor resolution
pub mod factory;

// Registry vs live world diffing
pub mod reconcile;

// Tick handling and lifecycle
pub mod bridge;

// Pass counters
pub mod stats;

pub use bridge::{Bridge, BridgeOptions, PassReport, SkipReason, TickOutcome};
pub use reconcile::{ReconcileReport, ScopedPublisherPolicy};
