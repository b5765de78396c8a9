// Messaging collaborator: buffered publishing, inbound subscriptions, clock,
// shutdown and parameters

mod buffer;
mod memory;
mod nats;

pub use buffer::{OutboundBuffer, CLOCK_TOPIC, TF_TOPIC};
pub use memory::MemoryBus;
pub use nats::{NatsBus, NatsConfig};


use crate::world::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// One outgoing message, topic-addressed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: Value,
}

/// Handler invoked with the payload of every message received on a topic
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Narrow interface to the messaging middleware.
///
/// `publish` only buffers; nothing leaves the process until `send_msgs`.
pub trait MessageBus: Send + Sync {
    /// True once shutdown has been signalled
    fn is_shutdown(&self) -> bool;

    /// Request shutdown; wakes a blocked `spin`
    fn signal_shutdown(&self, reason: &str);

    /// Block the calling thread until shutdown is requested
    fn spin(&self);

    /// Queue a message for the next flush
    fn publish(&self, topic: &str, payload: Value);

    /// Flush every queued message
    fn send_msgs(&self);

    /// Deliver every message received on `topic` to `handler`, replacing any
    /// handler already registered for it. Handlers run off the tick threads.
    fn subscribe(&self, topic: &str, handler: MessageHandler);

    /// Stop delivering `topic`
    fn unsubscribe(&self, topic: &str);

    /// Advance the clock exposed to subscribers
    fn update_clock(&self, timestamp: Timestamp);

    /// Configuration mapping; must contain `ego_vehicle.role_name`
    fn parameters(&self) -> &Value;
}
