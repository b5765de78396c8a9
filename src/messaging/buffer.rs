use super::Message;
use serde_json::{json, Value};

/// Topic for transform messages; merged into a single message per flush
pub const TF_TOPIC: &str = "tf";

/// Topic carrying the simulation clock
pub const CLOCK_TOPIC: &str = "clock";

/// Collects messages published during one update pass.
///
/// Transforms are accumulated separately and emitted as one `tf` message
/// holding all of them, ahead of the other messages.
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    transforms: Vec<Value>,
    messages: Vec<Message>,
}

impl OutboundBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, topic: &str, payload: Value) {
        if topic == TF_TOPIC {
            self.transforms.push(payload);
        } else {
            self.messages.push(Message {
                topic: topic.to_string(),
                payload,
            });
        }
    }

    /// Take everything queued, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<Message> {
        let mut batch = Vec::with_capacity(self.messages.len() + 1);

        if !self.transforms.is_empty() {
            batch.push(Message {
                topic: TF_TOPIC.to_string(),
                payload: json!({ "transforms": std::mem::take(&mut self.transforms) }),
            });
        }
        batch.append(&mut self.messages);

        batch
    }

    /// Number of messages a flush would emit right now
    pub fn len(&self) -> usize {
        self.messages.len() + usize::from(!self.transforms.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
