use super::{MessageBus, MessageHandler, OutboundBuffer, CLOCK_TOPIC};
use crate::world::Timestamp;
use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Prepended to every topic; "/" in topics becomes "."
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

fn default_subject_prefix() -> String {
    "carla".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

/// Message bus publishing JSON payloads to NATS subjects.
///
/// Flushing and spinning block on the tokio runtime the bus was connected on,
/// so both must be called from threads outside that runtime (tick callback
/// threads, or the main thread). Each subscription is a task on that runtime.
pub struct NatsBus {
    client: async_nats::Client,
    runtime: Handle,
    subject_prefix: String,
    parameters: Value,
    buffer: Mutex<OutboundBuffer>,
    subscriptions: DashMap<String, JoinHandle<()>>,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl NatsBus {
    /// Connect to NATS. Must be awaited inside the runtime that will serve the bus.
    pub async fn connect(config: &NatsConfig, parameters: Value) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        info!(subject_prefix = %config.subject_prefix, "Connected to NATS");

        Ok(Self {
            client,
            runtime: Handle::current(),
            subject_prefix: config.subject_prefix.clone(),
            parameters,
            buffer: Mutex::new(OutboundBuffer::new()),
            subscriptions: DashMap::new(),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        })
    }

    /// Map a topic such as "/map" or "camera/rgb/front" to a NATS subject
    pub fn subject_for(prefix: &str, topic: &str) -> String {
        let topic = topic.trim_matches('/').replace('/', ".");
        if prefix.is_empty() {
            topic
        } else {
            format!("{}.{}", prefix, topic)
        }
    }
}

impl MessageBus for NatsBus {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn signal_shutdown(&self, reason: &str) {
        info!(reason = %reason, "Shutdown signalled");
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();
    }

    fn spin(&self) {
        self.runtime.block_on(async {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Failed to listen for ctrl_c signal");
                    }
                    info!("Shutdown signal received");
                }
                _ = self.shutdown_notify.notified() => {}
            }
        });
    }

    fn publish(&self, topic: &str, payload: Value) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(topic, payload);
    }

    fn send_msgs(&self) {
        let batch = self
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain();
        if batch.is_empty() {
            return;
        }

        self.runtime.block_on(async {
            for message in &batch {
                let subject = Self::subject_for(&self.subject_prefix, &message.topic);
                let payload = match serde_json::to_vec(&message.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(subject = %subject, error = %e, "Failed to serialize message on publishing");
                        continue;
                    }
                };

                if let Err(e) = self.client.publish(subject.clone(), payload.into()).await {
                    warn!(subject = %subject, error = %e, "Failed to publish message");
                }
            }

            if let Err(e) = self.client.flush().await {
                warn!(error = %e, "Failed to flush NATS connection");
            }
        });

        debug!(messages = batch.len(), "Flushed outgoing messages");
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) {
        let subject = Self::subject_for(&self.subject_prefix, topic);
        let client = self.client.clone();

        let task = self.runtime.spawn(async move {
            let mut messages = match client.subscribe(subject.clone()).await {
                Ok(subscriber) => subscriber,
                Err(e) => {
                    error!(subject = %subject, error = %e, "Failed to subscribe");
                    return;
                }
            };
            info!(subject = %subject, "Subscribed");

            while let Some(message) = messages.next().await {
                match serde_json::from_slice::<Value>(&message.payload) {
                    Ok(payload) => handler(payload),
                    Err(e) => {
                        warn!(subject = %subject, error = %e, "Failed to deserialize inbound message, skipping");
                    }
                }
            }
        });

        if let Some(previous) = self.subscriptions.insert(topic.to_string(), task) {
            previous.abort();
        }
    }

    fn unsubscribe(&self, topic: &str) {
        // dropping the subscriber with its task unsubscribes on the server
        if let Some((_, task)) = self.subscriptions.remove(topic) {
            task.abort();
            debug!(topic = %topic, "Unsubscribed");
        }
    }

    fn update_clock(&self, timestamp: Timestamp) {
        self.publish(CLOCK_TOPIC, json!({ "seconds": timestamp.elapsed_seconds }));
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }
}
