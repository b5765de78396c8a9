use super::{Message, MessageBus, MessageHandler, OutboundBuffer, CLOCK_TOPIC};
use crate::world::Timestamp;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use tracing::{debug, info};

/// Flushed batches kept by default; older ones are discarded
const DEFAULT_BATCH_RETENTION: usize = 1024;

/// Message bus that keeps flushed batches in memory.
///
/// Used for offline runs and tests: `batches()` returns the most recent flushed
/// batches (bounded by the retention) and `latest()` the most recent payload per
/// topic. Inbound messages are injected with `deliver()`.
pub struct MemoryBus {
    parameters: Value,
    buffer: Mutex<OutboundBuffer>,
    batches: Mutex<VecDeque<Vec<Message>>>,
    retention: usize,
    flushed: AtomicU64,
    latest: DashMap<String, Value>,
    handlers: DashMap<String, MessageHandler>,
    clock: Mutex<Option<Timestamp>>,
    shutdown: AtomicBool,
    shutdown_lock: Mutex<()>,
    shutdown_cv: Condvar,
}

impl MemoryBus {
    pub fn new(parameters: Value) -> Self {
        Self::with_retention(parameters, DEFAULT_BATCH_RETENTION)
    }

    /// Keep at most `retention` flushed batches
    pub fn with_retention(parameters: Value, retention: usize) -> Self {
        Self {
            parameters,
            buffer: Mutex::new(OutboundBuffer::new()),
            batches: Mutex::new(VecDeque::new()),
            retention,
            flushed: AtomicU64::new(0),
            latest: DashMap::new(),
            handlers: DashMap::new(),
            clock: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            shutdown_lock: Mutex::new(()),
            shutdown_cv: Condvar::new(),
        }
    }

    /// Retained flushed batches, oldest first
    pub fn batches(&self) -> Vec<Vec<Message>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of flushes since creation, retained or not
    pub fn flushed_batches(&self) -> u64 {
        self.flushed.load(Ordering::SeqCst)
    }

    /// Every retained message on `topic`, oldest first
    pub fn messages_on(&self, topic: &str) -> Vec<Value> {
        self.batches()
            .into_iter()
            .flatten()
            .filter(|message| message.topic == topic)
            .map(|message| message.payload)
            .collect()
    }

    /// Most recently flushed payload on `topic`
    pub fn latest(&self, topic: &str) -> Option<Value> {
        self.latest.get(topic).map(|payload| payload.value().clone())
    }

    /// Number of messages published but not yet flushed
    pub fn pending(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clock(&self) -> Option<Timestamp> {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand an inbound message to the handler subscribed to `topic`.
    /// Returns false if nothing is subscribed.
    pub fn deliver(&self, topic: &str, payload: Value) -> bool {
        // clone out so the handler runs without holding the map shard
        let handler = self.handlers.get(topic).map(|entry| entry.value().clone());
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => {
                debug!(topic = %topic, "No subscriber for inbound message");
                false
            }
        }
    }

    /// Subscribed topics, sorted
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        topics.sort();
        topics
    }
}

impl MessageBus for MemoryBus {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn signal_shutdown(&self, reason: &str) {
        info!(reason = %reason, "Shutdown signalled");
        let _guard = self.shutdown_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_cv.notify_all();
    }

    fn spin(&self) {
        let mut guard = self.shutdown_lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.is_shutdown() {
            guard = self
                .shutdown_cv
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
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

        for message in &batch {
            self.latest
                .insert(message.topic.clone(), message.payload.clone());
        }
        self.flushed.fetch_add(1, Ordering::SeqCst);

        let mut batches = self.batches.lock().unwrap_or_else(PoisonError::into_inner);
        batches.push_back(batch);
        while batches.len() > self.retention {
            batches.pop_front();
        }
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) {
        self.handlers.insert(topic.to_string(), handler);
    }

    fn unsubscribe(&self, topic: &str) {
        self.handlers.remove(topic);
    }

    fn update_clock(&self, timestamp: Timestamp) {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner) = Some(timestamp);
        self.publish(CLOCK_TOPIC, json!({ "seconds": timestamp.elapsed_seconds }));
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }
}
