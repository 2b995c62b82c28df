//! In-memory transport for tests and single-process use
//!
//! Pub/sub is fan-out over unbounded mpsc channels; the key-value side is
//! a `HashMap` with lazily enforced TTLs measured on the tokio clock, so
//! paused-time tests see keys expire. Fault injection hooks let tests
//! simulate broker outages, failed publishes and dropped subscriptions.

use super::{glob_match, Channel, Command, Message, Pipeline, Transport};
use crate::error::{EventError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

struct MemorySubscriber {
    topic: String,
    pattern: bool,
    sender: mpsc::UnboundedSender<Message>,
}

impl MemorySubscriber {
    fn matches(&self, channel: &str) -> bool {
        if self.pattern {
            glob_match(&self.topic, channel)
        } else {
            self.topic == channel
        }
    }
}

struct StoredValue {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
struct MemoryState {
    subscribers: Mutex<Vec<MemorySubscriber>>,
    store: Mutex<HashMap<String, StoredValue>>,
    offline: AtomicBool,
    closed: AtomicBool,
    failing_publishes: AtomicUsize,
    published: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory broker
///
/// Cheap to clone; clones share the same broker state.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broker outage: every operation fails while offline
    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `n` publish commands fail
    pub fn fail_next_publishes(&self, n: usize) {
        self.state.failing_publishes.store(n, Ordering::SeqCst);
    }

    /// Drop every open subscription channel, as a broker disconnect would
    pub fn disconnect_subscribers(&self) {
        lock(&self.state.subscribers).clear();
    }

    /// Number of open subscription channels
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = lock(&self.state.subscribers);
        subscribers.retain(|s| !s.sender.is_closed());
        subscribers.len()
    }

    /// Number of messages successfully published so far
    pub fn published_count(&self) -> usize {
        self.state.published.load(Ordering::SeqCst)
    }

    fn check_available(&self, op: &str) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(EventError::Connection(format!(
                "memory transport closed ({})",
                op
            )));
        }
        if self.state.offline.load(Ordering::SeqCst) {
            return Err(EventError::transport(op, "broker offline"));
        }
        Ok(())
    }

    fn take_publish_fault(&self) -> bool {
        self.state
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn deliver(&self, topic: &str, payload: Bytes) -> Result<()> {
        if self.take_publish_fault() {
            return Err(EventError::transport("publish", "injected publish failure"));
        }

        let mut subscribers = lock(&self.state.subscribers);
        subscribers.retain(|sub| {
            if !sub.matches(topic) {
                return !sub.sender.is_closed();
            }
            sub.sender
                .send(Message {
                    channel: topic.to_string(),
                    payload: payload.clone(),
                })
                .is_ok()
        });
        self.state.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn store_value(&self, key: &str, value: Bytes, ttl: Duration) {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        lock(&self.state.store).insert(key.to_string(), StoredValue { value, expires_at });
    }

    fn load_value(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut store = lock(&self.state.store);
        match store.get(key) {
            Some(stored) if stored.is_live(now) => Some(stored.value.clone()),
            Some(_) => {
                store.remove(key);
                None
            }
            None => None,
        }
    }

    fn remove_value(&self, key: &str) -> bool {
        let now = Instant::now();
        lock(&self.state.store)
            .remove(key)
            .is_some_and(|stored| stored.is_live(now))
    }
}

/// Channel end of an in-memory subscription
pub struct MemoryChannel {
    receiver: mpsc::UnboundedReceiver<Message>,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn next(&mut self) -> Result<Option<Message>> {
        Ok(self.receiver.recv().await)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.check_available("publish")?;
        self.deliver(topic, payload)
    }

    async fn subscribe(&self, topic: &str, pattern: bool) -> Result<Box<dyn Channel>> {
        self.check_available("subscribe")?;
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.state.subscribers).push(MemorySubscriber {
            topic: topic.to_string(),
            pattern,
            sender,
        });
        tracing::debug!(topic, pattern, "Memory subscription opened");
        Ok(Box::new(MemoryChannel { receiver }))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_available("get")?;
        Ok(self.load_value(key))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.check_available("set")?;
        self.store_value(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available("delete")?;
        Ok(self.remove_value(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check_available("keys")?;
        let now = Instant::now();
        let mut store = lock(&self.state.store);
        store.retain(|_, stored| stored.is_live(now));
        let mut keys: Vec<String> = store
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        self.check_available("get_many")?;
        Ok(keys.iter().map(|key| self.load_value(key)).collect())
    }

    async fn execute(&self, pipeline: Pipeline) -> Result<()> {
        self.check_available("pipeline")?;

        // Apply every command like a real pipeline; report the first failure
        let mut first_error = None;
        for command in pipeline.commands() {
            let outcome = match command {
                Command::Publish { topic, payload } => self.deliver(topic, payload.clone()),
                Command::Set { key, value, ttl } => {
                    self.store_value(key, value.clone(), *ttl);
                    Ok(())
                }
                Command::Delete { key } => {
                    self.remove_value(key);
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(EventError::transport("pipeline", e)),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        lock(&self.state.subscribers).clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }

    async fn health(&self) -> Result<bool> {
        self.check_available("health").map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exact_subscription() {
        let transport = MemoryTransport::new();
        let mut channel = transport.subscribe("quiz-events", false).await.unwrap();

        transport
            .publish("quiz-events", Bytes::from_static(b"one"))
            .await
            .unwrap();
        transport
            .publish("user-events", Bytes::from_static(b"two"))
            .await
            .unwrap();

        let msg = channel.next().await.unwrap().unwrap();
        assert_eq!(msg.channel, "quiz-events");
        assert_eq!(msg.payload, Bytes::from_static(b"one"));
        assert_eq!(transport.published_count(), 2);
    }

    #[tokio::test]
    async fn test_pattern_subscription() {
        let transport = MemoryTransport::new();
        let mut channel = transport.subscribe("events.*", true).await.unwrap();

        for topic in ["events.quiz", "other.topic", "events.user"] {
            transport
                .publish(topic, Bytes::from(topic.to_string()))
                .await
                .unwrap();
        }

        let first = channel.next().await.unwrap().unwrap();
        let second = channel.next().await.unwrap().unwrap();
        assert_eq!(first.channel, "events.quiz");
        assert_eq!(second.channel, "events.user");
    }

    #[tokio::test]
    async fn test_dropped_channel_is_pruned() {
        let transport = MemoryTransport::new();
        let channel = transport.subscribe("t", false).await.unwrap();
        assert_eq!(transport.subscriber_count(), 1);

        drop(channel);
        transport.publish("t", Bytes::new()).await.unwrap();
        assert_eq!(transport.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_closes_channels() {
        let transport = MemoryTransport::new();
        let mut channel = transport.subscribe("t", false).await.unwrap();
        transport.disconnect_subscribers();
        assert!(channel.next().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_get_with_ttl() {
        let transport = MemoryTransport::new();
        transport
            .set("event:1", Bytes::from_static(b"x"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            transport.get("event:1").await.unwrap(),
            Some(Bytes::from_static(b"x"))
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(transport.get("event:1").await.unwrap(), None);
        assert!(transport.keys("event:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_and_delete() {
        let transport = MemoryTransport::new();
        let ttl = Duration::from_secs(60);
        for key in ["failed_events:a:1", "failed_events:a:2", "failed_events:b:1"] {
            transport.set(key, Bytes::new(), ttl).await.unwrap();
        }

        let keys = transport.keys("failed_events:a:*").await.unwrap();
        assert_eq!(keys, vec!["failed_events:a:1", "failed_events:a:2"]);

        assert!(transport.delete("failed_events:a:1").await.unwrap());
        assert!(!transport.delete("failed_events:a:1").await.unwrap());

        let values = transport
            .get_many(&["failed_events:a:1".to_string(), "failed_events:a:2".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![None, Some(Bytes::new())]);
    }

    #[tokio::test]
    async fn test_pipeline_partial_failure() {
        let transport = MemoryTransport::new();
        let mut channel = transport.subscribe("t", false).await.unwrap();
        transport.fail_next_publishes(1);

        let pipe = Pipeline::new()
            .publish("t", Bytes::from_static(b"lost"))
            .set("event:1", Bytes::from_static(b"kept"), Duration::from_secs(60));
        let err = transport.execute(pipe).await.unwrap_err();
        assert!(err.is_transport());

        // The set half still applied; the publish never reached the channel
        assert!(transport.get("event:1").await.unwrap().is_some());
        transport.publish("t", Bytes::from_static(b"next")).await.unwrap();
        let msg = channel.next().await.unwrap().unwrap();
        assert_eq!(msg.payload, Bytes::from_static(b"next"));
    }

    #[tokio::test]
    async fn test_offline_fails_everything() {
        let transport = MemoryTransport::new();
        transport.set_offline(true);

        assert!(transport.get("k").await.unwrap_err().is_transport());
        assert!(transport.subscribe("t", false).await.is_err());
        assert!(transport.health().await.is_err());

        transport.set_offline(false);
        assert!(transport.health().await.unwrap());
    }

    #[tokio::test]
    async fn test_close() {
        let transport = MemoryTransport::new();
        let mut channel = transport.subscribe("t", true).await.unwrap();
        transport.close().await.unwrap();

        assert!(channel.next().await.unwrap().is_none());
        assert!(matches!(
            transport.publish("t", Bytes::new()).await,
            Err(EventError::Connection(_))
        ));
    }
}
