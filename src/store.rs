//! High-level event bus built on a pluggable transport
//!
//! `EventBus` wires the publisher, history, dead-letter store and the
//! subscription registry over one `Transport`. Delivery is at-most-once:
//! the transport does not persist broadcasts, so an event published while
//! no worker is reading is only reachable through its history entry.

use crate::codec::EventCodec;
use crate::config::EventsConfig;
use crate::dlq::{DeadLetter, DeadLetterStore, ReplayReport};
use crate::error::{EventError, Result};
use crate::handler::EventHandler;
use crate::history::EventHistory;
use crate::publisher::Publisher;
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::topics::topic_for;
use crate::transport::redis::RedisTransport;
use crate::transport::Transport;
use crate::types::{Event, EventId, SubscribeOptions};
use crate::worker::DeliveryWorker;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-item result of a batch publish
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Ids of events that were published, in input order
    pub published: Vec<EventId>,

    /// Items that failed, with their input index
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub topic: &'static str,
    pub error: EventError,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Event bus backed by a pluggable transport
///
/// Thread-safe; share it behind an `Arc`.
pub struct EventBus {
    transport: Arc<dyn Transport>,
    codec: EventCodec,
    publisher: Publisher,
    history: EventHistory,
    dead_letters: DeadLetterStore,
    registry: Arc<SubscriptionRegistry>,
    default_options: SubscribeOptions,

    /// Parent of every subscription token
    root: CancellationToken,
}

impl EventBus {
    /// Create an event bus with default settings
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_parts(Arc::new(transport), EventCodec::default(), &EventsConfig::default())
    }

    /// Create an event bus with store TTLs and delivery defaults from `config`
    pub fn with_config(transport: impl Transport + 'static, config: &EventsConfig) -> Self {
        Self::from_parts(Arc::new(transport), EventCodec::default(), config)
    }

    /// Create an event bus from a shared transport and a custom codec
    pub fn from_parts(
        transport: Arc<dyn Transport>,
        codec: EventCodec,
        config: &EventsConfig,
    ) -> Self {
        let publisher = Publisher::new(transport.clone(), codec.clone())
            .with_history_ttl(config.stores.history_ttl());
        let history = EventHistory::new(transport.clone(), codec.clone());
        let dead_letters = DeadLetterStore::new(transport.clone(), codec.clone())
            .with_ttl(config.stores.dead_letter_ttl());

        Self {
            transport,
            codec,
            publisher,
            history,
            dead_letters,
            registry: Arc::new(SubscriptionRegistry::new()),
            default_options: config.delivery.to_options(),
            root: CancellationToken::new(),
        }
    }

    /// Connect to Redis as configured
    pub async fn connect(config: &EventsConfig) -> Result<Self> {
        config.validate()?;
        let transport = RedisTransport::connect(config.redis.clone()).await?;
        Ok(Self::with_config(transport, config))
    }

    /// Get the transport name
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Publish an event on `topic`
    ///
    /// Id and timestamp are assigned when unset; the returned id is the
    /// one carried on the wire and in history.
    pub async fn publish(&self, topic: &str, event: Event) -> Result<EventId> {
        self.publisher.publish(topic, event).await
    }

    /// Validate an event and publish it on the topic its type routes to
    pub async fn publish_routed(&self, event: Event) -> Result<EventId> {
        event.validate()?;
        self.publisher.publish(topic_for(&event.event_type), event).await
    }

    /// Route and publish each event; failures are logged and reported
    /// without stopping the rest of the batch
    pub async fn publish_batch(&self, events: Vec<Event>) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, event) in events.into_iter().enumerate() {
            let topic = topic_for(&event.event_type);
            match self.publish_routed(event).await {
                Ok(id) => report.published.push(id),
                Err(error) => {
                    tracing::error!(index, topic, error = %error, "Failed to publish batch item");
                    report.failures.push(BatchFailure { index, topic, error });
                }
            }
        }

        report
    }

    /// Subscribe `handler` to `topic`, replacing any existing subscription
    ///
    /// `None` uses the bus defaults (pattern subscription, 3 attempts,
    /// 1s/5s/10s backoff, 30s handler timeout).
    pub async fn subscribe(
        &self,
        topic: &str,
        handler: impl EventHandler + 'static,
        options: Option<SubscribeOptions>,
    ) -> Result<SubscriptionId> {
        if topic.is_empty() {
            return Err(EventError::InvalidTopic("topic cannot be empty".to_string()));
        }
        if self.root.is_cancelled() {
            return Err(EventError::Connection("event bus is closed".to_string()));
        }

        let options = options.unwrap_or_else(|| self.default_options.clone());
        options.validate()?;

        let channel = self.transport.subscribe(topic, options.pattern).await?;
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        let cancel = self.root.child_token();

        let id = self.registry.install(topic, cancel.clone(), |id| {
            let worker = DeliveryWorker {
                id,
                topic: topic.to_string(),
                options,
                handler,
                transport: self.transport.clone(),
                codec: self.codec.clone(),
                dead_letters: self.dead_letters.clone(),
                registry: self.registry.clone(),
                cancel,
            };
            worker.run(channel)
        })?;

        tracing::info!(topic, subscription = id, "Subscribed");
        Ok(id)
    }

    /// Pattern-subscribe with the bus defaults
    pub async fn psubscribe(
        &self,
        pattern: &str,
        handler: impl EventHandler + 'static,
    ) -> Result<SubscriptionId> {
        let options = SubscribeOptions {
            pattern: true,
            ..self.default_options.clone()
        };
        self.subscribe(pattern, handler, Some(options)).await
    }

    /// Stop the subscription on `topic`; returns whether one existed
    pub async fn unsubscribe(&self, topic: &str) -> bool {
        let removed = self.registry.remove(topic).await;
        if removed {
            tracing::info!(topic, "Unsubscribed");
        }
        removed
    }

    /// Topics with an active subscription
    pub fn active_topics(&self) -> Vec<String> {
        self.registry.topics()
    }

    /// Fetch a published event from history
    pub async fn get_event_history(&self, id: &EventId) -> Result<Event> {
        self.history.get(id).await
    }

    /// Re-publish the dead letters recorded for `topic`
    pub async fn replay(&self, topic: &str) -> Result<ReplayReport> {
        self.dead_letters.replay(topic, &self.publisher).await
    }

    /// Dead letters recorded for `topic`
    pub async fn dead_letters(&self, topic: &str) -> Result<Vec<DeadLetter>> {
        self.dead_letters.list(topic).await
    }

    /// Health check: true if the broker answers
    pub async fn health(&self) -> Result<bool> {
        self.transport.health().await
    }

    /// Stop every subscription and close the transport
    pub async fn close(&self) -> Result<()> {
        self.root.cancel();
        self.registry.shutdown().await;
        self.transport.close().await?;
        tracing::info!(transport = self.transport.name(), "Event bus closed");
        Ok(())
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}
