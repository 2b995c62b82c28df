//! Publisher: encode, broadcast and record events
//!
//! One publish is one pipeline: `PUBLISH topic bytes` plus
//! `SET event:<id> bytes PX ttl`. Delivery is at-most-once; an event
//! published while nobody listens is only reachable through its history
//! entry.

use crate::codec::EventCodec;
use crate::error::{EventError, Result};
use crate::history::{EventHistory, HISTORY_TTL};
use crate::transport::{Pipeline, Transport};
use crate::types::{Event, EventId};
use std::sync::Arc;
use std::time::Duration;

/// Publishes events and writes their history copies
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    codec: EventCodec,
    history_ttl: Duration,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, codec: EventCodec) -> Self {
        Self {
            transport,
            codec,
            history_ttl: HISTORY_TTL,
        }
    }

    pub fn with_history_ttl(mut self, ttl: Duration) -> Self {
        self.history_ttl = ttl;
        self
    }

    pub fn codec(&self) -> &EventCodec {
        &self.codec
    }

    /// Publish an event on `topic`, assigning id and timestamp when unset
    ///
    /// Both pipeline commands must be accepted; a failure of either fails
    /// the call, even though the other may already have taken effect.
    pub async fn publish(&self, topic: &str, mut event: Event) -> Result<EventId> {
        if topic.is_empty() {
            return Err(EventError::InvalidTopic("topic cannot be empty".to_string()));
        }

        let id = event.ensure_identity();
        let bytes = self.codec.encode(&event)?;

        let pipeline = Pipeline::new()
            .publish(topic, bytes.clone())
            .set(EventHistory::key_for(&id), bytes, self.history_ttl);

        self.transport.execute(pipeline).await.map_err(|e| match e {
            EventError::Transport { .. } => e,
            other => EventError::transport("publish", other),
        })?;

        tracing::info!(
            topic,
            event_id = %id,
            event_type = %event.event_type,
            "Event published"
        );

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::UserLoginPayload;
    use crate::transport::memory::MemoryTransport;
    use crate::types::{AppType, Metadata};
    use uuid::Uuid;

    fn login() -> Event {
        Event::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AppType::Notebook,
            UserLoginPayload {
                login_method: "password".to_string(),
                ..Default::default()
            },
            Metadata::new("3.0.0", "laptop", "dev-1"),
        )
    }

    #[tokio::test]
    async fn test_empty_topic_rejected() {
        let publisher = Publisher::new(Arc::new(MemoryTransport::new()), EventCodec::default());
        let err = publisher.publish("", login()).await.unwrap_err();
        assert!(matches!(err, EventError::InvalidTopic(_)));
    }

    #[tokio::test]
    async fn test_publish_keeps_existing_id() {
        let transport = MemoryTransport::new();
        let publisher = Publisher::new(Arc::new(transport.clone()), EventCodec::default());
        let id = Uuid::now_v7();

        let returned = publisher
            .publish("user-events", login().with_id(id))
            .await
            .unwrap();
        assert_eq!(returned, id);
        assert!(transport
            .get(&EventHistory::key_for(&id))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_broker_failure_maps_to_transport() {
        let transport = MemoryTransport::new();
        let publisher = Publisher::new(Arc::new(transport.clone()), EventCodec::default());

        transport.set_offline(true);
        let err = publisher.publish("user-events", login()).await.unwrap_err();
        assert!(matches!(err, EventError::Transport { .. }));

        transport.set_offline(false);
        transport.fail_next_publishes(1);
        let err = publisher.publish("user-events", login()).await.unwrap_err();
        assert!(matches!(err, EventError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_broker() {
        let transport = MemoryTransport::new();
        let publisher = Publisher::new(Arc::new(transport.clone()), EventCodec::default());

        let mut event = login();
        event.payload = UserLoginPayload::default().into();
        let err = publisher.publish("user-events", event).await.unwrap_err();
        assert!(matches!(err, EventError::Validation { .. }));
        assert_eq!(transport.published_count(), 0);
    }
}
