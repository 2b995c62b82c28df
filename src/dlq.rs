//! Dead letters: events whose delivery exhausted every attempt
//!
//! Records live under `failed_events:<topic>:<event_id>:<record_id>` with a
//! TTL. The trailing record id keeps a second failure of the same event
//! from overwriting the first. Replay is an operator action: one pass over
//! a topic's records, re-publishing each and deleting it on success.

use crate::codec::EventCodec;
use crate::error::{EventError, Result};
use crate::publisher::Publisher;
use crate::transport::{escape_glob, Transport};
use crate::types::Event;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default lifetime of a dead-letter record
pub const DEAD_LETTER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Key prefix for dead-letter records
pub const DEAD_LETTER_KEY_PREFIX: &str = "failed_events:";

/// A failed delivery with context about why it was given up on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetterRecord {
    /// Concrete channel the event arrived on
    pub topic: String,

    pub event: Event,

    /// Last failure, rendered
    pub error: String,

    pub failed_at: DateTime<Utc>,

    /// Handler attempts made before giving up
    pub retry_count: u32,
}

/// Stored shape; the event is resolved through the codec
#[derive(Deserialize)]
struct RawDeadLetter {
    #[serde(default)]
    topic: String,
    event: serde_json::Value,
    #[serde(default)]
    error: String,
    failed_at: DateTime<Utc>,
    #[serde(default)]
    retry_count: u32,
}

/// A dead-letter record together with its storage key
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub key: String,
    pub record: DeadLetterRecord,
}

/// Outcome of one replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Re-published and deleted
    pub replayed: usize,

    /// Re-publish failed; record kept
    pub failed: usize,

    /// Expired or unreadable; record left alone
    pub skipped: usize,
}

/// Dead-letter storage over the transport's key space
#[derive(Clone)]
pub struct DeadLetterStore {
    transport: Arc<dyn Transport>,
    codec: EventCodec,
    ttl: Duration,
}

impl DeadLetterStore {
    pub fn new(transport: Arc<dyn Transport>, codec: EventCodec) -> Self {
        Self {
            transport,
            codec,
            ttl: DEAD_LETTER_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Key pattern covering every record of `topic`
    ///
    /// Also matches records of colon-extended topics (`<topic>:sub`);
    /// [`DeadLetterStore::owns_key`] narrows the scan to exact matches.
    pub fn topic_pattern(topic: &str) -> String {
        format!("{}{}:*", DEAD_LETTER_KEY_PREFIX, escape_glob(topic))
    }

    /// Whether `key` is a record of exactly `topic`
    ///
    /// The tail after `failed_events:<topic>:` must be `<event_id>:<record_id>`,
    /// neither of which contains a colon.
    pub fn owns_key(topic: &str, key: &str) -> bool {
        let Some(tail) = key
            .strip_prefix(DEAD_LETTER_KEY_PREFIX)
            .and_then(|rest| rest.strip_prefix(topic))
            .and_then(|rest| rest.strip_prefix(':'))
        else {
            return false;
        };
        match tail.split_once(':') {
            Some((event_id, record_id)) => {
                !event_id.is_empty() && !record_id.is_empty() && !record_id.contains(':')
            }
            None => false,
        }
    }

    async fn keys_for(&self, topic: &str) -> Result<Vec<String>> {
        let mut keys = self.transport.keys(&Self::topic_pattern(topic)).await?;
        keys.retain(|key| Self::owns_key(topic, key));
        Ok(keys)
    }

    /// Persist a failed delivery, returning its key
    pub async fn store_failed(
        &self,
        topic: &str,
        event: &Event,
        error: &str,
        retry_count: u32,
    ) -> Result<String> {
        let key = format!(
            "{}{}:{}:{}",
            DEAD_LETTER_KEY_PREFIX,
            topic,
            event.id_label(),
            Uuid::now_v7()
        );

        let record = serde_json::json!({
            "topic": topic,
            "event": self.codec.encode_value(event)?,
            "error": error,
            "failed_at": Utc::now(),
            "retry_count": retry_count,
        });
        let bytes = Bytes::from(serde_json::to_vec(&record)?);

        self.transport.set(&key, bytes, self.ttl).await?;
        Ok(key)
    }

    /// Number of records stored for `topic`
    pub async fn count(&self, topic: &str) -> Result<usize> {
        Ok(self.keys_for(topic).await?.len())
    }

    /// All readable records for `topic`, oldest key first
    pub async fn list(&self, topic: &str) -> Result<Vec<DeadLetter>> {
        let (letters, _) = self.load(topic).await?;
        Ok(letters)
    }

    /// Re-publish every record for `topic` on that topic
    ///
    /// Single pass, no backoff. A record is deleted only after its event
    /// was published again; failures are logged and left for the next run.
    pub async fn replay(&self, topic: &str, publisher: &Publisher) -> Result<ReplayReport> {
        let (letters, skipped) = self.load(topic).await?;
        let mut report = ReplayReport {
            skipped,
            ..Default::default()
        };

        for letter in letters {
            let event_id = letter.record.event.id_label();
            match publisher.publish(topic, letter.record.event).await {
                Ok(_) => {
                    report.replayed += 1;
                    if let Err(e) = self.transport.delete(&letter.key).await {
                        tracing::warn!(
                            topic,
                            key = %letter.key,
                            error = %e,
                            "Replayed event but failed to delete dead letter"
                        );
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        topic,
                        event_id = %event_id,
                        error = %e,
                        "Failed to replay event"
                    );
                }
            }
        }

        tracing::info!(
            topic,
            replayed = report.replayed,
            failed = report.failed,
            skipped = report.skipped,
            "Dead-letter replay finished"
        );
        Ok(report)
    }

    /// Fetch and decode every record for `topic`; returns the unreadable count
    async fn load(&self, topic: &str) -> Result<(Vec<DeadLetter>, usize)> {
        let keys = self.keys_for(topic).await?;
        let values = self.transport.get_many(&keys).await?;

        let mut letters = Vec::with_capacity(keys.len());
        let mut skipped = 0;
        for (key, value) in keys.into_iter().zip(values) {
            let Some(bytes) = value else {
                skipped += 1;
                continue;
            };
            match self.decode(&bytes) {
                Ok(record) if record.topic == topic => letters.push(DeadLetter { key, record }),
                Ok(record) => {
                    skipped += 1;
                    tracing::warn!(
                        topic,
                        key = %key,
                        recorded_topic = %record.topic,
                        "Skipping dead letter recorded for another topic"
                    );
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(topic, key = %key, error = %e, "Skipping unreadable dead letter");
                }
            }
        }
        Ok((letters, skipped))
    }

    fn decode(&self, bytes: &[u8]) -> Result<DeadLetterRecord> {
        let raw: RawDeadLetter = serde_json::from_slice(bytes)
            .map_err(|e| EventError::Decode(format!("malformed dead letter: {}", e)))?;
        Ok(DeadLetterRecord {
            topic: raw.topic,
            event: self.codec.decode_value(raw.event)?,
            error: raw.error,
            failed_at: raw.failed_at,
            retry_count: raw.retry_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::AppNavigationPayload;
    use crate::transport::memory::MemoryTransport;
    use crate::transport::Channel;
    use crate::types::{AppType, Metadata};

    fn navigation() -> Event {
        let mut event = Event::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AppType::Whiteboard,
            AppNavigationPayload {
                from_screen: "home".to_string(),
                to_screen: "quiz".to_string(),
                navigation_type: "push".to_string(),
                ..Default::default()
            },
            Metadata::new("1.2.0", "tablet", "dev-3"),
        );
        event.ensure_identity();
        event
    }

    fn setup() -> (MemoryTransport, DeadLetterStore, Publisher) {
        let transport = MemoryTransport::new();
        let shared: Arc<dyn Transport> = Arc::new(transport.clone());
        let store = DeadLetterStore::new(shared.clone(), EventCodec::default());
        let publisher = Publisher::new(shared, EventCodec::default());
        (transport, store, publisher)
    }

    #[test]
    fn test_topic_pattern_escapes_glob() {
        assert_eq!(
            DeadLetterStore::topic_pattern("engagement-events"),
            "failed_events:engagement-events:*"
        );
        assert_eq!(DeadLetterStore::topic_pattern("a*b"), "failed_events:a\\*b:*");
    }

    #[test]
    fn test_owns_key_rejects_colon_extended_topics() {
        let key = "failed_events:events:0190a4d2-7c3e-7b1a-9f00-000000000001:0190a4d2-7c3e-7b1a-9f00-000000000002";
        assert!(DeadLetterStore::owns_key("events", key));
        assert!(!DeadLetterStore::owns_key("events", "failed_events:events:quiz:a:b"));
        assert!(DeadLetterStore::owns_key("events:quiz", "failed_events:events:quiz:a:b"));
        assert!(!DeadLetterStore::owns_key("events", "failed_events:events-b:a:b"));
        assert!(!DeadLetterStore::owns_key("events", "failed_events:events:a"));
    }

    #[tokio::test]
    async fn test_sibling_topic_records_untouched() {
        let (transport, store, publisher) = setup();
        let mut parent = transport.subscribe("events", false).await.unwrap();
        store.store_failed("events:quiz", &navigation(), "boom", 1).await.unwrap();
        store.store_failed("events", &navigation(), "boom", 1).await.unwrap();

        assert_eq!(store.count("events").await.unwrap(), 1);
        assert_eq!(store.list("events").await.unwrap().len(), 1);

        let report = store.replay("events", &publisher).await.unwrap();
        assert_eq!(report, ReplayReport { replayed: 1, failed: 0, skipped: 0 });
        assert!(parent.next().await.unwrap().is_some());

        let siblings = store.list("events:quiz").await.unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].record.topic, "events:quiz");
    }

    #[tokio::test]
    async fn test_store_never_overwrites() {
        let (_, store, _) = setup();
        let event = navigation();

        let k1 = store.store_failed("engagement-events", &event, "boom", 3).await.unwrap();
        let k2 = store.store_failed("engagement-events", &event, "boom again", 3).await.unwrap();
        assert_ne!(k1, k2);
        assert!(k1.starts_with(&format!(
            "failed_events:engagement-events:{}:",
            event.id.unwrap()
        )));
        assert_eq!(store.count("engagement-events").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_decodes_records() {
        let (_, store, _) = setup();
        let event = navigation();
        store.store_failed("engagement-events", &event, "handler: db down", 3).await.unwrap();
        store.store_failed("other-events", &event, "x", 1).await.unwrap();

        let letters = store.list("engagement-events").await.unwrap();
        assert_eq!(letters.len(), 1);
        let record = &letters[0].record;
        assert_eq!(record.event, event);
        assert_eq!(record.retry_count, 3);
        assert_eq!(record.error, "handler: db down");
        assert_eq!(record.topic, "engagement-events");
    }

    #[tokio::test]
    async fn test_replay_republishes_and_deletes() {
        let (transport, store, publisher) = setup();
        let mut channel = transport.subscribe("engagement-events", false).await.unwrap();
        let event = navigation();
        store.store_failed("engagement-events", &event, "boom", 3).await.unwrap();

        let report = store.replay("engagement-events", &publisher).await.unwrap();
        assert_eq!(report, ReplayReport { replayed: 1, failed: 0, skipped: 0 });
        assert_eq!(store.count("engagement-events").await.unwrap(), 0);

        let msg = channel.next().await.unwrap().unwrap();
        let replayed = EventCodec::default().decode(&msg.payload).unwrap();
        assert_eq!(replayed.id, event.id);
    }

    #[tokio::test]
    async fn test_replay_failure_keeps_record() {
        let (transport, store, publisher) = setup();
        store.store_failed("engagement-events", &navigation(), "boom", 3).await.unwrap();
        store.store_failed("engagement-events", &navigation(), "boom", 3).await.unwrap();

        transport.fail_next_publishes(1);
        let report = store.replay("engagement-events", &publisher).await.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(store.count("engagement-events").await.unwrap(), 1);

        let report = store.replay("engagement-events", &publisher).await.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(store.count("engagement-events").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_record_skipped() {
        let (transport, store, publisher) = setup();
        transport
            .set("failed_events:t:x:y", Bytes::from_static(b"garbage"), DEAD_LETTER_TTL)
            .await
            .unwrap();

        let report = store.replay("t", &publisher).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(store.count("t").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_expire() {
        let (_, store, _) = setup();
        let store = store.with_ttl(Duration::from_secs(10));
        store.store_failed("t", &navigation(), "boom", 1).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.count("t").await.unwrap(), 0);
    }
}
